//! SQLite backend (the `meokten.db` file)

use crate::db::{describe_table, quote_identifier, resolve_tables, Database, QueryOutput, SqlValue, SAMPLE_ROWS};
use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, ValueRef};
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open a SQLite store. File databases are opened read-only.
    pub async fn connect(url: &str) -> Result<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AgentError::Config(format!("invalid sqlite url '{}': {}", url, e)))?
            .read_only(!in_memory);

        // an in-memory database lives and dies with its single connection
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await.map_err(|e| {
            AgentError::Database(format!("Failed to open sqlite database {}: {}", url, e))
        })?;

        info!(url, read_only = !in_memory, "Restaurant store backend: sqlite");
        Ok(Self { pool })
    }

    /// Wrap an existing pool (used to seed in-memory stores in tests).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    fn dialect(&self) -> &'static str {
        "sqlite"
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AgentError::Database(format!("Failed to list tables: {}", e)))?;

        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("name").ok())
            .collect())
    }

    async fn table_info(&self, tables: &[String]) -> Result<String> {
        let available = self.list_tables().await?;
        let tables = resolve_tables(tables, &available)?;

        let mut sections = Vec::with_capacity(tables.len());
        for table in &tables {
            let create: String =
                sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                    .bind(table)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| {
                        AgentError::Database(format!("Failed to read schema of {}: {}", table, e))
                    })?;

            let sample = self
                .run(&format!(
                    "SELECT * FROM {} LIMIT {}",
                    quote_identifier(table),
                    SAMPLE_ROWS
                ))
                .await?;

            sections.push(describe_table(&create, table, &sample));
        }

        debug!(tables = ?tables, "Fetched sqlite table info");
        Ok(sections.join("\n\n\n"))
    }

    async fn run(&self, sql: &str) -> Result<QueryOutput> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        Ok(to_output(&rows))
    }
}

fn to_output(rows: &[SqliteRow]) -> QueryOutput {
    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let rows = rows
        .iter()
        .map(|row| (0..row.columns().len()).map(|i| decode(row, i)).collect())
        .collect();

    QueryOutput { columns, rows }
}

/// SQLite is dynamically typed; decode by the stored value's runtime type.
fn decode(row: &SqliteRow, index: usize) -> SqlValue {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return SqlValue::Null,
        Err(_) => return SqlValue::Null,
        Ok(_) => {}
    }

    if let Ok(v) = row.try_get::<i64, _>(index) {
        SqlValue::Integer(v)
    } else if let Ok(v) = row.try_get::<f64, _>(index) {
        SqlValue::Real(v)
    } else if let Ok(v) = row.try_get::<String, _>(index) {
        SqlValue::Text(v)
    } else if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        SqlValue::Blob(v)
    } else {
        SqlValue::Null
    }
}

/// In-memory store seeded with the restaurant schema and a few rows.
#[cfg(test)]
pub(crate) async fn seeded_memory_store() -> SqliteDatabase {
    let db = SqliteDatabase::connect("sqlite::memory:").await.unwrap();

    for statement in [
        "CREATE TABLE restaurants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            address TEXT NOT NULL,
            lat TEXT,
            lng TEXT,
            station_name TEXT,
            review TEXT,
            video_url TEXT
        )",
        "CREATE TABLE menus (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            restaurant_id INTEGER REFERENCES restaurants(id),
            menu_type TEXT,
            menu_name TEXT NOT NULL,
            menu_review TEXT
        )",
        "INSERT INTO restaurants (name, address, lat, lng, station_name, review)
         VALUES ('논현동 맛집', '서울 강남구 논현동 1', '37.514352', '127.014352', '논현역', '맛집 후기')",
        "INSERT INTO restaurants (name, address, lat, lng, station_name, review)
         VALUES ('을지면옥', '서울 중구 을지로 2', NULL, NULL, '을지로3가역', '평양냉면')",
        "INSERT INTO menus (restaurant_id, menu_type, menu_name) VALUES (1, '양식', '피자')",
        "INSERT INTO menus (restaurant_id, menu_type, menu_name) VALUES (1, '양식', '스테이크')",
        "INSERT INTO menus (restaurant_id, menu_type, menu_name) VALUES (2, '한식', '냉면')",
    ] {
        sqlx::query(statement).execute(db.pool()).await.unwrap();
    }

    db
}
