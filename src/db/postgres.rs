//! Postgres backend
//!
//! Every statement runs inside a `READ ONLY` transaction that is rolled
//! back afterwards.

use crate::db::{describe_table, quote_identifier, resolve_tables, Database, QueryOutput, SqlValue, SAMPLE_ROWS};
use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Decimal;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| AgentError::Database(format!("Failed to connect to postgres: {}", e)))?;

        info!("Restaurant store backend: postgres");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn create_statement(&self, table: &str) -> Result<String> {
        let columns = sqlx::query(
            r#"
            SELECT column_name::text, data_type::text, is_nullable::text
            FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AgentError::Database(format!("Failed to read columns of {}: {}", table, e)))?;

        let foreign_keys = sqlx::query(
            r#"
            SELECT kcu.column_name::text AS column_name,
                   ccu.table_name::text AS foreign_table,
                   ccu.column_name::text AS foreign_column
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
              ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema
            WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = 'public' AND tc.table_name = $1
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AgentError::Database(format!("Failed to read foreign keys of {}: {}", table, e))
        })?;

        let mut lines: Vec<String> = columns
            .iter()
            .map(|row| {
                let name: String = row.try_get("column_name").unwrap_or_default();
                let data_type: String = row.try_get("data_type").unwrap_or_default();
                let nullable: String = row.try_get("is_nullable").unwrap_or_default();
                let not_null = if nullable == "NO" { " NOT NULL" } else { "" };
                format!("\t{} {}{}", name, data_type.to_uppercase(), not_null)
            })
            .collect();

        lines.extend(foreign_keys.iter().map(|row| {
            let column: String = row.try_get("column_name").unwrap_or_default();
            let foreign_table: String = row.try_get("foreign_table").unwrap_or_default();
            let foreign_column: String = row.try_get("foreign_column").unwrap_or_default();
            format!(
                "\tFOREIGN KEY({}) REFERENCES {} ({})",
                column, foreign_table, foreign_column
            )
        }));

        Ok(format!("CREATE TABLE {} (\n{}\n)", table, lines.join(",\n")))
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    fn dialect(&self) -> &'static str {
        "postgresql"
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let tables: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AgentError::Database(format!("Failed to list tables: {}", e)))?;

        Ok(tables)
    }

    async fn table_info(&self, tables: &[String]) -> Result<String> {
        let available = self.list_tables().await?;
        let tables = resolve_tables(tables, &available)?;

        let mut sections = Vec::with_capacity(tables.len());
        for table in &tables {
            let create = self.create_statement(table).await?;
            let sample = self
                .run(&format!(
                    "SELECT * FROM {} LIMIT {}",
                    quote_identifier(table),
                    SAMPLE_ROWS
                ))
                .await?;
            sections.push(describe_table(&create, table, &sample));
        }

        debug!(tables = ?tables, "Fetched postgres table info");
        Ok(sections.join("\n\n\n"))
    }

    async fn run(&self, sql: &str) -> Result<QueryOutput> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query(sql).fetch_all(&mut *tx).await;

        // nothing to keep; read-only either way
        tx.rollback().await?;

        Ok(to_output(&rows?))
    }
}

fn to_output(rows: &[PgRow]) -> QueryOutput {
    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let rows = rows
        .iter()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(i, column)| decode(row, i, column.type_info().name()))
                .collect()
        })
        .collect();

    QueryOutput { columns, rows }
}

fn decode(row: &PgRow, index: usize, type_name: &str) -> SqlValue {
    fn get<'r, T>(row: &'r PgRow, index: usize) -> Option<T>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        row.try_get::<Option<T>, _>(index).ok().flatten()
    }

    if row.try_get_raw(index).map(|raw| raw.is_null()).unwrap_or(true) {
        return SqlValue::Null;
    }

    let value = match type_name {
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => get::<String>(row, index).map(SqlValue::Text),
        "INT2" => get::<i16>(row, index).map(|v| SqlValue::Integer(v.into())),
        "INT4" => get::<i32>(row, index).map(|v| SqlValue::Integer(v.into())),
        "INT8" => get::<i64>(row, index).map(SqlValue::Integer),
        "FLOAT4" => get::<f32>(row, index).map(|v| SqlValue::Real(v.into())),
        "FLOAT8" => get::<f64>(row, index).map(SqlValue::Real),
        "NUMERIC" => get::<Decimal>(row, index).map(|v| SqlValue::Numeric(v.normalize().to_string())),
        "BOOL" => get::<bool>(row, index).map(SqlValue::Bool),
        "UUID" => get::<uuid::Uuid>(row, index).map(|v| SqlValue::Text(v.to_string())),
        "TIMESTAMP" => get::<chrono::NaiveDateTime>(row, index).map(|v| SqlValue::Text(v.to_string())),
        "TIMESTAMPTZ" => {
            get::<chrono::DateTime<chrono::Utc>>(row, index).map(|v| SqlValue::Text(v.to_rfc3339()))
        }
        "DATE" => get::<chrono::NaiveDate>(row, index).map(|v| SqlValue::Text(v.to_string())),
        "BYTEA" => get::<Vec<u8>>(row, index).map(SqlValue::Blob),
        _ => get::<String>(row, index).map(SqlValue::Text),
    };

    value.unwrap_or_else(|| {
        warn!(column = index, type_name, "Could not decode a non-null value, reporting None");
        SqlValue::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Needs a live server; skipped unless TEST_POSTGRES_URL is set.
    async fn live_store() -> Option<PostgresDatabase> {
        let url = std::env::var("TEST_POSTGRES_URL").ok()?;
        Some(PostgresDatabase::connect(&url).await.unwrap())
    }

    #[tokio::test]
    async fn test_numeric_and_null_cells() {
        let Some(db) = live_store().await else {
            return;
        };

        let output = db
            .run("SELECT AVG(x) AS avg_rating, SUM(x::bigint) AS total, NULL::numeric AS missing, 'a' AS label \
                  FROM (VALUES (4), (5)) AS t(x)")
            .await
            .unwrap();

        assert_eq!(
            output.rows[0],
            vec![
                SqlValue::Numeric("4.5".to_string()),
                SqlValue::Numeric("9".to_string()),
                SqlValue::Null,
                SqlValue::Text("a".to_string()),
            ]
        );
        assert_eq!(output.render(), "avg_rating, total, missing, label\n(4.5, 9, None, 'a')");
    }

    #[tokio::test]
    async fn test_run_is_read_only() {
        let Some(db) = live_store().await else {
            return;
        };

        assert!(db.run("CREATE TABLE meokten_scratch (id INT)").await.is_err());
        assert!(!db.list_tables().await.unwrap().contains(&"meokten_scratch".to_string()));
    }
}
