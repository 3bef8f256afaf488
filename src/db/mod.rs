//! Restaurant store access
//!
//! Schema introspection and read-only query execution over either a SQLite
//! file or a Postgres database. The store is shared read-only; nothing here
//! ever writes.

use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub mod postgres;
pub mod sqlite;

pub use postgres::PostgresDatabase;
pub use sqlite::SqliteDatabase;

/// Rows shown under each table in `table_info`
pub const SAMPLE_ROWS: i64 = 3;

/// Sample values longer than this are cut in `table_info`
const SAMPLE_VALUE_MAX_CHARS: usize = 100;

/// A relational store the agent can introspect and query
#[async_trait]
pub trait Database: Send + Sync {
    /// SQL dialect name, used in prompts
    fn dialect(&self) -> &'static str;

    async fn list_tables(&self) -> Result<Vec<String>>;

    /// `CREATE TABLE` statement plus sample rows for each requested table
    async fn table_info(&self, tables: &[String]) -> Result<String>;

    /// Run one statement and return every row
    async fn run(&self, sql: &str) -> Result<QueryOutput>;

    /// Schema description of every table, captured once for the generator prompt
    async fn full_table_info(&self) -> Result<String> {
        let tables = self.list_tables().await?;
        self.table_info(&tables).await
    }
}

/// Open the store named by `url` (`sqlite:` or `postgres:` schemes).
pub async fn connect(url: &str) -> Result<Arc<dyn Database>> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Ok(Arc::new(PostgresDatabase::connect(url).await?))
    } else if url.starts_with("sqlite:") {
        Ok(Arc::new(SqliteDatabase::connect(url).await?))
    } else {
        Err(AgentError::Config(format!(
            "unsupported database url '{}', expected sqlite: or postgres://",
            url
        )))
    }
}

/// A single decoded cell
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    /// Exact decimal (Postgres `NUMERIC`), kept as its decimal text
    Numeric(String),
    Bool(bool),
    Text(String),
    Blob(Vec<u8>),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "None"),
            SqlValue::Integer(v) => write!(f, "{}", v),
            SqlValue::Real(v) => write!(f, "{}", v),
            SqlValue::Numeric(v) => write!(f, "{}", v),
            SqlValue::Bool(v) => write!(f, "{}", if *v { "True" } else { "False" }),
            SqlValue::Text(v) => write!(f, "'{}'", v.replace('\'', "\\'")),
            SqlValue::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl SqlValue {
    /// Unquoted form used in sample-row blocks
    fn plain(&self) -> String {
        let text = match self {
            SqlValue::Text(v) => v.clone(),
            SqlValue::Null => "None".to_string(),
            other => other.to_string(),
        };
        if text.chars().count() > SAMPLE_VALUE_MAX_CHARS {
            let cut: String = text.chars().take(SAMPLE_VALUE_MAX_CHARS).collect();
            format!("{}...", cut)
        } else {
            text
        }
    }
}

/// Result set of one executed statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl QueryOutput {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column header line followed by one tuple per row.
    /// An empty result renders as an empty string.
    pub fn render(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        let mut out = self.columns.join(", ");
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
            out.push('\n');
            out.push('(');
            out.push_str(&cells.join(", "));
            if row.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        out
    }

    fn sample_block(&self, table: &str) -> String {
        let mut out = format!("/*\n{} rows from {} table:\n", self.rows.len(), table);
        out.push_str(&self.columns.join("\t"));
        out.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(SqlValue::plain).collect();
            out.push_str(&cells.join("\t"));
            out.push('\n');
        }
        out.push_str("*/");
        out
    }
}

/// Check requested table names against the store, keeping request order.
pub(crate) fn resolve_tables(requested: &[String], available: &[String]) -> Result<Vec<String>> {
    let requested: Vec<String> = requested
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let missing: Vec<&str> = requested
        .iter()
        .filter(|t| !available.contains(t))
        .map(String::as_str)
        .collect();

    if !missing.is_empty() {
        return Err(AgentError::Database(format!(
            "table_names {{{}}} not found in database",
            missing.join(", ")
        )));
    }

    Ok(requested)
}

pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Join one table's DDL and its sample rows
pub(crate) fn describe_table(create_statement: &str, table: &str, sample: &QueryOutput) -> String {
    format!(
        "{}\n\n{}",
        create_statement.trim(),
        sample.sample_block(table)
    )
}
