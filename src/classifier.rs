//! Message classifier
//!
//! The model speaks to the control loop through text markers (`Answer:`,
//! `Error:`, the success sentinel, fenced SQL). This module turns that text
//! into a `MessageKind` once, so routing never re-inspects raw prefixes.
//!
//! It also owns the SQL helpers: pulling a statement out of model prose and
//! deciding whether a statement is a single read-only query.

use crate::conversation::Message;
use crate::models::{ANSWER_PREFIX, ERROR_PREFIX, QUERY_SUCCESS_SENTINEL};
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::{PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

/// What the latest query-generation output means for the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Answer-prefixed SQL or a fenced SQL block
    SqlCandidate,
    /// Answer-prefixed prose with no SQL markers
    FinalAnswer,
    /// The internal success sentinel
    QuerySucceeded,
    /// Error-prefixed text
    ErrorText,
    /// Long unprefixed prose
    FreeText,
    /// Short text, bare `SELECT`, or an empty tool-call message
    Unclassified,
}

const SQL_FENCE: &str = "```sql";

/// Free text longer than this (in characters) ends the run
const FREE_TEXT_MIN_CHARS: usize = 20;

/// Classify a message. Order matters: each arm is the fallback for the ones above it.
pub fn classify(message: &Message) -> MessageKind {
    let content = message.content.as_str();

    if looks_like_sql(content) {
        MessageKind::SqlCandidate
    } else if content.starts_with(ANSWER_PREFIX) && !content.to_lowercase().contains("sql") {
        MessageKind::FinalAnswer
    } else if content == QUERY_SUCCESS_SENTINEL {
        MessageKind::QuerySucceeded
    } else if content.starts_with(ERROR_PREFIX) {
        MessageKind::ErrorText
    } else if content.chars().count() > FREE_TEXT_MIN_CHARS && !content.starts_with("SELECT") {
        MessageKind::FreeText
    } else {
        MessageKind::Unclassified
    }
}

fn looks_like_sql(content: &str) -> bool {
    content.starts_with(SQL_FENCE)
        || content.starts_with(&format!("{} {}", ANSWER_PREFIX, SQL_FENCE))
        || (content.starts_with(ANSWER_PREFIX) && content.contains("SELECT "))
}

/// Pull the SQL statement out of `Answer: ```sql …```` or `Answer: SELECT …`.
///
/// Returns `None` when the content carries neither form; callers then hand
/// the message to the validator unchanged.
pub fn extract_sql(content: &str) -> Option<String> {
    let body = if let Some(rest) = content.strip_prefix(ANSWER_PREFIX) {
        rest.trim_start()
    } else if content.starts_with(SQL_FENCE) {
        content
    } else {
        return None;
    };

    if let Some(start) = body.find(SQL_FENCE) {
        let after = &body[start + SQL_FENCE.len()..];
        let sql = match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        };
        let sql = sql.trim();
        return (!sql.is_empty()).then(|| sql.to_string());
    }

    if body.contains("SELECT ") {
        return Some(body.trim().to_string());
    }

    None
}

/// Check that `sql` is one read-only query in the store's dialect.
///
/// The statement is parsed, not scanned, so functions that share a name
/// with a statement keyword (`REPLACE(...)`) are fine while `REPLACE INTO`
/// is not. Anything the parser rejects is rejected here too.
pub fn check_read_only(sql: &str, dialect: &str) -> std::result::Result<(), String> {
    let statements = match dialect {
        "postgresql" | "postgres" => Parser::parse_sql(&PostgreSqlDialect {}, sql),
        _ => Parser::parse_sql(&SQLiteDialect {}, sql),
    }
    .map_err(|e| format!("query could not be parsed: {}", e))?;

    let statement = match statements.as_slice() {
        [] => return Err("empty query".to_string()),
        [statement] => statement,
        _ => return Err("only a single statement may be executed".to_string()),
    };

    match statement {
        Statement::Query(query) => check_query(query),
        other => Err(format!(
            "only SELECT queries are allowed, got {}",
            statement_label(other)
        )),
    }
}

fn check_query(query: &Query) -> std::result::Result<(), String> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query)?;
        }
    }
    check_set_expr(&query.body)
}

fn check_set_expr(body: &SetExpr) -> std::result::Result<(), String> {
    match body {
        SetExpr::Select(select) if select.into.is_some() => {
            Err("SELECT INTO creates a table and is not allowed".to_string())
        }
        SetExpr::Select(_) | SetExpr::Values(_) => Ok(()),
        SetExpr::Query(query) => check_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        _ => Err("data-modifying queries are not allowed".to_string()),
    }
}

fn statement_label(statement: &Statement) -> String {
    // first word of the rendered statement, e.g. INSERT, DROP, PRAGMA
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(content: &str) -> MessageKind {
        classify(&Message::assistant(content))
    }

    #[test]
    fn test_classification_precedence() {
        assert_eq!(
            kind("Answer: ```sql\nSELECT r.name FROM restaurants r\n```"),
            MessageKind::SqlCandidate
        );
        assert_eq!(
            kind("Answer: SELECT r.name FROM restaurants r"),
            MessageKind::SqlCandidate
        );
        assert_eq!(kind("```sql\nSELECT 1\n```"), MessageKind::SqlCandidate);
        assert_eq!(kind("Answer: 논현역 근처 맛집입니다."), MessageKind::FinalAnswer);
        assert_eq!(kind(QUERY_SUCCESS_SENTINEL), MessageKind::QuerySucceeded);
        assert_eq!(
            kind("Error: Query failed. Please rewrite your query and try again."),
            MessageKind::ErrorText
        );
        assert_eq!(
            kind("I could not find any restaurant matching that description."),
            MessageKind::FreeText
        );
        assert_eq!(kind("SELECT r.name FROM restaurants r"), MessageKind::Unclassified);
        assert_eq!(kind("ok"), MessageKind::Unclassified);
    }

    #[test]
    fn test_answer_mentioning_sql_is_not_final() {
        // "sql" anywhere disqualifies a final answer; long prose still ends the run
        assert_eq!(
            kind("Answer: the sqlite store has no such restaurant"),
            MessageKind::FreeText
        );
    }

    #[test]
    fn test_extract_sql_forms() {
        assert_eq!(
            extract_sql("Answer: ```sql\nSELECT r.name FROM restaurants r;\n```").as_deref(),
            Some("SELECT r.name FROM restaurants r;")
        );
        assert_eq!(
            extract_sql("Answer: SELECT r.name FROM restaurants r").as_deref(),
            Some("SELECT r.name FROM restaurants r")
        );
        assert_eq!(
            extract_sql("```sql\nSELECT 1\n```").as_deref(),
            Some("SELECT 1")
        );
        assert!(extract_sql("Answer: 맛집이 없습니다").is_none());
        assert!(extract_sql("SELECT 1").is_none());
    }

    #[test]
    fn test_read_only_accepts_selects() {
        let ok = [
            "SELECT r.name FROM restaurants r",
            "select r.name from restaurants r where r.review like '%update%';",
            "WITH t AS (SELECT 1 AS x) SELECT t.x FROM t",
            "SELECT r.name AS \"delete\" FROM restaurants r -- drop later\n",
            "/* insert */ SELECT 1;   ",
            "SELECT 'it''s; DROP TABLE menus' AS s",
        ];
        for sql in ok {
            assert!(check_read_only(sql, "sqlite").is_ok(), "{}", sql);
        }
    }

    #[test]
    fn test_read_only_rejects_mutations() {
        let bad = [
            "INSERT INTO restaurants (name) VALUES ('x')",
            "update restaurants set name = 'x'",
            "DELETE FROM menus",
            "DROP TABLE menus",
            "SELECT 1; DROP TABLE menus",
            "WITH gone AS (DELETE FROM menus RETURNING *) SELECT * FROM gone",
            "PRAGMA writable_schema = 1",
            "",
        ];
        for sql in bad {
            assert!(check_read_only(sql, "sqlite").is_err(), "{}", sql);
        }
    }

    #[test]
    fn test_replace_function_is_not_a_statement() {
        let normalized = "SELECT r.name AS restaurant_name FROM restaurants r \
             WHERE REPLACE(r.station_name, '역', '') LIKE '%논현%'";
        assert!(check_read_only(normalized, "sqlite").is_ok());
        assert!(check_read_only(normalized, "postgresql").is_ok());

        let replace_into = "REPLACE INTO restaurants (name, address) VALUES ('x', 'y')";
        assert!(check_read_only(replace_into, "sqlite").is_err());
        assert!(check_read_only(replace_into, "postgresql").is_err());
    }

    #[test]
    fn test_postgres_writes_hidden_in_queries() {
        let bad = [
            "WITH added AS (INSERT INTO menus (menu_name) VALUES ('x') RETURNING id) SELECT * FROM added",
            "WITH gone AS (DELETE FROM menus RETURNING *) SELECT * FROM gone",
            "SELECT * INTO menus_backup FROM menus",
        ];
        for sql in bad {
            assert!(check_read_only(sql, "postgresql").is_err(), "{}", sql);
        }

        let union = "SELECT r.name FROM restaurants r UNION ALL SELECT m.menu_name FROM menus m";
        assert!(check_read_only(union, "postgresql").is_ok());
    }

    #[test]
    fn test_generated_candidates_never_pass_with_dml() {
        let verbs = ["INSERT INTO", "UPDATE", "DELETE FROM", "DROP TABLE"];
        let wrappers: [fn(&str) -> String; 3] = [
            |s: &str| format!("Answer: {}", s),
            |s: &str| format!("Answer: ```sql\n{}\n```", s),
            |s: &str| format!("```sql\n{}\n```", s),
        ];

        for verb in verbs {
            for case in [verb.to_string(), verb.to_lowercase()] {
                let statement = format!("SELECT r.name FROM restaurants r; {} restaurants", case);
                for wrap in wrappers {
                    let content = wrap(&statement);
                    let sql = extract_sql(&content).unwrap_or(content);
                    assert!(check_read_only(&sql, "sqlite").is_err(), "{}", sql);
                }
            }
        }
    }
}
