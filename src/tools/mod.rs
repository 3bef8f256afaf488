//! SQL tools and the tool node
//!
//! Three tools are exposed to the model: list tables, fetch schema, and run
//! a query. The query tool is the executor: it never fails across its
//! boundary, every problem comes back as `Error:`-prefixed text.

use crate::classifier::check_read_only;
use crate::conversation::{Message, ToolCall};
use crate::db::Database;
use crate::error::AgentError;
use crate::llm::ToolSpec;
use crate::models::ERROR_PREFIX;
use crate::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub const LIST_TABLES_TOOL: &str = "sql_db_list_tables";
pub const SCHEMA_TOOL: &str = "sql_db_schema";
pub const QUERY_TOOL: &str = "db_query_tool";

/// Returned by the executor when a query produced no rows
pub const EMPTY_RESULT_ERROR: &str = "Error: Query failed. Please rewrite your query and try again.";

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// JSON schema of the arguments object
    fn parameters(&self) -> Value;

    async fn execute(&self, args: &Value) -> Result<String>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Tool node bound to the named tools
    pub fn node(&self, names: &[&str]) -> Result<ToolNode> {
        let tools = names
            .iter()
            .map(|name| {
                self.get(name)
                    .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ToolNode { tools })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::InvalidToolInput(format!("Expected '{}' in tool input", key)))
}

/// Lists table names, comma separated
pub struct ListTablesTool {
    db: Arc<dyn Database>,
}

impl ListTablesTool {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl Tool for ListTablesTool {
    fn name(&self) -> &'static str {
        LIST_TABLES_TOOL
    }

    fn description(&self) -> &'static str {
        "Input is an empty string, output is a comma-separated list of tables in the database."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: &Value) -> Result<String> {
        Ok(self.db.list_tables().await?.join(", "))
    }
}

/// Schema and sample rows for the requested tables
pub struct SchemaTool {
    db: Arc<dyn Database>,
}

impl SchemaTool {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl Tool for SchemaTool {
    fn name(&self) -> &'static str {
        SCHEMA_TOOL
    }

    fn description(&self) -> &'static str {
        "Input to this tool is a comma-separated list of tables, output is the schema and sample rows for those tables. \
         Be sure that the tables actually exist by calling sql_db_list_tables first! \
         Example Input: table1, table2, table3"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "table_names": {
                    "type": "string",
                    "description": "A comma-separated list of the table names for which to return the schema. Example input: 'table1, table2, table3'"
                }
            },
            "required": ["table_names"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let tables: Vec<String> = require_str(args, "table_names")?
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        self.db.table_info(&tables).await
    }
}

/// The query executor
pub struct QueryTool {
    db: Arc<dyn Database>,
}

impl QueryTool {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Run `sql`, reporting every failure as `Error:` text instead of an error value.
    pub async fn run_no_throw(&self, sql: &str) -> String {
        info!(query = %sql, "Executing query");

        if let Err(reason) = check_read_only(sql, self.db.dialect()) {
            warn!(query = %sql, %reason, "Rejected non read-only query");
            return format!("{} {}", ERROR_PREFIX, reason);
        }

        match self.db.run(sql).await {
            Ok(output) if output.is_empty() => {
                warn!("Query returned no rows");
                EMPTY_RESULT_ERROR.to_string()
            }
            Ok(output) => {
                info!(rows = output.rows.len(), "Query succeeded");
                output.render()
            }
            Err(e) => {
                warn!(error = %e, "Query failed");
                format!("{} {}", ERROR_PREFIX, e)
            }
        }
    }
}

#[async_trait::async_trait]
impl Tool for QueryTool {
    fn name(&self) -> &'static str {
        QUERY_TOOL
    }

    fn description(&self) -> &'static str {
        "Run SQL queries against a database and return results. \
         Returns an error message if the query is incorrect. \
         If an error is returned, rewrite the query, check, and retry."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "A single read-only SQL SELECT statement" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let query = require_str(args, "query")?;
        Ok(self.run_no_throw(query).await)
    }
}

/// Executes the tool calls of an assistant message.
///
/// A failing call still yields a tool message (without a tool name) that
/// tells the model what went wrong.
pub struct ToolNode {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolNode {
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub async fn invoke(&self, message: &Message) -> Vec<Message> {
        if message.tool_calls.is_empty() {
            warn!("Tool node reached without tool calls");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(message.tool_calls.len());
        for call in &message.tool_calls {
            let outcome = self.call(call).await;
            results.push(match outcome {
                Ok(content) => Message::tool(content, call.id.clone(), Some(call.name.clone())),
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool call failed");
                    Message::tool(
                        format!("Here is the error: {:?}\n\nPlease fix your mistakes.", e),
                        call.id.clone(),
                        None,
                    )
                }
            });
        }
        results
    }

    async fn call(&self, call: &ToolCall) -> Result<String> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
        tool.execute(&call.args).await
    }
}

/// Registry with the three SQL tools over `db`
pub fn create_sql_toolkit(db: Arc<dyn Database>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ListTablesTool::new(db.clone())));
    registry.register(Arc::new(SchemaTool::new(db.clone())));
    registry.register(Arc::new(QueryTool::new(db)));
    registry
}
