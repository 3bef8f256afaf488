//! Query validator chain

use super::dialect_label;
use crate::conversation::Message;
use crate::llm::{LanguageModel, ModelRequest, ToolChoice, ToolSpec};
use crate::Result;
use std::sync::Arc;

const QUERY_CHECK_SYSTEM: &str = "You are a SQL expert with a strong attention to detail.
Double check the {dialect} query for common mistakes, including:
- Using NOT IN with NULL values
- Using UNION when UNION ALL should have been used
- Using BETWEEN for exclusive ranges
- Data type mismatch in predicates
- Properly quoting identifiers
- Using the correct number of arguments for functions
- Casting to the correct data type
- Using id columns each table for joins

If there are any of the above mistakes, rewrite the query. If there are no mistakes, just reproduce the original query.

You will call the appropriate tool to execute the query after running this check.";

/// Reviews a candidate statement and is forced to call the query tool with
/// the (possibly corrected) statement.
pub struct QueryChecker {
    model: Arc<dyn LanguageModel>,
    system: String,
    query_tool: ToolSpec,
}

impl QueryChecker {
    pub fn new(model: Arc<dyn LanguageModel>, dialect: &str, query_tool: ToolSpec) -> Self {
        Self {
            model,
            system: QUERY_CHECK_SYSTEM.replace("{dialect}", dialect_label(dialect)),
            query_tool,
        }
    }

    /// The statement is sent as the only turn, so no earlier history leaks in.
    pub async fn check(&self, statement: &str) -> Result<Message> {
        let tool_name = self.query_tool.name.clone();
        let request = ModelRequest::new(vec![Message::user(statement)])
            .with_system(self.system.clone())
            .with_tools(vec![self.query_tool.clone()], ToolChoice::Required(tool_name));

        Ok(self.model.generate(request).await?.into_message())
    }
}
