//! Node bodies of the agent graph
//!
//! Each node reads the current `RunState` and returns the messages it
//! appends. Only the model-bound schema and check nodes propagate errors;
//! the rest turn failures into messages the router understands.

use super::AgentGraph;
use crate::classifier::extract_sql;
use crate::conversation::{Message, ToolCall};
use crate::error::AgentError;
use crate::llm::{ModelRequest, ToolChoice};
use crate::models::{ANSWER_PREFIX, ERROR_PREFIX, QUERY_SUCCESS_SENTINEL};
use crate::state::RunState;
use crate::tools::{LIST_TABLES_TOOL, QUERY_TOOL};
use crate::Result;
use serde_json::json;
use tracing::{error, info, warn};

/// Generator output longer than this is taken as a direct answer
const DIRECT_ANSWER_MIN_CHARS: usize = 50;

pub(crate) const NO_RESULT_ANSWER: &str = "Answer: 죄송합니다, 쿼리 결과를 찾을 수 없습니다.";

/// Long prose that is not SQL, an error echo, or already an answer
fn is_direct_answer(content: &str) -> bool {
    content.chars().count() > DIRECT_ANSWER_MIN_CHARS
        && !content.starts_with("SELECT")
        && !content.starts_with(ERROR_PREFIX)
        && !content.starts_with(ANSWER_PREFIX)
}

fn last_message(state: &RunState) -> Result<&Message> {
    state
        .last_message()
        .ok_or_else(|| AgentError::Unknown("conversation is empty".to_string()))
}

impl AgentGraph {
    /// Bootstrap call to the list-tables tool; no model involved.
    pub(crate) fn first_tool_call(&self) -> Vec<Message> {
        vec![Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new(LIST_TABLES_TOOL, json!({}))],
        )]
    }

    pub(crate) async fn list_tables_tool(&self, state: &RunState) -> Result<Vec<Message>> {
        Ok(self.list_tables.invoke(last_message(state)?).await)
    }

    /// Let the model pick the relevant tables through the schema tool.
    pub(crate) async fn model_get_schema(&self, state: &RunState) -> Result<Vec<Message>> {
        let request = ModelRequest::new(state.conversation.messages().cloned().collect())
            .with_tools(self.get_schema.specs(), ToolChoice::Auto);

        let response = self.model.generate(request).await?;
        Ok(vec![response.into_message()])
    }

    pub(crate) async fn get_schema_tool(&self, state: &RunState) -> Result<Vec<Message>> {
        Ok(self.get_schema.invoke(last_message(state)?).await)
    }

    pub(crate) async fn query_gen(&self, state: &RunState) -> Vec<Message> {
        if state
            .conversation
            .latest_success_from(QUERY_TOOL, 1)
            .is_some()
        {
            return vec![Message::assistant(QUERY_SUCCESS_SENTINEL)];
        }

        match self.generator.generate(&state.conversation).await {
            Ok(mut message) => {
                if is_direct_answer(&message.content) {
                    message.content = format!("{} {}", ANSWER_PREFIX, message.content);
                }
                vec![message]
            }
            Err(e) => {
                error!(run_id = %state.thread_id, error = %e, "Query generation failed");
                vec![Message::assistant(format!(
                    "{} 쿼리 생성 중 오류가 발생했습니다: {}",
                    ERROR_PREFIX, e
                ))]
            }
        }
    }

    /// Hand the candidate statement to the validator, which calls the query tool.
    pub(crate) async fn correct_query(&self, state: &RunState) -> Result<Vec<Message>> {
        let last = last_message(state)?;

        let statement = extract_sql(&last.content).unwrap_or_else(|| last.content.clone());

        Ok(vec![self.checker.check(&statement).await?])
    }

    pub(crate) async fn execute_query(&self, state: &RunState) -> Result<Vec<Message>> {
        Ok(self.execute_query.invoke(last_message(state)?).await)
    }

    pub(crate) fn process_query_result(&self, state: &RunState) -> Result<Vec<Message>> {
        let last = last_message(state)?;

        if last.is_tool_result_from(QUERY_TOOL) {
            if last.is_error() {
                error!(run_id = %state.thread_id, result = %last.content, "Query execution failed");
                return Ok(vec![Message::assistant(last.content.clone())]);
            }
            info!(run_id = %state.thread_id, "Query executed, generating answer");
            return Ok(vec![Message::assistant(QUERY_SUCCESS_SENTINEL)]);
        }

        warn!(
            run_id = %state.thread_id,
            role = ?last.role,
            name = ?last.name,
            "Unexpected message after query execution"
        );
        Ok(vec![last.clone()])
    }

    pub(crate) async fn generate_answer(&self, state: &RunState) -> Vec<Message> {
        let Some(result) = state.conversation.latest_success_from(QUERY_TOOL, 0) else {
            return vec![Message::assistant(NO_RESULT_ANSWER)];
        };

        let question = state.conversation.question().unwrap_or_default();

        match self.synthesizer.synthesize(question, &result.content).await {
            Ok(reply) => vec![reply.into_message()],
            Err(e) => {
                error!(run_id = %state.thread_id, error = %e, "Answer synthesis failed");
                vec![Message::assistant(format!(
                    "{} 죄송합니다, 쿼리 결과를 해석하는 중 오류가 발생했습니다: {}",
                    ANSWER_PREFIX, e
                ))]
            }
        }
    }
}
