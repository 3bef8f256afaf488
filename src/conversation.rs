//! Conversation messages exchanged between the control loop, the model and the tools

use crate::models::Answers;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A model-initiated request to run a named tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            args,
        }
    }
}

/// A single conversation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub content: String,
    /// Tool invocations requested by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Links a tool result to the call that produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Name of the tool that produced this result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Structured answer attached by the answer synthesizer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<Arc<Answers>>,
}

impl Message {
    fn base(role: Role, content: String) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            result_data: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::base(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::base(Role::Assistant, content.into())
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::base(Role::Assistant, content.into())
        }
    }

    /// Assistant answer carrying the synthesizer's structured payload
    pub fn assistant_with_result(content: impl Into<String>, result: Answers) -> Self {
        Self {
            result_data: Some(Arc::new(result)),
            ..Self::base(Role::Assistant, content.into())
        }
    }

    pub fn tool(
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
        name: Option<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name,
            ..Self::base(Role::Tool, content.into())
        }
    }

    pub fn is_tool_result_from(&self, tool_name: &str) -> bool {
        self.role == Role::Tool && self.name.as_deref() == Some(tool_name)
    }

    pub fn is_error(&self) -> bool {
        self.content.starts_with(crate::models::ERROR_PREFIX)
    }
}

/// Append-only message log owned by a single run.
///
/// Messages are reference counted so deriving a new conversation from an
/// old one never copies message bodies.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Arc<Message>>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_question(question: impl Into<String>) -> Self {
        Self::new().with(vec![Message::user(question)])
    }

    /// New conversation with `appended` after the existing messages
    pub fn with(&self, appended: Vec<Message>) -> Self {
        let mut messages = Vec::with_capacity(self.messages.len() + appended.len());
        messages.extend(self.messages.iter().cloned());
        messages.extend(appended.into_iter().map(Arc::new));
        Self { messages }
    }

    pub fn messages(&self) -> impl DoubleEndedIterator<Item = &Message> {
        self.messages.iter().map(|m| m.as_ref())
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last().map(|m| m.as_ref())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// First user message of the run (the original question)
    pub fn question(&self) -> Option<&str> {
        self.messages()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Most recent non-error result of `tool_name`, scanning backwards and
    /// skipping the last `skip_last` messages.
    pub fn latest_success_from(&self, tool_name: &str, skip_last: usize) -> Option<&Message> {
        let end = self.messages.len().saturating_sub(skip_last);
        self.messages[..end]
            .iter()
            .rev()
            .map(|m| m.as_ref())
            .find(|m| m.is_tool_result_from(tool_name) && !m.is_error())
    }
}
