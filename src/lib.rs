//! Meokten restaurant agent
//!
//! Answers restaurant questions by turning them into SQL over a two-table
//! store (`restaurants`, `menus`), running the query, and summarizing the
//! rows into an answer plus map-ready restaurant records.
//!
//! CONTROL LOOP:
//! LIST TABLES → GET SCHEMA → GENERATE → VALIDATE → EXECUTE → {ANSWER | REGENERATE}

pub mod agent;
pub mod api;
pub mod chains;
pub mod classifier;
pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod state;
pub mod tools;

pub use error::{AgentError, Result};

// Re-export common types
pub use agent::AgentGraph;
pub use models::*;
