//! Prompt chains around the language model
//!
//! Each chain is a stateless request/response transform: a fixed system
//! instruction, the messages it is given, and whatever tools or output
//! format it binds.

pub mod answer_gen;
pub mod query_check;
pub mod query_gen;

pub use answer_gen::{AnswerSynthesizer, SynthesisReply};
pub use query_check::QueryChecker;
pub use query_gen::QueryGenerator;

/// Human-readable dialect name used inside prompts
pub(crate) fn dialect_label(dialect: &str) -> &'static str {
    match dialect {
        "postgresql" | "postgres" => "PostgreSQL",
        _ => "SQLite",
    }
}
