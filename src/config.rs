//! Runtime configuration loaded from the environment (`.env` supported)

use crate::error::AgentError;
use crate::Result;
use std::env;
use std::str::FromStr;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://meokten.db";

/// Node executions allowed per `run_agent` call
pub const DEFAULT_RECURSION_LIMIT: usize = 10;

/// Conversation length after which `should_continue` forces END
pub const DEFAULT_MAX_MESSAGES: usize = 20;

pub const DEFAULT_PORT: u16 = 8080;

/// Finished runs kept in memory before the oldest is evicted
pub const DEFAULT_CHECKPOINT_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub database_url: String,
    pub recursion_limit: usize,
    pub max_messages: usize,
    pub checkpoint_capacity: usize,
    pub port: u16,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            max_messages: DEFAULT_MAX_MESSAGES,
            checkpoint_capacity: DEFAULT_CHECKPOINT_CAPACITY,
            port: DEFAULT_PORT,
        }
    }
}

impl AgentConfig {
    /// Load `.env` (if present) and read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .or_else(|| postgres_url_from_parts(&lookup))
            .unwrap_or(defaults.database_url);

        Ok(Self {
            gemini_api_key: lookup("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: lookup("GEMINI_MODEL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.gemini_model),
            database_url,
            recursion_limit: parse_or(&lookup, "AGENT_RECURSION_LIMIT", defaults.recursion_limit)?,
            max_messages: parse_or(&lookup, "AGENT_MAX_MESSAGES", defaults.max_messages)?,
            checkpoint_capacity: parse_or(
                &lookup,
                "AGENT_CHECKPOINT_CAPACITY",
                defaults.checkpoint_capacity,
            )?,
            port: match lookup("PORT").or_else(|| lookup("API_PORT")) {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    AgentError::Config(format!("PORT must be a port number, got '{}'", raw))
                })?,
                None => defaults.port,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            AgentError::Config(format!("{} must be a positive integer, got '{}'", key, raw))
        }),
        _ => Ok(default),
    }
}

fn postgres_url_from_parts<F>(lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let host = lookup("DB_HOST")?;
    let user = lookup("DB_USER")?;
    let name = lookup("DB_NAME")?;
    let password = lookup("DB_PASSWORD").unwrap_or_default();
    let port = lookup("DB_PORT").unwrap_or_else(|| "5432".to_string());

    Some(format!(
        "postgresql://{}:{}@{}:{}/{}",
        user, password, host, port, name
    ))
}
