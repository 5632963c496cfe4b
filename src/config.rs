// src/config.rs

use std::{env, fmt, net::SocketAddr, str::FromStr};

use dotenvy::dotenv;

/// Default bounds for the number of questions in a generated revision quiz.
pub const DEFAULT_MIN_REVISION_QUESTIONS: u32 = 5;
pub const DEFAULT_MAX_REVISION_QUESTIONS: u32 = 50;

/// Default time limit (minutes) of a revision quiz when the client sends none.
pub const DEFAULT_REVISION_TIME_LIMIT: i32 = 15;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: SocketAddr,
    pub revision: RevisionSettings,
}

/// Tunables for revision quiz generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionSettings {
    pub min_questions: u32,
    pub max_questions: u32,
    pub default_time_limit: i32,
}

impl Default for RevisionSettings {
    fn default() -> Self {
        Self {
            min_questions: DEFAULT_MIN_REVISION_QUESTIONS,
            max_questions: DEFAULT_MAX_REVISION_QUESTIONS,
            default_time_limit: DEFAULT_REVISION_TIME_LIMIT,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} must be set", key),
            ConfigError::Invalid { key, value } => write!(f, "{} has an invalid value: {:?}", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bind_addr = parsed_or("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        let revision = RevisionSettings {
            min_questions: parsed_or("REVISION_MIN_QUESTIONS", DEFAULT_MIN_REVISION_QUESTIONS)?,
            max_questions: parsed_or("REVISION_MAX_QUESTIONS", DEFAULT_MAX_REVISION_QUESTIONS)?,
            default_time_limit: parsed_or("REVISION_DEFAULT_TIME_LIMIT", DEFAULT_REVISION_TIME_LIMIT)?,
        };

        if revision.min_questions == 0 || revision.min_questions > revision.max_questions {
            return Err(ConfigError::Invalid {
                key: "REVISION_MIN_QUESTIONS",
                value: revision.min_questions.to_string(),
            });
        }

        Ok(Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            revision,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn parsed_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}
