use std::error::Error;
use std::fmt;

use crate::model::MessageRole;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingCredential { var: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential { var } => write!(
                f,
                "{var} is not set. Export it (or add it to .env) before starting a chat."
            ),
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogError {
    message: String,
}

impl CatalogError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error fetching models: {}", self.message)
    }
}

impl Error for CatalogError {}

/// Rejections from [`crate::transcript::Transcript::append`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptError {
    InvalidRole(MessageRole),
    EmptyMessage(MessageRole),
    OutOfTurn(MessageRole),
}

impl fmt::Display for TranscriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRole(role) => write!(
                f,
                "cannot append a {} message; only user and assistant messages are accepted",
                role.as_str()
            ),
            Self::EmptyMessage(role) => write!(f, "refusing to store an empty {} message", role.as_str()),
            Self::OutOfTurn(role) => write!(
                f,
                "a {} message cannot follow another {} message",
                role.as_str(),
                role.as_str()
            ),
        }
    }
}

impl Error for TranscriptError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionError {
    message: String,
}

impl CompletionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for CompletionError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error during chat: {}", self.message)
    }
}

impl Error for CompletionError {}
