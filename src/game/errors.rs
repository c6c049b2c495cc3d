//! Error taxonomy for action rejection.
//!
//! Kinds, not a strict Rust type hierarchy: a single flat `thiserror`
//! enum with one variant per kind, no nested error types.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum GameError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("inventory error: {0}")]
    Inventory(String),
    #[error("match error: {0}")]
    Match(String),
    #[error("resource error: {0}")]
    Resource(String),
}

impl GameError {
    /// The message sent back verbatim in an `error{message}` wire frame.
    pub fn client_message(&self) -> String {
        self.to_string()
    }
}
