//! Identity verification, an external collaborator kept behind a trait so
//! `session` never depends on a concrete token format.

pub mod jwks;
pub mod null;

use async_trait::async_trait;
use thiserror::Error;

pub const LOG_TARGET: &str = "auth";

#[derive(Debug, Clone)]
pub struct IdentityClaims {
    pub user_id: String,
    pub name: Option<String>,
}

#[derive(Debug, Error, Clone)]
pub enum AuthError {
    #[error("missing or malformed token")]
    Malformed,
    #[error("token verification failed: {0}")]
    Invalid(String),
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),
}

#[async_trait]
pub trait Authority: Send + Sync {
    async fn validate(&self, token: &str) -> Result<IdentityClaims, AuthError>;
}

pub use jwks::JwksAuthority;
pub use null::NullAuthority;
