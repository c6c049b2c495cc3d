use async_trait::async_trait;
use uuid::Uuid;

use super::{AuthError, Authority, IdentityClaims};

/// Local-development fallback used when `--auth-jwks-url` is unset.
/// Treats the token itself as an opaque, self-asserted identity, minting
/// a fresh guest id when none is supplied.
#[derive(Debug, Default)]
pub struct NullAuthority;

#[async_trait]
impl Authority for NullAuthority {
    async fn validate(&self, token: &str) -> Result<IdentityClaims, AuthError> {
        let user_id = if token.trim().is_empty() {
            format!("guest:{}", Uuid::new_v4())
        } else {
            token.trim().to_string()
        };
        Ok(IdentityClaims { user_id, name: None })
    }
}
