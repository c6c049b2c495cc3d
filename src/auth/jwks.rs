use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{error, warn};

use super::{AuthError, Authority, IdentityClaims, LOG_TARGET};

const CACHE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    name: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
}

struct Cache {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// Verifies bearer tokens against a JWKS document fetched over HTTP.
/// Keys are cached for `CACHE_TTL` and refreshed lazily on the next
/// validation after expiry.
pub struct JwksAuthority {
    jwks_url: String,
    http: reqwest::Client,
    cache: RwLock<Option<Cache>>,
}

impl JwksAuthority {
    pub fn new(jwks_url: String) -> Self {
        Self {
            jwks_url,
            http: reqwest::Client::new(),
            cache: RwLock::new(None),
        }
    }

    async fn jwks(&self) -> Result<JwkSet, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.as_ref() {
                if entry.fetched_at.elapsed() < CACHE_TTL {
                    return Ok(entry.jwks.clone());
                }
            }
        }
        let jwks = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|err| AuthError::ProviderUnavailable(err.to_string()))?
            .json::<JwkSet>()
            .await
            .map_err(|err| AuthError::ProviderUnavailable(err.to_string()))?;
        *self.cache.write().await = Some(Cache {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });
        Ok(jwks)
    }
}

#[async_trait]
impl Authority for JwksAuthority {
    async fn validate(&self, token: &str) -> Result<IdentityClaims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::Malformed)?;
        let kid = header.kid.clone().ok_or(AuthError::Malformed)?;

        let jwks = self.jwks().await?;
        let jwk = jwks.find(&kid).ok_or_else(|| {
            warn!(target: LOG_TARGET, %kid, "no matching jwk for token");
            AuthError::Invalid("unknown signing key".into())
        })?;
        let decoding_key = DecodingKey::from_jwk(jwk).map_err(|err| {
            error!(target: LOG_TARGET, %err, "failed to build decoding key from jwk");
            AuthError::Invalid("unusable signing key".into())
        })?;

        let algorithm = header.alg;
        if !matches!(algorithm, Algorithm::RS256 | Algorithm::ES256) {
            return Err(AuthError::Invalid("unsupported algorithm".into()));
        }
        let validation = Validation::new(algorithm);
        let data = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|err| AuthError::Invalid(err.to_string()))?;

        Ok(IdentityClaims {
            user_id: data.claims.sub,
            name: data.claims.name.or(data.claims.preferred_username),
        })
    }
}
