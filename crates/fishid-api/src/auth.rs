//! Identity token authentication.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::IdentityConfig;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// JWKS cache TTL.
const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600); // 1 hour

/// Minimum spacing between refreshes triggered by unknown key IDs.
const JWKS_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Verified identity of a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaim {
    pub subject: String,
    pub email: Option<String>,
}

/// Turns a bearer token into an identity, or rejects it.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> ApiResult<IdentityClaim>;
}

/// Decoded identity token claims.
#[derive(Debug, Clone, Deserialize)]
struct TokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    /// Present on ID tokens
    #[serde(default)]
    aud: Option<String>,
    /// Present on access tokens
    #[serde(default)]
    client_id: Option<String>,
}

/// JWKS document.
#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkKey>,
}

#[derive(Debug, Clone, Deserialize)]
struct JwkKey {
    kid: String,
    n: String,
    e: String,
}

/// RS256 verifier backed by a cached JWKS.
///
/// Keys are fetched on first use, refreshed after the TTL, and refreshed
/// early when a token names a key ID the cache does not hold.
pub struct JwksVerifier {
    http: Client,
    jwks_url: String,
    issuer: String,
    client_id: String,
    keys: RwLock<HashMap<String, DecodingKey>>,
    last_refresh: RwLock<Option<Instant>>,
}

impl JwksVerifier {
    pub fn new(config: &IdentityConfig) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            jwks_url: config.jwks_url(),
            issuer: config.issuer(),
            client_id: config.client_id.clone(),
            keys: RwLock::new(HashMap::new()),
            last_refresh: RwLock::new(None),
        })
    }

    /// Refresh JWKS keys.
    async fn refresh_keys(&self) -> ApiResult<()> {
        debug!(url = %self.jwks_url, "Refreshing JWKS keys");

        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ApiError::internal(format!("JWKS fetch failed: {}", e)))?;
        let jwks: JwksResponse = response
            .json()
            .await
            .map_err(|e| ApiError::internal(format!("Invalid JWKS document: {}", e)))?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => {
                    keys.insert(jwk.kid, key);
                }
                Err(e) => warn!(kid = %jwk.kid, "Skipping unusable JWK: {}", e),
            }
        }

        let key_count = keys.len();
        *self.keys.write().await = keys;
        *self.last_refresh.write().await = Some(Instant::now());

        debug!("Refreshed {} JWKS keys", key_count);
        Ok(())
    }

    /// Get decoding key for a key ID.
    async fn get_key(&self, kid: &str) -> Option<DecodingKey> {
        let last = *self.last_refresh.read().await;
        let stale = last.map_or(true, |t| t.elapsed() > JWKS_CACHE_TTL);

        if stale {
            if let Err(e) = self.refresh_keys().await {
                warn!("Failed to refresh JWKS keys: {}", e);
            }
        }

        if let Some(key) = self.keys.read().await.get(kid).cloned() {
            return Some(key);
        }

        // Unknown kid: the pool may have rotated keys.
        let recently = last.map_or(false, |t| t.elapsed() < JWKS_MIN_REFRESH_INTERVAL);
        if !stale && !recently {
            if let Err(e) = self.refresh_keys().await {
                warn!("Failed to refresh JWKS keys: {}", e);
            }
            return self.keys.read().await.get(kid).cloned();
        }
        None
    }
}

#[async_trait]
impl IdentityVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> ApiResult<IdentityClaim> {
        let header = decode_header(token)
            .map_err(|e| ApiError::unauthorized(format!("Invalid token header: {}", e)))?;

        let kid = header
            .kid
            .ok_or_else(|| ApiError::unauthorized("Token missing key ID"))?;

        let key = self
            .get_key(&kid)
            .await
            .ok_or_else(|| ApiError::unauthorized("Unknown key ID"))?;

        // ID tokens carry `aud`, access tokens `client_id`; checked below.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_aud = false;

        let claims = decode::<TokenClaims>(token, &key, &validation)
            .map_err(|e| ApiError::unauthorized(format!("Token validation failed: {}", e)))?
            .claims;

        if !self.client_id.is_empty() {
            let client = claims.aud.as_deref().or(claims.client_id.as_deref());
            if client != Some(self.client_id.as_str()) {
                return Err(ApiError::unauthorized("Token issued for another client"));
            }
        }

        Ok(IdentityClaim {
            subject: claims.sub,
            email: claims.email,
        })
    }
}

/// Authenticated user extracted from request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub subject: String,
    pub email: Option<String>,
}

impl From<IdentityClaim> for AuthUser {
    fn from(claim: IdentityClaim) -> Self {
        Self {
            subject: claim.subject,
            email: claim.email,
        }
    }
}

/// Axum extractor for authenticated user.
#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let result = authenticate(parts, state).await;
        if let Err(e) = &result {
            metrics::record_auth_failure();
            debug!(path = %parts.uri.path(), "Rejected request: {}", e);
        }
        result
    }
}

async fn authenticate(parts: &Parts, state: &AppState) -> ApiResult<AuthUser> {
    let auth_header = parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header format"))?;

    let claim = state.verifier.verify(token).await?;
    Ok(AuthUser::from(claim))
}
