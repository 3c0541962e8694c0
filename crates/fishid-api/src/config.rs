//! API configuration.

use std::time::Duration;

/// Identity provider settings, also handed to the front end.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub region: String,
    /// User pool identifier
    pub pool_id: String,
    /// Application client identifier
    pub client_id: String,
    /// Override for the JWKS location; derived from region and pool otherwise
    pub jwks_url: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            region: "eu-north-1".to_string(),
            pool_id: String::new(),
            client_id: String::new(),
            jwks_url: None,
        }
    }
}

impl IdentityConfig {
    pub fn from_env() -> Self {
        Self {
            region: std::env::var("IDENTITY_REGION").unwrap_or_else(|_| "eu-north-1".to_string()),
            pool_id: std::env::var("IDENTITY_POOL_ID").unwrap_or_default(),
            client_id: std::env::var("IDENTITY_CLIENT_ID").unwrap_or_default(),
            jwks_url: std::env::var("IDENTITY_JWKS_URL").ok().filter(|s| !s.is_empty()),
        }
    }

    /// Token issuer for the configured pool.
    pub fn issuer(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.region, self.pool_id
        )
    }

    pub fn jwks_url(&self) -> String {
        self.jwks_url
            .clone()
            .unwrap_or_else(|| format!("{}/.well-known/jwks.json", self.issuer()))
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second
    pub rate_limit_rps: u32,
    /// Rate limit burst
    pub rate_limit_burst: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Shared secret for object-event signatures; ingestion is refused without it
    pub event_secret: Option<String>,
    pub identity: IdentityConfig,
    /// Advised client poll interval
    pub poll_interval: Duration,
    /// Advised number of polls before a client gives up
    pub poll_max_attempts: u32,
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            max_body_size: 1024 * 1024, // 1MB
            environment: "development".to_string(),
            event_secret: None,
            identity: IdentityConfig::default(),
            poll_interval: Duration::from_secs(3),
            poll_max_attempts: 20,
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            rate_limit_burst: std::env::var("RATE_LIMIT_BURST")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            event_secret: std::env::var("FISHID_EVENT_SECRET").ok().filter(|s| !s.is_empty()),
            identity: IdentityConfig::from_env(),
            poll_interval: Duration::from_secs(
                std::env::var("POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3),
            ),
            poll_max_attempts: std::env::var("POLL_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwks_url_derived_from_pool() {
        let identity = IdentityConfig {
            region: "eu-north-1".into(),
            pool_id: "eu-north-1_Abc".into(),
            client_id: "client".into(),
            jwks_url: None,
        };
        assert_eq!(
            identity.jwks_url(),
            "https://cognito-idp.eu-north-1.amazonaws.com/eu-north-1_Abc/.well-known/jwks.json"
        );
    }

    #[test]
    fn test_default_poll_budget() {
        let config = ApiConfig::default();
        assert_eq!(config.poll_interval * config.poll_max_attempts, Duration::from_secs(60));
        assert!(!config.is_production());
    }
}
