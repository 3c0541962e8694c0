//! Sessions and bearer tokens.
//!
//! A [`TokenProvider`] is consulted before every request. The
//! [`CachedTokenProvider`] wraps a [`TokenSource`] (the identity provider
//! sign-in or refresh call) and keeps one token around:
//! - refreshed a margin ahead of expiry
//! - at most one refresh in flight
//! - on refresh failure, the previous token is used while it still works

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Refresh margin: refresh the token 60 seconds before expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Lifetime assumed when the identity provider does not state one.
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

/// A token as handed out by the identity provider.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: Option<Duration>,
}

impl IssuedToken {
    pub fn new(access_token: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            access_token: access_token.into(),
            expires_in: Some(expires_in),
        }
    }
}

/// Obtains fresh tokens, typically by calling the identity provider.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> ClientResult<IssuedToken>;
}

/// Supplies the bearer token for the next request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> ClientResult<String>;
}

/// Always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> ClientResult<String> {
        Ok(self.token.clone())
    }
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    /// Valid with the refresh margin to spare.
    fn is_valid(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    /// Still accepted by the server, even if a refresh is due.
    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Token provider with single-flight refresh over a [`TokenSource`].
pub struct CachedTokenProvider {
    source: Arc<dyn TokenSource>,
    cache: RwLock<Option<CachedToken>>,
}

impl CachedTokenProvider {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached token, e.g. after the server rejected it.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn refresh(&self, cache: &mut Option<CachedToken>) -> ClientResult<String> {
        match self.source.fetch_token().await {
            Ok(token) => {
                let ttl = token.expires_in.unwrap_or(TOKEN_DEFAULT_TTL);
                *cache = Some(CachedToken {
                    access_token: token.access_token.clone(),
                    expires_at: Instant::now() + ttl,
                });
                debug!(ttl_secs = ttl.as_secs(), "Refreshed identity token");
                Ok(token.access_token)
            }
            Err(e) => {
                if let Some(cached) = cache.as_ref() {
                    if cached.is_usable() {
                        warn!("Token refresh failed, using existing token: {}", e);
                        return Ok(cached.access_token.clone());
                    }
                }
                Err(ClientError::auth(format!("Failed to obtain token: {}", e)))
            }
        }
    }
}

#[async_trait]
impl TokenProvider for CachedTokenProvider {
    async fn bearer_token(&self) -> ClientResult<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited
        if let Some(cached) = cache.as_ref() {
            if cached.is_valid() {
                return Ok(cached.access_token.clone());
            }
        }

        self.refresh(&mut cache).await
    }
}

/// Where the API lives and who is calling it.
#[derive(Clone)]
pub struct Session {
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl Session {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>) -> ClientResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ClientError::config(format!("Invalid API URL '{}': {}", base_url, e)))?;
        // A base path such as `/prod` must stay a directory when joined.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { base_url, tokens })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for an API path such as `/api/upload-url`.
    ///
    /// The path is resolved under the base URL's path, so a base of
    /// `https://host/prod` yields `https://host/prod/api/upload-url`.
    pub fn endpoint(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::config(format!("Invalid API path '{}': {}", path, e)))
    }

    /// Bearer token for the next request.
    pub async fn bearer_token(&self) -> ClientResult<String> {
        self.tokens.bearer_token().await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Issues `token-N` with a fixed lifetime; fails once `fail` is set.
    struct CountingSource {
        calls: AtomicU32,
        ttl: Duration,
        fail: std::sync::atomic::AtomicBool,
    }

    impl CountingSource {
        fn new(ttl: Duration) -> Self {
            Self {
                calls: AtomicU32::new(0),
                ttl,
                fail: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self) -> ClientResult<IssuedToken> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ClientError::auth("identity provider down"));
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(IssuedToken::new(format!("token-{n}"), self.ttl))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_is_cached_until_refresh_margin() {
        let source = Arc::new(CountingSource::new(Duration::from_secs(3600)));
        let provider = CachedTokenProvider::new(source.clone());

        assert_eq!(provider.bearer_token().await.unwrap(), "token-1");
        assert_eq!(provider.bearer_token().await.unwrap(), "token-1");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(3600 - 30)).await;
        assert_eq!(provider.bearer_token().await.unwrap(), "token-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_falls_back_to_usable_token() {
        let source = Arc::new(CountingSource::new(Duration::from_secs(3600)));
        let provider = CachedTokenProvider::new(source.clone());
        assert_eq!(provider.bearer_token().await.unwrap(), "token-1");

        source.fail.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(3600 - 30)).await;
        assert_eq!(provider.bearer_token().await.unwrap(), "token-1");

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(matches!(
            provider.bearer_token().await,
            Err(ClientError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let source = Arc::new(CountingSource::new(Duration::from_secs(3600)));
        let provider = Arc::new(CachedTokenProvider::new(source.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.bearer_token().await.unwrap() })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), "token-1");
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let source = Arc::new(CountingSource::new(Duration::from_secs(3600)));
        let provider = CachedTokenProvider::new(source.clone());
        provider.bearer_token().await.unwrap();
        provider.invalidate().await;
        assert_eq!(provider.bearer_token().await.unwrap(), "token-2");
    }

    #[test]
    fn test_session_endpoint() {
        let session =
            Session::new("https://api.example.com", Arc::new(StaticTokenProvider::new("t"))).unwrap();
        assert_eq!(
            session.endpoint("/api/results/abc").unwrap().as_str(),
            "https://api.example.com/api/results/abc"
        );
        assert!(Session::new("not a url", Arc::new(StaticTokenProvider::new("t"))).is_err());
    }

    #[test]
    fn test_session_endpoint_keeps_base_path() {
        let tokens: Arc<dyn TokenProvider> = Arc::new(StaticTokenProvider::new("t"));
        for base in ["https://api.example.com/prod", "https://api.example.com/prod/"] {
            let session = Session::new(base, tokens.clone()).unwrap();
            assert_eq!(
                session.endpoint("/api/results/abc").unwrap().as_str(),
                "https://api.example.com/prod/api/results/abc"
            );
            assert_eq!(
                session.endpoint("api/upload-url").unwrap().as_str(),
                "https://api.example.com/prod/api/upload-url"
            );
        }
    }
}
