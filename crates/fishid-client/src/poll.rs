//! Bounded result polling.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use fishid_models::{IdentificationPayload, ResultStatus, WorkItemId};

use crate::api::{ApiClient, StatusSnapshot};
use crate::error::{ClientError, ClientResult};

/// How often and how long to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 20,
        }
    }
}

impl PollConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval: std::env::var("FISHID_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            max_attempts: std::env::var("FISHID_POLL_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_attempts),
        }
    }

    /// Longest a poll loop waits before giving up.
    pub fn total_wait(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Where the client is in identifying one photo.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientState {
    Idle,
    Uploading,
    Processing { work_item_id: WorkItemId },
    Done(IdentificationPayload),
    Error(String),
    /// Attempts ran out without a terminal result
    Timeout,
}

impl ClientState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClientState::Done(_) | ClientState::Error(_) | ClientState::Timeout
        )
    }
}

/// Anything that can report the status of a work item.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// `Ok(None)` when nothing is known about the item yet.
    async fn fetch_status(&self, work_item_id: &WorkItemId) -> ClientResult<Option<StatusSnapshot>>;
}

/// Poll until the item reaches a terminal status or attempts run out.
///
/// Each attempt waits one interval first. A failed request counts as an
/// attempt; only a rejected token ends the loop early.
pub async fn poll_until_terminal(
    source: &dyn StatusSource,
    work_item_id: &WorkItemId,
    config: &PollConfig,
) -> ClientState {
    for attempt in 1..=config.max_attempts {
        tokio::time::sleep(config.interval).await;

        let snapshot = match source.fetch_status(work_item_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(%work_item_id, attempt, "No result yet");
                continue;
            }
            Err(ClientError::Auth(msg)) => {
                warn!(%work_item_id, attempt, "Polling rejected: {}", msg);
                return ClientState::Error(format!("not authorised: {}", msg));
            }
            Err(e) => {
                warn!(%work_item_id, attempt, error = %e, "Status request failed");
                continue;
            }
        };

        match snapshot.status {
            ResultStatus::Completed => {
                return match snapshot.payload {
                    Some(payload) => ClientState::Done(payload),
                    None => ClientState::Error("completed result has no payload".to_string()),
                };
            }
            ResultStatus::Error => {
                return ClientState::Error(
                    snapshot
                        .error_detail
                        .unwrap_or_else(|| "identification failed".to_string()),
                );
            }
            ResultStatus::Pending | ResultStatus::Processing => {
                debug!(%work_item_id, attempt, status = %snapshot.status, "Still waiting");
            }
        }
    }

    info!(
        %work_item_id,
        attempts = config.max_attempts,
        "Gave up waiting for a result"
    );
    ClientState::Timeout
}

/// Drives one photo through upload, processing and polling.
///
/// State changes are published on a watch channel for UIs to follow.
pub struct IdentifyFlow {
    client: ApiClient,
    poll: PollConfig,
    state: watch::Sender<ClientState>,
}

impl IdentifyFlow {
    pub fn new(client: ApiClient, poll: PollConfig) -> Self {
        let (state, _) = watch::channel(ClientState::Idle);
        Self {
            client,
            poll,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    /// Upload `bytes` and wait for the identification.
    ///
    /// Dropping the returned future abandons the wait; nothing is cancelled
    /// on the server.
    pub async fn run(&self, filename: &str, bytes: Vec<u8>) -> ClientState {
        self.set(ClientState::Uploading);

        let grant = match self.client.request_upload_grant(filename).await {
            Ok(grant) => grant,
            Err(e) => return self.set(ClientState::Error(format!("could not get upload grant: {}", e))),
        };

        if let Err(e) = self.client.upload(&grant, bytes).await {
            return self.set(ClientState::Error(format!("upload failed: {}", e)));
        }

        self.set(ClientState::Processing {
            work_item_id: grant.work_item_id.clone(),
        });

        let outcome = poll_until_terminal(&self.client, &grant.work_item_id, &self.poll).await;
        self.set(outcome)
    }

    fn set(&self, state: ClientState) -> ClientState {
        self.state.send_replace(state.clone());
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use fishid_models::{IdentificationPayload, SpeciesCatalog};
    use tokio::time::Instant;

    /// Replays scripted responses, then keeps answering `pending`.
    struct ScriptedSource {
        responses: Mutex<VecDeque<ClientResult<Option<StatusSnapshot>>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<ClientResult<Option<StatusSnapshot>>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn fetch_status(&self, id: &WorkItemId) -> ClientResult<Option<StatusSnapshot>> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Some(snapshot(id, ResultStatus::Pending))))
        }
    }

    fn snapshot(id: &WorkItemId, status: ResultStatus) -> StatusSnapshot {
        StatusSnapshot {
            work_item_id: id.clone(),
            status,
            payload: None,
            error_detail: None,
            updated_at: None,
        }
    }

    fn payload() -> IdentificationPayload {
        let catalog = SpeciesCatalog::embedded().unwrap();
        IdentificationPayload::from_classification("Epinephelus marginatus", 0.91, &catalog)
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_within_bound() {
        let id = WorkItemId::new();
        let source = ScriptedSource::new(Vec::new());
        let config = PollConfig::default();

        let started = Instant::now();
        let state = poll_until_terminal(&source, &id, &config).await;
        let elapsed = started.elapsed();

        assert_eq!(state, ClientState::Timeout);
        assert_eq!(source.calls(), 20);
        assert!(elapsed >= Duration::from_secs(57));
        assert!(elapsed <= Duration::from_secs(63));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_resolves_completed() {
        let id = WorkItemId::new();
        let mut done = snapshot(&id, ResultStatus::Completed);
        done.payload = Some(payload());
        let source = ScriptedSource::new(vec![
            Ok(None),
            Ok(Some(snapshot(&id, ResultStatus::Processing))),
            Ok(Some(done)),
        ]);

        let state = poll_until_terminal(&source, &id, &PollConfig::default()).await;
        match state {
            ClientState::Done(payload) => assert_eq!(payload.species, "Epinephelus marginatus"),
            other => panic!("unexpected state: {other:?}"),
        }
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_resolves_error_distinct_from_timeout() {
        let id = WorkItemId::new();
        let mut failed = snapshot(&id, ResultStatus::Error);
        failed.error_detail = Some("image could not be decoded".to_string());
        let source = ScriptedSource::new(vec![Ok(Some(failed))]);

        let state = poll_until_terminal(&source, &id, &PollConfig::default()).await;
        assert_eq!(state, ClientState::Error("image could not be decoded".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_counts_as_attempt() {
        let id = WorkItemId::new();
        let source = ScriptedSource::new(vec![
            Err(ClientError::Status {
                status: 502,
                body: String::new(),
            }),
            Err(ClientError::InvalidResponse("truncated".into())),
        ]);
        let config = PollConfig {
            interval: Duration::from_secs(1),
            max_attempts: 3,
        };

        let state = poll_until_terminal(&source, &id, &config).await;
        assert_eq!(state, ClientState::Timeout);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_token_stops_polling() {
        let id = WorkItemId::new();
        let source = ScriptedSource::new(vec![Err(ClientError::auth("API returned 401"))]);

        let state = poll_until_terminal(&source, &id, &PollConfig::default()).await;
        assert!(matches!(state, ClientState::Error(_)));
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_poll_config_defaults() {
        let config = PollConfig::default();
        assert_eq!(config.total_wait(), Duration::from_secs(60));
        assert!(!ClientState::Processing { work_item_id: WorkItemId::new() }.is_terminal());
        assert!(ClientState::Timeout.is_terminal());
    }
}
