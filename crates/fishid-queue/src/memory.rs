//! In-memory work queue.
//!
//! Lease deadlines are measured on the tokio clock, so tests can pause and
//! advance time to drive visibility expiry.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fishid_models::{ObjectWriteEvent, WorkItemId};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};
use crate::message::{DeadLetter, QueueMessage};
use crate::queue::{QueueConfig, WorkQueue};

#[derive(Debug)]
struct Lease {
    token: String,
    deadline: Instant,
}

#[derive(Debug)]
struct Entry {
    message_id: String,
    work_item_id: WorkItemId,
    event: ObjectWriteEvent,
    delivery_count: u32,
    lease: Option<Lease>,
}

impl Entry {
    fn lease_expired(&self, now: Instant) -> bool {
        matches!(&self.lease, Some(lease) if lease.deadline <= now)
    }
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    entries: Vec<Entry>,
    dead_letters: Vec<DeadLetter>,
}

/// Work queue held in process memory.
#[derive(Debug)]
pub struct MemoryWorkQueue {
    visibility_timeout: Duration,
    max_receive_count: u32,
    state: Mutex<State>,
    notify: Notify,
}

impl MemoryWorkQueue {
    pub fn new(visibility_timeout: Duration, max_receive_count: u32) -> Self {
        Self {
            visibility_timeout,
            max_receive_count,
            state: Mutex::new(State::default()),
            notify: Notify::new(),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.visibility_timeout, config.max_receive_count)
    }

    /// Snapshot of the dead-letter area.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        let mut state = self.state.lock().await;
        self.sweep_exhausted(&mut state);
        state.dead_letters.clone()
    }

    /// Move expired leases with no deliveries left to the dead-letter area.
    fn sweep_exhausted(&self, state: &mut State) {
        let now = Instant::now();
        let mut i = 0;
        while i < state.entries.len() {
            let entry = &state.entries[i];
            if entry.lease_expired(now) && entry.delivery_count >= self.max_receive_count {
                let entry = state.entries.remove(i);
                warn!(
                    message_id = %entry.message_id,
                    work_item_id = %entry.work_item_id,
                    delivery_count = entry.delivery_count,
                    "Moving exhausted message to dead-letter area"
                );
                state.dead_letters.push(DeadLetter {
                    original_id: entry.message_id,
                    work_item_id: entry.work_item_id,
                    event: entry.event,
                    delivery_count: entry.delivery_count,
                    dead_lettered_at: Utc::now(),
                });
            } else {
                i += 1;
            }
        }
    }

    fn lease_available(&self, state: &mut State, max_messages: usize) -> Vec<QueueMessage> {
        let now = Instant::now();
        let mut leased = Vec::new();

        for entry in state.entries.iter_mut() {
            if leased.len() >= max_messages {
                break;
            }
            if entry.lease.is_some() && !entry.lease_expired(now) {
                continue;
            }

            entry.delivery_count += 1;
            let token = Uuid::new_v4().to_string();
            entry.lease = Some(Lease {
                token: token.clone(),
                deadline: now + self.visibility_timeout,
            });

            leased.push(QueueMessage {
                message_id: entry.message_id.clone(),
                work_item_id: entry.work_item_id.clone(),
                event: entry.event.clone(),
                lease_token: token,
                delivery_count: entry.delivery_count,
                visibility_deadline: Utc::now()
                    + chrono::Duration::from_std(self.visibility_timeout)
                        .unwrap_or_else(|_| chrono::Duration::zero()),
            });
        }

        leased
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn send(&self, event: &ObjectWriteEvent) -> QueueResult<String> {
        let work_item_id = event
            .work_item_id()
            .ok_or_else(|| QueueError::invalid_event(&event.key))?;

        let message_id = {
            let mut state = self.state.lock().await;
            state.next_id += 1;
            let message_id = format!("mem-{}", state.next_id);
            state.entries.push(Entry {
                message_id: message_id.clone(),
                work_item_id,
                event: event.clone(),
                delivery_count: 0,
                lease: None,
            });
            message_id
        };

        debug!(message_id = %message_id, key = %event.key, "Enqueued event");
        self.notify.notify_waiters();
        Ok(message_id)
    }

    async fn receive(
        &self,
        max_wait: Duration,
        max_messages: usize,
    ) -> QueueResult<Vec<QueueMessage>> {
        let wait_deadline = Instant::now() + max_wait;

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_expiry = {
                let mut state = self.state.lock().await;
                self.sweep_exhausted(&mut state);
                let leased = self.lease_available(&mut state, max_messages);
                if !leased.is_empty() || max_messages == 0 {
                    return Ok(leased);
                }
                state
                    .entries
                    .iter()
                    .filter_map(|e| e.lease.as_ref().map(|l| l.deadline))
                    .min()
            };

            if Instant::now() >= wait_deadline {
                return Ok(Vec::new());
            }
            let wake_at = next_expiry.map_or(wait_deadline, |d| d.min(wait_deadline));

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn ack(&self, message: &QueueMessage) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        if let Some(pos) = state
            .entries
            .iter()
            .position(|e| e.message_id == message.message_id)
        {
            state.entries.remove(pos);
            debug!(message_id = %message.message_id, "Acknowledged message");
        }
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut state = self.state.lock().await;
        self.sweep_exhausted(&mut state);
        Ok(state.entries.len() as u64)
    }

    async fn dead_letter_len(&self) -> QueueResult<u64> {
        let mut state = self.state.lock().await;
        self.sweep_exhausted(&mut state);
        Ok(state.dead_letters.len() as u64)
    }

    async fn check_connectivity(&self) -> QueueResult<()> {
        Ok(())
    }
}
