//! Event bus abstraction over the decentralized pub/sub transport (§4.1).
//!
//! No real nostr crate is part of the dependency stack, so the transport is a
//! generic trait; concrete relay wiring is an embedding application's concern.
//! Grounded on [`crate::runtime::client_wrapper::ClientWrapper`]'s shape: an
//! `async_trait` with a handful of verbs, implementations supplied by the
//! embedder rather than by this crate.

use crate::runtime::error::OrchestrationError;
use crate::runtime::model::Event;
use async_trait::async_trait;
use std::time::Duration;

/// A filter describing which events a subscription should deliver. Mirrors a
/// nostr filter's shape closely enough to be implementable against a real
/// relay without this crate needing to depend on one.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub kinds: Vec<u32>,
    pub authors: Vec<String>,
    /// `p` tag values to match, i.e. "events that mention this pubkey".
    pub p_tags: Vec<String>,
    pub since: Option<i64>,
}

/// Transport-agnostic publish/subscribe plus signing.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn subscribe(&self, filter: EventFilter) -> Result<Vec<Event>, OrchestrationError>;

    async fn publish(&self, event: Event) -> Result<(), OrchestrationError>;

    /// Publish an event that relays are permitted to discard instead of
    /// storing, used for transient status updates (e.g. "agent X is typing").
    async fn publish_ephemeral(&self, event: Event) -> Result<(), OrchestrationError> {
        self.publish(event).await
    }
}

/// Retry/backoff policy for publish attempts: 3 attempts, 250ms base delay,
/// doubling, capped at 4s (§4.1).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.saturating_mul(1 << attempt.min(16));
        scaled.min(self.max_delay)
    }
}

/// Publish `event` via `bus`, retrying on failure per `policy`. Returns the
/// last error if every attempt fails.
pub async fn publish_with_retry(
    bus: &dyn EventBus,
    event: Event,
    policy: RetryPolicy,
) -> Result<(), OrchestrationError> {
    let mut last_err = None;
    for attempt in 0..policy.max_attempts {
        match bus.publish(event.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                log::warn!("publish attempt {} failed: {}", attempt + 1, e);
                last_err = Some(e);
                if attempt + 1 < policy.max_attempts {
                    tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| OrchestrationError::Protocol("publish failed with no recorded error".into())))
}
