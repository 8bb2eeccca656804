//! Registry of live subscriptions
//!
//! Every running subscription has one [`ActiveSubscription`] entry holding its
//! cancellation signal and forwarding task. Removing the entry cancels the
//! signal and aborts the task.

use super::{CancellationSignal, SubscriptionId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Registry entry for one running subscription
#[derive(Debug)]
pub struct ActiveSubscription {
    /// Unique subscription ID
    pub id: SubscriptionId,
    /// Path of the subscription procedure
    pub path: String,
    signal: Arc<CancellationSignal>,
    task: Option<JoinHandle<()>>,
    created_at: Instant,
}

impl ActiveSubscription {
    /// Track a subscription by its cancellation signal
    pub fn new(id: SubscriptionId, path: impl Into<String>, signal: Arc<CancellationSignal>) -> Self {
        Self {
            id,
            path: path.into(),
            signal,
            task: None,
            created_at: Instant::now(),
        }
    }

    /// Attach the forwarding task
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// Time since registration
    pub fn duration(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Fire the cancellation signal
    pub fn cancel(&self) {
        self.signal.cancel();
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    fn take_task(&mut self) -> Option<JoinHandle<()>> {
        self.task.take()
    }
}

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        self.signal.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Outcome of [`SubscriptionManager::shutdown`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownResult {
    /// Subscriptions live when shutdown started
    pub active_subscriptions: usize,
    /// Tasks that finished within the timeout
    pub cancelled_count: usize,
    /// Whether every task finished within the timeout
    pub completed_within_timeout: bool,
    /// Time spent in milliseconds
    pub duration_ms: u64,
}

impl ShutdownResult {
    /// True when every subscription stopped in time
    pub fn is_success(&self) -> bool {
        self.completed_within_timeout && self.cancelled_count == self.active_subscriptions
    }
}

/// Concurrent registry of running subscriptions.
///
/// ```rust,ignore
/// let manager = Arc::new(SubscriptionManager::new());
/// manager.register(ActiveSubscription::new(id, "teststream", signal).with_task(task));
/// manager.unsubscribe(&id);
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    subscriptions: DashMap<SubscriptionId, ActiveSubscription>,
}

impl SubscriptionManager {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running subscription
    pub fn register(&self, subscription: ActiveSubscription) -> SubscriptionId {
        let id = subscription.id;
        tracing::info!(
            subscription_id = %id,
            path = %subscription.path,
            "Subscription registered"
        );
        self.subscriptions.insert(id, subscription);
        id
    }

    /// Cancel and remove one subscription. Returns false if it was unknown.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        match self.subscriptions.remove(id) {
            Some((_, subscription)) => {
                tracing::info!(
                    subscription_id = %id,
                    path = %subscription.path,
                    duration_ms = subscription.duration().as_millis() as u64,
                    "Subscription removed"
                );
                true
            }
            None => {
                tracing::trace!(subscription_id = %id, "Unsubscribe for unknown subscription");
                false
            }
        }
    }

    /// Number of live subscriptions
    pub fn count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Check if a subscription is live
    pub fn exists(&self, id: &SubscriptionId) -> bool {
        self.subscriptions.contains_key(id)
    }

    /// Ids of all live subscriptions
    pub fn subscription_ids(&self) -> Vec<SubscriptionId> {
        self.subscriptions.iter().map(|entry| *entry.key()).collect()
    }

    /// Cancel and remove every subscription without waiting
    pub fn cancel_all(&self) {
        let count = self.subscriptions.len();
        self.subscriptions.clear();
        tracing::info!(cancelled_count = count, "All subscriptions cancelled");
    }

    /// Cancel every subscription and wait up to `timeout` for their tasks.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownResult {
        let start = Instant::now();
        let ids = self.subscription_ids();
        let active_subscriptions = ids.len();
        tracing::info!(active_subscriptions, "Subscription shutdown initiated");

        let mut tasks = Vec::with_capacity(active_subscriptions);
        for id in ids {
            if let Some((_, mut subscription)) = self.subscriptions.remove(&id) {
                subscription.cancel();
                if let Some(task) = subscription.take_task() {
                    task.abort();
                    tasks.push(task);
                }
            }
        }

        let waited = tokio::time::timeout(timeout, futures::future::join_all(tasks)).await;
        let completed_within_timeout = waited.is_ok();
        if !completed_within_timeout {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Subscription shutdown timed out"
            );
        }

        let result = ShutdownResult {
            active_subscriptions,
            cancelled_count: if completed_within_timeout {
                active_subscriptions
            } else {
                0
            },
            completed_within_timeout,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            cancelled = result.cancelled_count,
            duration_ms = result.duration_ms,
            "Subscription shutdown complete"
        );
        result
    }
}
