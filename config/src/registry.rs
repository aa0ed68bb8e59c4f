//! # Change Registry
//!
//! Fan-out of configuration change events to independent consumers.
//!
//! Every subscriber owns a bounded queue, so a slow consumer never holds up
//! the others or the publisher. When a queue overflows the oldest events
//! are dropped and the subscriber is told how many it missed.
//!
//! The registry also carries the effective default model in a `watch`
//! channel, where only the latest value matters.

use crate::model::ModelSelection;
use crate::path::{ConfigPath, PathFilter};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

/// Default per-subscriber queue length.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// What produced a new generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTrigger {
    Reload,
    Write,
}

/// Paths that changed between two generations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigChangeEvent {
    pub changed_paths: BTreeSet<ConfigPath>,
    pub generation: u64,
    pub trigger: ChangeTrigger,
}

impl ConfigChangeEvent {
    /// Narrow the event to the paths `filter` accepts.
    pub fn filtered(&self, filter: &PathFilter) -> Option<ConfigChangeEvent> {
        let changed_paths: BTreeSet<ConfigPath> = self
            .changed_paths
            .iter()
            .filter(|path| filter.matches(path))
            .cloned()
            .collect();
        if changed_paths.is_empty() {
            return None;
        }
        Some(ConfigChangeEvent {
            changed_paths,
            generation: self.generation,
            trigger: self.trigger,
        })
    }
}

struct Subscriber {
    id: u64,
    filter: PathFilter,
    sender: broadcast::Sender<ConfigChangeEvent>,
}

/// Pub/sub hub for configuration changes.
pub struct ConfigRegistry {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    capacity: usize,
    default_model: watch::Sender<Option<ModelSelection>>,
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl ConfigRegistry {
    pub fn new(capacity: usize) -> Self {
        let (default_model, _) = watch::channel(None);
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            default_model,
        }
    }

    /// Receive future events touching paths `filter` accepts.
    pub fn subscribe(&self, filter: PathFilter) -> Subscription {
        let (sender, receiver) = broadcast::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("Registry subscriber {} added for {:?}", id, filter);
        self.subscribers.lock().push(Subscriber {
            id,
            filter: filter.clone(),
            sender,
        });
        Subscription {
            id,
            filter,
            receiver,
        }
    }

    /// Deliver `event` to every interested subscriber. Never blocks.
    ///
    /// Returns how many subscribers received it.
    pub fn publish(&self, event: &ConfigChangeEvent) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|subscriber| {
            let open = subscriber.sender.receiver_count() > 0;
            if !open {
                debug!("Registry subscriber {} closed, removing", subscriber.id);
            }
            open
        });

        let mut delivered = 0;
        for subscriber in subscribers.iter() {
            let Some(filtered) = event.filtered(&subscriber.filter) else {
                continue;
            };
            if subscriber.sender.send(filtered).is_ok() {
                delivered += 1;
            }
        }
        debug!(
            "Published generation {} ({:?}, {} paths) to {} subscribers",
            event.generation,
            event.trigger,
            event.changed_paths.len(),
            delivered
        );
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .iter()
            .filter(|subscriber| subscriber.sender.receiver_count() > 0)
            .count()
    }

    /// Replace the broadcast default model. Returns whether it changed.
    pub fn publish_default_model(&self, selection: ModelSelection) -> bool {
        self.default_model.send_if_modified(|current| {
            let changed = current
                .as_ref()
                .is_none_or(|existing| !existing.same_choice(&selection));
            if changed {
                *current = Some(selection);
            }
            changed
        })
    }

    pub fn default_model(&self) -> Option<ModelSelection> {
        self.default_model.borrow().clone()
    }

    pub fn watch_default_model(&self) -> watch::Receiver<Option<ModelSelection>> {
        self.default_model.subscribe()
    }
}

/// A registry subscriber's end of its queue.
pub struct Subscription {
    id: u64,
    filter: PathFilter,
    receiver: broadcast::Receiver<ConfigChangeEvent>,
}

impl Subscription {
    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// Next event, skipping over any that overflowed the queue.
    ///
    /// `None` once the registry is gone.
    pub async fn recv(&mut self) -> Option<ConfigChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(
                        "Registry subscriber {} lagged, {} events dropped",
                        self.id, missed
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<ConfigChangeEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(
                        "Registry subscriber {} lagged, {} events dropped",
                        self.id, missed
                    );
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SelectionSource;

    fn event(paths: &[&str], generation: u64) -> ConfigChangeEvent {
        ConfigChangeEvent {
            changed_paths: paths.iter().map(|p| ConfigPath::parse(p).unwrap()).collect(),
            generation,
            trigger: ChangeTrigger::Write,
        }
    }

    #[tokio::test]
    async fn test_prefix_subscriber_sees_only_matching_paths() {
        let registry = ConfigRegistry::default();
        let mut sub = registry.subscribe(PathFilter::prefix("server").unwrap());

        registry.publish(&event(&["server.port", "ui.theme"], 2));
        let received = sub.recv().await.unwrap();
        assert_eq!(received.generation, 2);
        assert_eq!(received.changed_paths.len(), 1);
        assert_eq!(
            received.changed_paths.iter().next().unwrap().to_string(),
            "server.port"
        );
    }

    #[tokio::test]
    async fn test_unrelated_change_not_delivered() {
        let registry = ConfigRegistry::default();
        let mut sub = registry.subscribe(PathFilter::exact("ui.theme").unwrap());
        assert_eq!(registry.publish(&event(&["server.port"], 2)), 0);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_fan_out_to_every_subscriber() {
        let registry = ConfigRegistry::default();
        let mut a = registry.subscribe(PathFilter::All);
        let mut b = registry.subscribe(PathFilter::prefix("ui").unwrap());

        assert_eq!(registry.publish(&event(&["ui.theme"], 3)), 2);
        assert_eq!(a.recv().await.unwrap().generation, 3);
        assert_eq!(b.recv().await.unwrap().generation, 3);
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_oldest_without_blocking_others() {
        let registry = ConfigRegistry::new(2);
        let mut slow = registry.subscribe(PathFilter::All);
        let mut fast = registry.subscribe(PathFilter::All);

        for generation in 1..=5 {
            registry.publish(&event(&["ui.theme"], generation));
            assert_eq!(fast.recv().await.unwrap().generation, generation);
        }

        assert_eq!(slow.recv().await.unwrap().generation, 4);
        assert_eq!(slow.recv().await.unwrap().generation, 5);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let registry = ConfigRegistry::default();
        let sub = registry.subscribe(PathFilter::All);
        assert_eq!(registry.subscriber_count(), 1);
        drop(sub);
        assert_eq!(registry.publish(&event(&["ui.theme"], 2)), 0);
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_recv_ends_when_registry_dropped() {
        let registry = ConfigRegistry::default();
        let mut sub = registry.subscribe(PathFilter::All);
        drop(registry);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_default_model_publish_only_on_change() {
        let registry = ConfigRegistry::default();
        let mut rx = registry.watch_default_model();
        let selection = ModelSelection::new("minilm-l6", SelectionSource::Recommended, "test", None);

        assert!(registry.publish_default_model(selection.clone()));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        assert!(!registry.publish_default_model(selection));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(registry.default_model().unwrap().model_id, "minilm-l6");
    }
}
