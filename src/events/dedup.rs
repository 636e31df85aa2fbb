//! Pluggable duplicate suppression for the notification consumer.
//!
//! Delivery is at-least-once, so a redelivered like would otherwise be recorded
//! twice. The default policy keeps that behaviour; the others remember a bounded
//! window of recently seen keys.

use std::collections::{HashSet, VecDeque};
use std::str::FromStr;
use std::sync::Mutex;

use crate::cache::mutex_lock;
use crate::domain::types::{PostId, UserId};

const SOURCE: &str = "events::dedup";
pub const DEFAULT_DEDUP_WINDOW: usize = 10_000;

/// Everything a policy may derive a key from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupKey {
    pub post_id: PostId,
    pub liker_id: UserId,
    pub delivery_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// Record every delivery.
    #[default]
    Disabled,
    /// Drop redeliveries of the same broker message.
    ByDelivery,
    /// Keep one notification per (post, liker).
    ByPostAndLiker,
}

impl DedupPolicy {
    fn fingerprint(self, key: &DedupKey) -> Option<String> {
        match self {
            DedupPolicy::Disabled => None,
            DedupPolicy::ByDelivery => Some(format!("d:{}", key.delivery_id)),
            DedupPolicy::ByPostAndLiker => Some(format!("p:{}:{}", key.post_id, key.liker_id)),
        }
    }
}

impl FromStr for DedupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "disabled" | "off" => Ok(DedupPolicy::Disabled),
            "delivery" | "by_delivery" => Ok(DedupPolicy::ByDelivery),
            "post_and_liker" | "by_post_and_liker" => Ok(DedupPolicy::ByPostAndLiker),
            other => Err(format!(
                "unknown dedup policy `{other}` (expected none|delivery|post_and_liker)"
            )),
        }
    }
}

pub trait DeliveryDeduplicator: Send + Sync {
    /// True the first time `key` is seen; the key is remembered.
    fn first_sighting(&self, key: &DedupKey) -> bool;

    /// Undo a sighting whose processing failed, so a redelivery is not dropped.
    fn forget(&self, key: &DedupKey);
}

/// Remembers the last `window` fingerprints, oldest evicted first.
pub struct WindowedDeduplicator {
    policy: DedupPolicy,
    window: usize,
    state: Mutex<Seen>,
}

#[derive(Default)]
struct Seen {
    keys: HashSet<String>,
    order: VecDeque<String>,
}

impl WindowedDeduplicator {
    pub fn new(policy: DedupPolicy, window: usize) -> Self {
        Self {
            policy,
            window: window.max(1),
            state: Mutex::new(Seen::default()),
        }
    }
}

impl DeliveryDeduplicator for WindowedDeduplicator {
    fn first_sighting(&self, key: &DedupKey) -> bool {
        let Some(fingerprint) = self.policy.fingerprint(key) else {
            return true;
        };
        let mut seen = mutex_lock(&self.state, SOURCE, "first_sighting");
        if !seen.keys.insert(fingerprint.clone()) {
            return false;
        }
        seen.order.push_back(fingerprint);
        while seen.order.len() > self.window {
            if let Some(oldest) = seen.order.pop_front() {
                seen.keys.remove(&oldest);
            }
        }
        true
    }

    fn forget(&self, key: &DedupKey) {
        if let Some(fingerprint) = self.policy.fingerprint(key) {
            let mut seen = mutex_lock(&self.state, SOURCE, "forget");
            if seen.keys.remove(&fingerprint) {
                seen.order.retain(|k| k != &fingerprint);
            }
        }
    }
}
