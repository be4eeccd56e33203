//! Publish/subscribe registry of per-key snapshot channels.
//!
//! Channels are created lazily on first subscription, so keys nobody watches
//! cost nothing to publish. The registry lives inside the store's lock and
//! is published to while the lock is held, which keeps notifications in
//! mutation order.

use std::collections::HashMap;

use querygate_core::{EncodedKey, Snapshot};
use tokio::sync::watch;

/// Per-key snapshot channels.
#[derive(Debug)]
pub struct ObserverRegistry<T> {
    channels: HashMap<EncodedKey, watch::Sender<Snapshot<T>>>,
}

impl<T> ObserverRegistry<T> {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    /// Push a new snapshot to the key's subscribers, if there are any.
    ///
    /// `make` is only called when a channel exists for the key.
    pub fn publish(&self, key: &EncodedKey, make: impl FnOnce() -> Snapshot<T>) {
        if let Some(tx) = self.channels.get(key) {
            tx.send_replace(make());
        }
    }

    /// Subscribe to a key. `current` seeds the channel if it does not exist.
    pub fn subscribe(
        &mut self,
        key: &EncodedKey,
        current: impl FnOnce() -> Snapshot<T>,
    ) -> watch::Receiver<Snapshot<T>> {
        match self.channels.get(key) {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = watch::channel(current());
                self.channels.insert(key.clone(), tx);
                rx
            }
        }
    }

    /// Number of live receivers for a key.
    pub fn receiver_count(&self, key: &EncodedKey) -> usize {
        self.channels
            .get(key)
            .map(watch::Sender::receiver_count)
            .unwrap_or(0)
    }

    /// Drop the key's channel if nobody receives from it. Returns whether it was removed.
    pub fn release(&mut self, key: &EncodedKey) -> bool {
        if self.receiver_count(key) > 0 {
            return false;
        }
        self.channels.remove(key).is_some()
    }

    /// Drop channels with no remaining receivers. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, tx| tx.receiver_count() > 0);
        before - self.channels.len()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl<T> Default for ObserverRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
