//! Process-wide `SessionId -> Channel` registry (spec.md §4.5).

use std::collections::HashMap;
use std::sync::Arc;

use bc_protocol::SessionId;
use tokio::sync::RwLock;

use crate::channel::Channel;

#[derive(Default)]
pub struct ChannelMap {
    inner: RwLock<HashMap<SessionId, Arc<Channel>>>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, sid: &SessionId) -> Option<Arc<Channel>> {
        self.inner.read().await.get(sid).cloned()
    }

    /// Generates a fresh, collision-checked `SessionId`, builds its channel
    /// via `make_channel`, and inserts it — all under the map's write lock,
    /// so no other caller can observe the id before the channel exists
    /// (spec.md §9, cross-session isolation).
    pub async fn insert_fresh<F>(&self, make_channel: F) -> Arc<Channel>
    where
        F: Fn(SessionId) -> Arc<Channel>,
    {
        loop {
            let candidate = SessionId::generate();
            let mut guard = self.inner.write().await;
            if guard.contains_key(&candidate) {
                continue;
            }
            let channel = make_channel(candidate);
            guard.insert(candidate, channel.clone());
            return channel;
        }
    }

    /// Removes `sid`, returning whether an entry actually existed.
    pub async fn remove(&self, sid: &SessionId) -> bool {
        self.inner.write().await.remove(sid).is_some()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
