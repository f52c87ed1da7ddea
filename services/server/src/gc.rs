//! The standing GC consumer (spec.md §4.7): drains terminated session ids
//! and removes them from the [`ChannelMap`].

use std::sync::Arc;

use bc_protocol::SessionId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel_map::ChannelMap;

/// Spawns the permanent GC task and returns the sender side `Channel`s use
/// to publish their sid on termination, plus a handle for shutdown.
pub fn spawn(channels: Arc<ChannelMap>) -> (mpsc::UnboundedSender<SessionId>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        while let Some(sid) = rx.recv().await {
            if channels.remove(&sid).await {
                tracing::info!(sid = %sid, "gc: removed terminated session");
            } else {
                tracing::warn!(sid = %sid, "gc: session already absent from map");
            }
        }
        tracing::info!("gc loop exiting: sender closed");
    });
    (tx, handle)
}
