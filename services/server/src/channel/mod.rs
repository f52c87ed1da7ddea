//! The per-session state machine (spec.md §4.3): outgoing queue, inbound
//! offset tracking, the attached back channel, and the three timers.

mod back_channel;
mod timers;

pub use back_channel::{BackChannel, BackChannelError};
pub use timers::DeadlineTimer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use bc_protocol::codec::ForwardMap;
use bc_protocol::queue::OutgoingQueue;
use bc_protocol::{SessionId, SUPPORTED_PROTOCOL_VERSION};
use tokio::sync::{mpsc, Mutex};

const SESSION_TIMEOUT: Duration = Duration::from_secs(180);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const DEAD_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Init,
    Ready,
    Closed,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    pub has_back_channel: bool,
    pub last_sent_array_id: u64,
    pub outstanding_bytes: usize,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel is closed")]
    Closed,
    #[error("map offset {offset} leaves a gap after {last:?}")]
    GapOffset { offset: u64, last: Option<u64> },
}

struct Inner {
    state: ChannelState,
    queue: OutgoingQueue,
    last_received_offset: Option<u64>,
    back_channel: Option<BackChannel>,
}

/// The per-session channel. Always held behind an `Arc` so its timers can
/// call back into it without the caller threading a reference through.
pub struct Channel {
    sid: SessionId,
    client_version: String,
    inner: Mutex<Inner>,
    inbound_tx: StdMutex<Option<mpsc::UnboundedSender<ForwardMap>>>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<ForwardMap>>,
    gc_tx: mpsc::UnboundedSender<SessionId>,
    gc_fired: AtomicBool,
    session_timer: DeadlineTimer,
    heartbeat_timer: DeadlineTimer,
    dead_client_timer: DeadlineTimer,
}

impl Channel {
    /// Builds a new channel in `Init`, with the initial config array already
    /// enqueued as array id 1 and the session timer armed. `host_prefix` is
    /// the cross-domain prefix chosen for this session (empty if CORS isn't
    /// configured).
    pub fn new(
        sid: SessionId,
        client_version: String,
        host_prefix: String,
        gc_tx: mpsc::UnboundedSender<SessionId>,
    ) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let mut queue = OutgoingQueue::new();
        queue.enqueue(serde_json::json!([
            "c",
            sid.to_string(),
            host_prefix,
            SUPPORTED_PROTOCOL_VERSION
        ]));

        Arc::new_cyclic(|weak: &Weak<Channel>| {
            let session_weak = weak.clone();
            let heartbeat_weak = weak.clone();
            let dead_client_weak = weak.clone();
            let channel = Self {
                sid,
                client_version,
                inner: Mutex::new(Inner {
                    state: ChannelState::Init,
                    queue,
                    last_received_offset: None,
                    back_channel: None,
                }),
                inbound_tx: StdMutex::new(Some(inbound_tx)),
                inbound_rx: Mutex::new(inbound_rx),
                gc_tx,
                gc_fired: AtomicBool::new(false),
                session_timer: DeadlineTimer::spawn(move || {
                    let weak = session_weak.clone();
                    async move {
                        if let Some(channel) = weak.upgrade() {
                            channel.terminate().await;
                        }
                    }
                }),
                heartbeat_timer: DeadlineTimer::spawn(move || {
                    let weak = heartbeat_weak.clone();
                    async move {
                        if let Some(channel) = weak.upgrade() {
                            channel.on_heartbeat_tick().await;
                        }
                    }
                }),
                dead_client_timer: DeadlineTimer::spawn(move || {
                    let weak = dead_client_weak.clone();
                    async move {
                        if let Some(channel) = weak.upgrade() {
                            channel.terminate().await;
                        }
                    }
                }),
            };
            channel.session_timer.arm(SESSION_TIMEOUT);
            channel
        })
    }

    pub fn sid(&self) -> SessionId {
        self.sid
    }

    pub fn client_version(&self) -> &str {
        &self.client_version
    }

    pub async fn state(&self) -> ChannelState {
        self.inner.lock().await.state
    }

    /// Enqueues `payload` and attempts to flush it to the active back
    /// channel, if any.
    pub async fn send_array(&self, payload: serde_json::Value) -> Result<u64, ChannelError> {
        let mut inner = self.inner.lock().await;
        if inner.state == ChannelState::Closed {
            return Err(ChannelError::Closed);
        }
        let id = inner.queue.enqueue(payload);
        self.flush_locked(&mut inner).await;
        Ok(id)
    }

    /// Delivers `maps`, numbered sequentially starting at `base_offset`, to
    /// the application's inbound stream. A map whose offset has already
    /// been seen is silently discarded (spec.md §3/§8 S3); a map that
    /// leaves a gap fails the whole call without delivering any of it
    /// (spec.md §8 S4).
    pub async fn receive_maps(
        &self,
        base_offset: u64,
        maps: Vec<ForwardMap>,
    ) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().await;
        if inner.state == ChannelState::Closed {
            return Err(ChannelError::Closed);
        }

        for (index, map) in maps.into_iter().enumerate() {
            let candidate = base_offset + index as u64;
            match inner.last_received_offset {
                Some(last) if candidate <= last => continue,
                Some(last) if candidate != last + 1 => {
                    return Err(ChannelError::GapOffset {
                        offset: candidate,
                        last: Some(last),
                    });
                }
                None if candidate != 0 => {
                    return Err(ChannelError::GapOffset {
                        offset: candidate,
                        last: None,
                    });
                }
                _ => {
                    inner.last_received_offset = Some(candidate);
                    if let Some(tx) = self.inbound_tx.lock().unwrap().as_ref() {
                        let _ = tx.send(map);
                    }
                }
            }
        }
        self.session_timer.arm(SESSION_TIMEOUT);
        Ok(())
    }

    /// Receives the next inbound map in order, or `None` once the channel
    /// has terminated.
    pub async fn recv_map(&self) -> Option<ForwardMap> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await
    }

    pub async fn acknowledge_arrays(&self, upto: u64) {
        let mut inner = self.inner.lock().await;
        if inner.state == ChannelState::Closed {
            return;
        }
        inner.queue.acknowledge(upto);
        self.session_timer.arm(SESSION_TIMEOUT);
        self.flush_locked(&mut inner).await;
    }

    pub async fn get_state(&self) -> ChannelSnapshot {
        let inner = self.inner.lock().await;
        let (_, bytes) = inner.queue.outstanding();
        ChannelSnapshot {
            has_back_channel: inner.back_channel.is_some(),
            last_sent_array_id: inner.queue.last_array_id().unwrap_or(0),
            outstanding_bytes: bytes,
        }
    }

    /// Installs `bc` as the active back channel, closing any previous one.
    /// Transitions `Init` -> `Ready` and flushes immediately.
    pub async fn set_back_channel(&self, bc: BackChannel) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().await;
        if inner.state == ChannelState::Closed {
            bc.close().await;
            return Err(ChannelError::Closed);
        }
        if let Some(old) = inner.back_channel.take() {
            old.close().await;
        }
        let _ = bc.write_preamble().await;
        inner.back_channel = Some(bc);
        inner.state = ChannelState::Ready;
        self.dead_client_timer.cancel();
        self.session_timer.arm(SESSION_TIMEOUT);
        self.flush_locked(&mut inner).await;
        if inner.back_channel.is_some() {
            self.heartbeat_timer.arm(HEARTBEAT_INTERVAL);
        }
        Ok(())
    }

    pub async fn terminate(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == ChannelState::Closed {
            return;
        }
        inner.state = ChannelState::Closed;
        if let Some(bc) = inner.back_channel.take() {
            bc.close().await;
        }
        drop(inner);

        self.session_timer.stop();
        self.heartbeat_timer.stop();
        self.dead_client_timer.stop();
        if let Some(tx) = self.inbound_tx.lock().unwrap().take() {
            drop(tx);
        }
        if !self.gc_fired.swap(true, Ordering::SeqCst) {
            let _ = self.gc_tx.send(self.sid);
        }
        tracing::info!(sid = %self.sid, "channel terminated");
    }

    async fn flush_locked(&self, inner: &mut Inner) {
        if inner.back_channel.is_none() {
            return;
        }
        let items = inner.queue.drain();
        if items.is_empty() {
            return;
        }

        let send_result;
        let should_detach;
        {
            let bc = inner.back_channel.as_ref().expect("checked above");
            send_result = bc.send(&items).await;
            should_detach = match &send_result {
                Ok(()) => bc.is_closed() || bc.outstanding_bytes() >= bc_protocol::MAX_OUTSTANDING_BYTES,
                Err(_) => true,
            };
        }
        if let Err(err) = &send_result {
            tracing::warn!(sid = %self.sid, error = %err, "back channel write failed; detaching");
        }
        if should_detach {
            if let Some(bc) = inner.back_channel.take() {
                bc.close().await;
            }
            self.heartbeat_timer.cancel();
            self.dead_client_timer.arm(DEAD_CLIENT_TIMEOUT);
        }
    }

    async fn on_heartbeat_tick(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state != ChannelState::Ready || inner.back_channel.is_none() {
            return;
        }
        let (count, _) = inner.queue.outstanding();
        if count == 0 {
            let result;
            let closed;
            {
                let bc = inner.back_channel.as_ref().expect("checked above");
                result = bc.send(&[]).await;
                closed = result.is_err() || bc.is_closed();
            }
            if closed {
                if let Some(bc) = inner.back_channel.take() {
                    bc.close().await;
                }
                self.dead_client_timer.arm(DEAD_CLIENT_TIMEOUT);
            }
        }
        if inner.back_channel.is_some() {
            self.heartbeat_timer.arm(HEARTBEAT_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bc_protocol::codec::Framing;

    fn new_channel() -> (Arc<Channel>, mpsc::UnboundedReceiver<SessionId>) {
        let (gc_tx, gc_rx) = mpsc::unbounded_channel();
        let channel = Channel::new(SessionId::generate(), "8".to_owned(), String::new(), gc_tx);
        (channel, gc_rx)
    }

    fn raw_framing() -> Framing {
        Framing { is_html: false, domain: None }
    }

    #[tokio::test]
    async fn new_channel_starts_in_init_with_config_array_queued() {
        let (channel, _gc_rx) = new_channel();
        assert_eq!(channel.state().await, ChannelState::Init);
        let snapshot = channel.get_state().await;
        assert_eq!(snapshot.last_sent_array_id, 1);
        assert!(!snapshot.has_back_channel);
    }

    #[tokio::test]
    async fn attaching_a_back_channel_transitions_to_ready_and_flushes_config_array() {
        let (channel, _gc_rx) = new_channel();
        let (tx, mut rx) = mpsc::channel(8);
        let bc = BackChannel::new(tx, raw_framing(), true);
        channel.set_back_channel(bc).await.unwrap();
        assert_eq!(channel.state().await, ChannelState::Ready);
        let chunk = rx.recv().await.unwrap().unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.contains("\"c\""));
    }

    #[tokio::test]
    async fn send_array_after_ready_flushes_immediately() {
        let (channel, _gc_rx) = new_channel();
        let (tx, mut rx) = mpsc::channel(8);
        let bc = BackChannel::new(tx, raw_framing(), true);
        channel.set_back_channel(bc).await.unwrap();
        rx.recv().await.unwrap().unwrap(); // config array

        channel.send_array(serde_json::json!({"k": 1})).await.unwrap();
        let chunk = rx.recv().await.unwrap().unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.contains("\"k\""));
    }

    #[tokio::test]
    async fn installing_a_new_back_channel_closes_the_previous_one() {
        let (channel, _gc_rx) = new_channel();
        let (tx1, mut rx1) = mpsc::channel(8);
        let bc1 = BackChannel::new(tx1, raw_framing(), true);
        channel.set_back_channel(bc1).await.unwrap();
        rx1.recv().await.unwrap().unwrap(); // config array

        let (tx2, _rx2) = mpsc::channel(8);
        let bc2 = BackChannel::new(tx2, raw_framing(), true);
        channel.set_back_channel(bc2).await.unwrap();

        assert!(rx1.recv().await.is_none(), "old back channel must be closed");
    }

    #[tokio::test]
    async fn receive_maps_delivers_in_order_and_discards_duplicates() {
        let (channel, _gc_rx) = new_channel();
        let mut map0 = ForwardMap::new();
        map0.insert("x".to_owned(), "hello".to_owned());
        channel.receive_maps(0, vec![map0.clone()]).await.unwrap();
        // duplicate: offset 0 again
        channel.receive_maps(0, vec![map0]).await.unwrap();

        let delivered = channel.recv_map().await.unwrap();
        assert_eq!(delivered.get("x"), Some(&"hello".to_owned()));
    }

    #[tokio::test]
    async fn receive_maps_fails_on_gap() {
        let (channel, _gc_rx) = new_channel();
        let err = channel
            .receive_maps(5, vec![ForwardMap::new()])
            .await
            .unwrap_err();
        assert_eq!(err, ChannelError::GapOffset { offset: 5, last: None });
    }

    #[tokio::test]
    async fn acknowledge_arrays_removes_acked_entries_from_snapshot() {
        let (channel, _gc_rx) = new_channel();
        channel.acknowledge_arrays(1).await;
        let snapshot = channel.get_state().await;
        assert_eq!(snapshot.outstanding_bytes, 0);
    }

    #[tokio::test]
    async fn terminate_closes_back_channel_and_publishes_to_gc() {
        let (channel, mut gc_rx) = new_channel();
        let (tx, mut rx) = mpsc::channel(8);
        let bc = BackChannel::new(tx, raw_framing(), true);
        channel.set_back_channel(bc).await.unwrap();
        rx.recv().await.unwrap().unwrap();

        channel.terminate().await;
        assert_eq!(channel.state().await, ChannelState::Closed);
        assert!(rx.recv().await.is_none());
        assert_eq!(gc_rx.recv().await, Some(channel.sid()));
    }

    #[tokio::test]
    async fn terminate_is_idempotent_about_gc_publication() {
        let (channel, mut gc_rx) = new_channel();
        channel.terminate().await;
        channel.terminate().await;
        assert_eq!(gc_rx.recv().await, Some(channel.sid()));
        // second terminate must not publish again
        assert!(gc_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_array_after_closed_fails() {
        let (channel, _gc_rx) = new_channel();
        channel.terminate().await;
        let err = channel.send_array(serde_json::json!("x")).await.unwrap_err();
        assert_eq!(err, ChannelError::Closed);
    }

    #[tokio::test]
    async fn recv_map_returns_none_after_terminate() {
        let (channel, _gc_rx) = new_channel();
        channel.terminate().await;
        assert!(channel.recv_map().await.is_none());
    }
}
