//! The streaming-response half of a back channel (spec.md §4.4).
//!
//! A `BackChannel` wraps the sending half of an in-flight HTTP response
//! body. The `Channel` writes framed batches into it during flush; once the
//! channel detaches or terminates it, the sender is dropped and the
//! underlying response stream ends on its own — no separate task needs to
//! stay alive to "hold the connection open".

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bc_protocol::codec::Framing;
use bytes::Bytes;
use tokio::sync::{mpsc, Notify};

#[derive(Debug, thiserror::Error)]
pub enum BackChannelError {
    #[error("back channel's underlying writer is gone")]
    Broken,
}

pub struct BackChannel {
    sender: tokio::sync::Mutex<Option<mpsc::Sender<std::io::Result<Bytes>>>>,
    framing: Framing,
    chunked: bool,
    closed: AtomicBool,
    outstanding_bytes: AtomicUsize,
    done: Arc<Notify>,
}

impl BackChannel {
    pub fn new(sender: mpsc::Sender<std::io::Result<Bytes>>, framing: Framing, chunked: bool) -> Self {
        Self {
            sender: tokio::sync::Mutex::new(Some(sender)),
            framing,
            chunked,
            closed: AtomicBool::new(false),
            outstanding_bytes: AtomicUsize::new(0),
            done: Arc::new(Notify::new()),
        }
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn outstanding_bytes(&self) -> usize {
        self.outstanding_bytes.load(Ordering::SeqCst)
    }

    /// Writes the framing preamble (HTML head, padding, domain script). A
    /// no-op in raw mode.
    pub async fn write_preamble(&self) -> Result<(), BackChannelError> {
        let bytes = self.framing.preamble();
        if bytes.is_empty() {
            return Ok(());
        }
        self.write(bytes).await
    }

    /// Writes one framed batch. Closes itself afterward if this back
    /// channel is non-chunked (single-shot poll).
    pub async fn send(&self, items: &[(u64, serde_json::Value)]) -> Result<(), BackChannelError> {
        if self.is_closed() {
            return Ok(());
        }
        let bytes = self.framing.batch(items);
        let size = bytes.len();
        self.write(bytes).await?;
        self.outstanding_bytes.fetch_add(size, Ordering::SeqCst);
        if !self.chunked {
            self.close().await;
        }
        Ok(())
    }

    async fn write(&self, bytes: Vec<u8>) -> Result<(), BackChannelError> {
        let guard = self.sender.lock().await;
        match guard.as_ref() {
            Some(sender) => sender
                .send(Ok(Bytes::from(bytes)))
                .await
                .map_err(|_| BackChannelError::Broken),
            None => Err(BackChannelError::Broken),
        }
    }

    /// Marks this back channel done, writes the close frame (HTML mode
    /// only), and drops the sender so the response stream ends. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let bytes = self.framing.close();
        let mut guard = self.sender.lock().await;
        if let Some(sender) = guard.take() {
            if !bytes.is_empty() {
                let _ = sender.send(Ok(Bytes::from(bytes))).await;
            }
        }
        drop(guard);
        self.done.notify_waiters();
    }

    /// Resolves once this back channel has been closed. Not used by the
    /// HTTP layer (the streaming response ends on its own), but useful for
    /// tests that need to observe a handover completing.
    pub async fn wait(&self) {
        if self.is_closed() {
            return;
        }
        self.done.notified().await;
    }
}
