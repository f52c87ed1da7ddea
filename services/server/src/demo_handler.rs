//! A small demo `ChannelHandler` wired into `main.rs`, mirroring every
//! inbound map back to the client as an outgoing array. Not part of the
//! protocol core — a concrete handler so the server does something
//! observable end to end, the way a host application would wire its own.

use crate::handler::{handler_fn, ChannelHandler};

pub fn echo_channel_handler() -> ChannelHandler {
    handler_fn(|channel| async move {
        tracing::info!(sid = %channel.sid(), "echo handler attached");
        while let Some(map) = channel.recv_map().await {
            let payload = serde_json::to_value(&map).unwrap_or(serde_json::Value::Null);
            if channel.send_array(payload).await.is_err() {
                break;
            }
        }
        tracing::info!(sid = %channel.sid(), "echo handler observed closed inbound stream");
    })
}
