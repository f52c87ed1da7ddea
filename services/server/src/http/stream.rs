//! Shared plumbing for turning an axum response into a live back channel
//! (spec.md §4.4/§6): the streaming headers, the mpsc-backed body, and the
//! hookup into [`Channel::set_back_channel`].

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use bc_protocol::codec::Framing;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::channel::{BackChannel, Channel, ChannelError};
use crate::http::response::channel_closed;

const CHANNEL_BUFFER: usize = 8;

/// Builds a streaming response and attaches it to `channel` as the active
/// back channel, with the standard streaming headers. Returns a plain
/// closed-channel response instead if the channel has already terminated.
/// CORS is applied by the caller, same as every other response shape from
/// the bind/test sub-handlers.
pub async fn attach_back_channel(
    channel: &Arc<Channel>,
    chunked: bool,
    is_html: bool,
    domain: Option<String>,
) -> Response {
    let framing = Framing { is_html, domain };
    let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(CHANNEL_BUFFER);
    let bc = BackChannel::new(tx, framing, chunked);

    match channel.set_back_channel(bc).await {
        Ok(()) => {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                if is_html { "text/html".parse().unwrap() } else { "text/plain".parse().unwrap() },
            );
            headers.insert(
                header::CACHE_CONTROL,
                "no-cache, no-store, max-age=0, must-revalidate".parse().unwrap(),
            );
            headers.insert(header::EXPIRES, "Fri, 01 Jan 1990 00:00:00 GMT".parse().unwrap());
            headers.insert("X-Content-Type-Options", "nosniff".parse().unwrap());
            headers.insert(header::PRAGMA, "no-cache".parse().unwrap());
            headers.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());

            let body = Body::from_stream(ReceiverStream::new(rx));
            let mut response = Response::new(body);
            *response.status_mut() = StatusCode::OK;
            *response.headers_mut() = headers;
            response
        }
        Err(ChannelError::Closed) => {
            drop(rx);
            channel_closed()
        }
        Err(other) => {
            drop(rx);
            tracing::error!(sid = %channel.sid(), error = %other, "unexpected error attaching back channel");
            channel_closed()
        }
    }
}
