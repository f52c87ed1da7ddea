//! Wire types and pure state for the BrowserChannel protocol: the
//! [`SessionId`] identifier, the forward/back-channel wire codec, and the
//! [`OutgoingQueue`] buffer. Nothing in this crate touches an async runtime
//! or an HTTP request — it is exercised directly by unit tests and wrapped
//! by `services/server` for the stateful, concurrent half of the protocol.

pub mod codec;
pub mod queue;
pub mod session_id;

pub use codec::{decode_forward_body, CodecError, Framing};
pub use queue::{OutgoingArray, OutgoingQueue};
pub use session_id::{SessionId, SessionIdParseError};

/// Protocol version this server implements. Test/bind requests reporting a
/// different `VER` are rejected per spec.md §4.6/§7.
pub const SUPPORTED_PROTOCOL_VERSION: u32 = 8;

/// Legacy requirement of the original browser client: an initial block of
/// space characters emitted before any HTML-framed batch, large enough to
/// defeat the buffering thresholds of streaming user agents. Treat as a
/// protocol-level constant, not an optimization to trim.
pub const HTML_PADDING_BYTES: usize = 1024;

/// Soft cap on bytes outstanding on a single back channel before the
/// channel must detach it and await a fresh request (spec.md §4.4).
pub const MAX_OUTSTANDING_BYTES: usize = 40 * 1024;
