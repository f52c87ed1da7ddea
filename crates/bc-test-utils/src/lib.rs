//! Test-only helpers shared by `services/server`'s integration tests: a
//! forward-channel body builder and a back-channel frame parser, so tests
//! read as scenarios instead of hand-rolled `reqN_x=y` strings.

mod forward_body;
mod frame_reader;

pub use forward_body::ForwardBodyBuilder;
pub use frame_reader::{parse_html_frames, parse_raw_frames};
