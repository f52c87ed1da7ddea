//! BrowserChannel protocol server: the `Channel` state machine, its
//! streaming back channel, the session registry, the standing GC task, and
//! the axum dispatcher that ties raw HTTP requests to per-session state.

pub mod channel;
pub mod channel_map;
pub mod config;
pub mod cors;
pub mod demo_handler;
pub mod gc;
pub mod handler;
pub mod http;
pub mod state;

pub use state::AppState;

use std::sync::Arc;

use channel_map::ChannelMap;
use config::ServerConfig;
use cors::CorsConfig;
use handler::ChannelHandler;

/// Wires up the channel registry, GC loop, and CORS config from `config`,
/// then builds the axum router.
pub fn build_router(config: &ServerConfig, app_handler: ChannelHandler) -> axum::Router {
    let channels = Arc::new(ChannelMap::new());
    let (gc_tx, _gc_handle) = gc::spawn(channels.clone());
    let cors = CorsConfig::new(config.cors_origin_regex.as_deref(), config.host_prefixes.clone())
        .expect("BC_CORS_ORIGIN_REGEX must be a valid regex");

    let state = AppState::new(channels, gc_tx, cors, app_handler);
    http::build_router(state, &config.bind_path, &config.test_path)
}

/// Test-only entry point: builds the router on `/bind` and `/test` with a
/// caller-supplied handler and CORS config, bypassing `ServerConfig::from_env`.
#[doc(hidden)]
pub fn build_router_for_test(app_handler: ChannelHandler, cors: CorsConfig) -> axum::Router {
    let channels = Arc::new(ChannelMap::new());
    let (gc_tx, _gc_handle) = gc::spawn(channels.clone());
    let state = AppState::new(channels, gc_tx, cors, app_handler);
    http::build_router(state, "bind", "test")
}
