use std::sync::Arc;

use bc_protocol::SessionId;
use tokio::sync::mpsc;

use crate::channel_map::ChannelMap;
use crate::cors::CorsConfig;
use crate::handler::ChannelHandler;

#[derive(Clone)]
pub struct AppState {
    pub channels: Arc<ChannelMap>,
    pub gc_tx: mpsc::UnboundedSender<SessionId>,
    pub cors: Arc<CorsConfig>,
    pub handler: ChannelHandler,
}

impl AppState {
    pub fn new(
        channels: Arc<ChannelMap>,
        gc_tx: mpsc::UnboundedSender<SessionId>,
        cors: CorsConfig,
        handler: ChannelHandler,
    ) -> Self {
        Self {
            channels,
            gc_tx,
            cors: Arc::new(cors),
            handler,
        }
    }
}
