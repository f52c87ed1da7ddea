//! The embedding contract (spec.md §6): the host registers one
//! `ChannelHandler` invoked in a fresh task for every new channel.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::channel::Channel;

pub type ChannelHandler =
    Arc<dyn Fn(Arc<Channel>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Wraps a plain async function into a [`ChannelHandler`].
pub fn handler_fn<F, Fut>(f: F) -> ChannelHandler
where
    F: Fn(Arc<Channel>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |channel| Box::pin(f(channel)))
}

pub fn spawn_channel_handler(handler: ChannelHandler, channel: Arc<Channel>) {
    tokio::spawn((handler)(channel));
}
