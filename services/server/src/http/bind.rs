//! The bind sub-handler (spec.md §4.6).

use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bc_protocol::{decode_forward_body, SessionId};
use serde::Deserialize;

use crate::channel::{Channel, ChannelError};
use crate::http::response::{bad_request, channel_closed, internal_error, unknown_sid, with_cors};
use crate::http::stream::attach_back_channel;
use crate::state::AppState;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct BindQuery {
    #[serde(rename = "SID", default)]
    pub sid: Option<String>,
    #[serde(rename = "VER", default)]
    pub ver: Option<String>,
    #[serde(rename = "TYPE", default)]
    pub r#type: Option<String>,
    #[serde(rename = "DOMAIN", default)]
    pub domain: Option<String>,
    #[serde(rename = "CI", default)]
    pub ci: Option<String>,
    #[serde(rename = "AID", default)]
    pub aid: Option<String>,
    #[serde(default)]
    pub zx: Option<String>,
    #[serde(rename = "RID", default)]
    pub rid: Option<String>,
    #[serde(rename = "CVER", default)]
    pub cver: Option<String>,
}

pub async fn bind_handler(
    State(state): State<AppState>,
    Query(query): Query<BindQuery>,
    method: Method,
    headers: HeaderMap,
    body: String,
) -> Response {
    let origin = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok());

    let sid_raw = query.sid.clone().unwrap_or_default();
    let channel = match SessionId::parse_optional(&sid_raw) {
        Ok(Some(sid)) => match state.channels.get(&sid).await {
            Some(channel) => channel,
            None => return with_cors(unknown_sid(), &state.cors, origin),
        },
        Ok(None) => {
            let client_version = query.ver.clone().unwrap_or_default();
            let host_prefix = state.cors.random_host_prefix();
            let gc_tx = state.gc_tx.clone();
            let channel = state
                .channels
                .insert_fresh(|sid| Channel::new(sid, client_version.clone(), host_prefix.clone(), gc_tx.clone()))
                .await;
            crate::handler::spawn_channel_handler(state.handler.clone(), channel.clone());
            channel
        }
        Err(_) => return with_cors(unknown_sid(), &state.cors, origin),
    };

    if let Some(aid) = query.aid.as_deref() {
        if let Ok(aid) = aid.parse::<u64>() {
            channel.acknowledge_arrays(aid).await;
        }
    }

    let response = match method {
        Method::POST => handle_forward(&channel, &query, &body).await,
        Method::GET => handle_back_channel(&channel, &query).await,
        _ => (StatusCode::METHOD_NOT_ALLOWED, "method not allowed").into_response(),
    };
    with_cors(response, &state.cors, origin)
}

async fn handle_forward(channel: &Arc<Channel>, query: &BindQuery, body: &str) -> Response {
    let (offset, maps) = match decode_forward_body(body) {
        Ok(parsed) => parsed,
        Err(err) => return bad_request(err.to_string()),
    };

    match channel.receive_maps(offset, maps).await {
        Ok(()) => {}
        Err(ChannelError::Closed) => return channel_closed(),
        Err(ChannelError::GapOffset { offset, last }) => {
            tracing::warn!(sid = %channel.sid(), offset, ?last, "forward POST left a gap in offsets");
            return internal_error("gap in map offsets");
        }
    }

    if channel.state().await == crate::channel::ChannelState::Init {
        let is_html = query.r#type.as_deref() == Some("html");
        return attach_back_channel(channel, false, is_html, query.domain.clone()).await;
    }

    let snapshot = channel.get_state().await;
    let json = serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_owned());
    let framed = format!("{}\n{}", json.len(), json);
    ([(axum::http::header::CONTENT_TYPE, "text/plain")], framed).into_response()
}

async fn handle_back_channel(channel: &Arc<Channel>, query: &BindQuery) -> Response {
    if query.r#type.as_deref() == Some("terminate") {
        channel.terminate().await;
        return (StatusCode::OK, "").into_response();
    }

    let chunked = query.ci.as_deref() == Some("0");
    let is_html = query.r#type.as_deref() == Some("html");
    attach_back_channel(channel, chunked, is_html, query.domain.clone()).await
}
