//! The test sub-handler (spec.md §4.6): protocol version probing, the CORS
//! prefix-discovery `MODE=init` response, and the two-phase streaming probe
//! clients use to detect proxies that strip chunked transfer encoding.

use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bc_protocol::codec::Framing;
use bc_protocol::SUPPORTED_PROTOCOL_VERSION;
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::http::response::{bad_request, with_cors};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TestQuery {
    #[serde(rename = "VER", default)]
    pub ver: Option<String>,
    #[serde(rename = "MODE", default)]
    pub mode: Option<String>,
    #[serde(rename = "TYPE", default)]
    pub r#type: Option<String>,
    #[serde(rename = "DOMAIN", default)]
    pub domain: Option<String>,
}

pub async fn test_handler(
    Query(query): Query<TestQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let origin = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok());

    if !version_is_supported(query.ver.as_deref()) {
        return with_cors(bad_request("unsupported protocol version"), &state.cors, origin);
    }

    if query.mode.as_deref() == Some("init") {
        let prefix = state.cors.random_host_prefix();
        return with_cors(Json(serde_json::json!([prefix, ""])).into_response(), &state.cors, origin);
    }

    let is_html = query.r#type.as_deref() == Some("html");
    let domain = query.domain.clone();
    let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(4);

    tokio::spawn(async move {
        let framing = Framing { is_html, domain };
        let preamble = framing.preamble();
        if !preamble.is_empty() && tx.send(Ok(Bytes::from(preamble))).await.is_err() {
            return;
        }
        if tx.send(Ok(Bytes::from(wrap_token(is_html, "11111")))).await.is_err() {
            return;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        if tx.send(Ok(Bytes::from(wrap_token(is_html, "2")))).await.is_err() {
            return;
        }
        let close = framing.close();
        if !close.is_empty() {
            let _ = tx.send(Ok(Bytes::from(close))).await;
        }
    });

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        if is_html { "text/html".parse().unwrap() } else { "text/plain".parse().unwrap() },
    );
    let body = Body::from_stream(ReceiverStream::new(rx));
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    *response.headers_mut() = headers;
    with_cors(response, &state.cors, origin)
}

/// The probe's tokens are fixed server-side literals (`"11111"`, `"2"`), so
/// wrapping them needs no HTML-escaping of their own.
fn wrap_token(is_html: bool, token: &str) -> Vec<u8> {
    if is_html {
        format!("<script>try{{parent.m(\"{token}\")}}catch(e){{}}</script>\n").into_bytes()
    } else {
        token.as_bytes().to_vec()
    }
}

fn version_is_supported(ver: Option<&str>) -> bool {
    ver.and_then(|v| v.parse::<u32>().ok()) == Some(SUPPORTED_PROTOCOL_VERSION)
}
