use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use bc_test_utils::{parse_raw_frames, ForwardBodyBuilder};
use http_body_util::BodyExt;
use server::cors::CorsConfig;
use server::handler::{handler_fn, ChannelHandler};
use tower::ServiceExt;

/// A handler that drains inbound maps without reacting to them, so tests
/// can assert on bare protocol mechanics without an application echoing
/// extra arrays onto the queue.
pub fn silent_handler() -> ChannelHandler {
    handler_fn(|channel| async move { while channel.recv_map().await.is_some() {} })
}

/// Mirrors every inbound map back as an outgoing array, standing in for
/// "the application calls SendArray" in tests that exercise the back
/// channel handover.
pub fn echoing_handler() -> ChannelHandler {
    handler_fn(|channel| async move {
        while let Some(map) = channel.recv_map().await {
            let payload = serde_json::to_value(&map).unwrap_or(serde_json::Value::Null);
            if channel.send_array(payload).await.is_err() {
                break;
            }
        }
    })
}

pub fn router_with(handler: ChannelHandler) -> Router {
    server::build_router_for_test(handler, CorsConfig::new(None, vec![]).unwrap())
}

pub fn router() -> Router {
    router_with(silent_handler())
}

/// Issues the first `GET /bind` for a new session, asserts it carries
/// exactly the config array, and returns the allocated SID.
pub async fn establish_session(router: &Router) -> String {
    let request = Request::builder()
        .method("GET")
        .uri("/bind?VER=8&RID=1&CVER=8&zx=abc")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let frames = parse_raw_frames(&text);
    assert_eq!(frames.len(), 1, "fresh bind must deliver exactly the config batch");

    let batch = frames[0].as_array().unwrap();
    let tuple = batch[0].as_array().unwrap();
    assert_eq!(tuple[0], serde_json::json!(1));
    let config = tuple[1].as_array().unwrap();
    assert_eq!(config[0], serde_json::json!("c"));
    config[1].as_str().unwrap().to_owned()
}

/// Opens a chunked (`CI=0`) back channel and returns the still-streaming
/// response.
pub async fn open_back_channel(router: &Router, sid: &str) -> Response {
    let request = Request::builder()
        .method("GET")
        .uri(format!("/bind?SID={sid}&TYPE=xmlhttp&CI=0&VER=8"))
        .body(Body::empty())
        .unwrap();
    router.clone().oneshot(request).await.unwrap()
}

/// Posts a single-key forward map at `ofs`, asserting the dispatcher
/// accepted it.
pub async fn post_forward_map(router: &Router, sid: &str, ofs: u64, key: &str, value: &str) {
    let body = ForwardBodyBuilder::new(ofs).map([(key, value)]).build();
    let request = Request::builder()
        .method("POST")
        .uri(format!("/bind?SID={sid}&VER=8"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Acknowledges arrays up to `upto` via an otherwise-empty forward POST.
pub async fn ack(router: &Router, sid: &str, upto: u64) {
    let request = Request::builder()
        .method("POST")
        .uri(format!("/bind?SID={sid}&AID={upto}&VER=8"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("count=0&ofs=0"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Reads the `{len}\n{json}` snapshot body of a non-attaching forward POST.
pub async fn snapshot(router: &Router, sid: &str) -> serde_json::Value {
    let request = Request::builder()
        .method("POST")
        .uri(format!("/bind?SID={sid}&VER=8"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("count=0&ofs=0"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let (_, json_part) = text.split_once('\n').unwrap();
    serde_json::from_str(json_part).unwrap()
}

/// Polls `snapshot` until `lastSentArrayId` reaches `target`, bounding the
/// wait since the application handler processes inbound maps on its own task.
pub async fn wait_for_last_array_id(router: &Router, sid: &str, target: u64) {
    for _ in 0..100 {
        let snap = snapshot(router, sid).await;
        if snap["lastSentArrayId"].as_u64() == Some(target) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for lastSentArrayId == {target}");
}

/// Reads one streamed frame's raw bytes as text, or an empty string once
/// the stream has ended or gone quiet past the timeout.
pub async fn next_frame_text(body: &mut Body) -> String {
    let frame = tokio::time::timeout(Duration::from_secs(2), body.frame()).await;
    match frame {
        Ok(Some(Ok(frame))) => match frame.into_data() {
            Ok(data) => String::from_utf8(data.to_vec()).unwrap_or_default(),
            Err(_) => String::new(),
        },
        _ => String::new(),
    }
}

/// Extracts the array id of the first tuple in a single raw-framed batch.
pub fn first_array_id(frame_text: &str) -> Option<u64> {
    let frames = parse_raw_frames(frame_text);
    frames
        .first()?
        .as_array()?
        .first()?
        .as_array()?
        .first()?
        .as_u64()
}
