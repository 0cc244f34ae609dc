use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use tower::util::ServiceExt;

/// Sends one request through the router without binding a socket.
pub async fn request(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<Value>,
    headers: &[(&str, String)],
) -> Response {
    let mut builder = headers
        .iter()
        .fold(Request::builder().method(method).uri(path), |b, (k, v)| {
            b.header(*k, v.as_str())
        });

    let body = match body {
        Some(payload) => {
            builder = builder.header("content-type", "application/json");
            Body::from(payload.to_string())
        }
        None => Body::empty(),
    };

    let req = builder.body(body).expect("build request");
    app.clone().oneshot(req).await.expect("router response")
}

/// Splits a response into status, headers and JSON body (`{}` when empty).
pub async fn response_json(resp: Response) -> (StatusCode, HeaderMap, Value) {
    let (parts, body) = resp.into_parts();
    let bytes = to_bytes(body, usize::MAX).await.expect("read body");
    let json = if bytes.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (parts.status, parts.headers, json)
}

pub async fn get_json(app: &Router, path: &str) -> (StatusCode, Value) {
    let (status, _, body) = response_json(request(app, Method::GET, path, None, &[]).await).await;
    (status, body)
}

pub async fn post_json(app: &Router, path: &str, payload: Value) -> (StatusCode, Value) {
    let (status, _, body) =
        response_json(request(app, Method::POST, path, Some(payload), &[]).await).await;
    (status, body)
}

pub async fn post_frame(app: &Router, session_id: &str, payload: Value) -> (StatusCode, Value) {
    post_json(app, &format!("/api/sessions/{session_id}/frames"), payload).await
}

pub fn assert_json_error(body: &Value, code: &str) {
    assert_eq!(body["success"], false, "body: {body}");
    assert_eq!(body["code"], code, "body: {body}");
    assert!(body["message"].is_string());
}

pub fn assert_status_ok_json(status: StatusCode, body: &Value) {
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["success"], true);
    assert!(body.get("data").is_some());
}
