use std::collections::BTreeMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// Largest body `/bytes/{n}` will produce.
pub const MAX_BYTES: usize = 16 * 1024 * 1024;

/// What `/echo` saw of the request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    /// Lower-cased names; repeated headers keep every value in order.
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: String,
}

#[derive(Deserialize)]
pub struct RedirectTarget {
    pub to: String,
    #[serde(default = "default_redirect_status")]
    pub status: u16,
}

fn default_redirect_status() -> u16 {
    302
}

pub fn app() -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/redirect", get(redirect))
        .route("/slow/{ms}", get(slow))
        .route("/stream/{chunks}", get(stream))
        .route("/cookies", get(cookies))
        .route("/bytes/{n}", get(sized_body))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &headers {
        seen.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    tracing::debug!(%method, path = uri.path(), bytes = body.len(), "echo");
    Json(Echo {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: seen,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn redirect(Query(target): Query<RedirectTarget>) -> Response {
    let status = StatusCode::from_u16(target.status)
        .ok()
        .filter(StatusCode::is_redirection)
        .unwrap_or(StatusCode::FOUND);
    match HeaderValue::from_str(&target.to) {
        Ok(location) => (status, [(header::LOCATION, location)]).into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, "invalid redirect target").into_response(),
    }
}

async fn slow(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "done"
}

/// `chunks` newline-terminated lines, written 10ms apart.
async fn stream(Path(chunks): Path<usize>) -> Response {
    let body = futures_util::stream::iter(0..chunks).then(|i| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok::<_, Infallible>(Bytes::from(format!("chunk {i}\n")))
    });
    (
        [(header::CONTENT_TYPE, "text/plain")],
        Body::from_stream(body),
    )
        .into_response()
}

async fn cookies() -> Response {
    let mut headers = HeaderMap::new();
    headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1; Path=/"));
    headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2; Path=/"));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    (headers, "cookies set").into_response()
}

async fn sized_body(Path(n): Path<usize>) -> Response {
    if n > MAX_BYTES {
        return (StatusCode::PAYLOAD_TOO_LARGE, "too large").into_response();
    }
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        vec![b'x'; n],
    )
        .into_response()
}
