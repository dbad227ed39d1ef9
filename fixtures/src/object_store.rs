//! Path-style S3 stand-in.
//!
//! Accepts `PUT /{bucket}/{key}` when the request carries SigV4 headers and a
//! payload hash that matches the body. Signatures themselves are not verified.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::put,
    Router,
};
use sha2::{Digest, Sha256};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Clone, Default)]
pub struct MockObjectStore {
    objects: Arc<Mutex<HashMap<String, Object>>>,
    puts: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    delay_ms: Arc<AtomicU64>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/:bucket/*key", put(put_object).get(get_object))
            .with_state(self.clone())
    }

    /// `bucket/key` → stored object
    pub fn get(&self, bucket: &str, key: &str) -> Option<Object> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&format!("{bucket}/{key}"))
            .cloned()
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// While set, every PUT is answered with 503
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Hold every PUT response back by `delay`
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

fn s3_error(status: StatusCode, code: &str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/xml")],
        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>{code}</Code></Error>"),
    )
        .into_response()
}

async fn put_object(
    State(store): State<MockObjectStore>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    store.puts.fetch_add(1, Ordering::SeqCst);

    let delay = store.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if store.failing.load(Ordering::SeqCst) {
        return s3_error(StatusCode::SERVICE_UNAVAILABLE, "SlowDown");
    }

    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let signed = header_str("authorization").is_some_and(|v| v.starts_with("AWS4-HMAC-SHA256 "))
        && header_str("x-amz-date").is_some();
    if !signed {
        return s3_error(StatusCode::FORBIDDEN, "AccessDenied");
    }

    let payload_hash = format!("{:x}", Sha256::digest(&body));
    if header_str("x-amz-content-sha256") != Some(payload_hash.as_str()) {
        return s3_error(StatusCode::BAD_REQUEST, "XAmzContentSHA256Mismatch");
    }

    info!(%bucket, %key, bytes = body.len(), "Object store: PUT");

    store
        .objects
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(
            format!("{bucket}/{key}"),
            Object {
                body: body.to_vec(),
                content_type: header_str("content-type").map(str::to_string),
            },
        );

    StatusCode::OK.into_response()
}

async fn get_object(
    State(store): State<MockObjectStore>,
    Path((bucket, key)): Path<(String, String)>,
) -> Response {
    match store.get(&bucket, &key) {
        Some(object) => (
            [(
                header::CONTENT_TYPE,
                object
                    .content_type
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
            )],
            object.body,
        )
            .into_response(),
        None => s3_error(StatusCode::NOT_FOUND, "NoSuchKey"),
    }
}
