//! Per-request context.
//!
//! # Responsibilities
//! - Own the request head and buffered body for one request
//! - Buffer the response (status, headers, body) until the chain finishes
//! - Carry request-scoped values between middleware and the handler
//!
//! # Design Decisions
//! - `Context` is a cheap handle: every clone within one request shares state
//! - A fresh context is built per request and dropped when the response is sent,
//!   so values never leak across requests
//! - Values are type-erased and checked on retrieval; a wrong type is an error,
//!   not a panic

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use bytes::BytesMut;
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::SessionConfig;
use crate::error::ContextError;

type Value = Arc<dyn Any + Send + Sync>;

/// Response being assembled by middleware and the handler.
#[derive(Debug, Default)]
struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
}

struct Shared {
    parts: Parts,
    body: Bytes,
    session: Arc<SessionConfig>,
    response: Mutex<ResponseState>,
    values: Mutex<HashMap<String, Value>>,
}

/// Request/response access for one request.
#[derive(Clone)]
pub struct Context {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.shared.parts.method)
            .field("uri", &self.shared.parts.uri)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Build a context around a request head and its buffered body.
    pub fn new(parts: Parts, body: Bytes, session: Arc<SessionConfig>) -> Self {
        Self {
            shared: Arc::new(Shared {
                parts,
                body,
                session,
                response: Mutex::new(ResponseState::default()),
                values: Mutex::new(HashMap::new()),
            }),
        }
    }

    // --- Request ---

    pub fn method(&self) -> &Method {
        &self.shared.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.shared.parts.uri
    }

    pub fn path(&self) -> &str {
        self.shared.parts.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.shared.parts.uri.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.shared.parts.headers
    }

    /// First value of a request header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.shared.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The request body, buffered before the chain runs.
    pub fn body(&self) -> &Bytes {
        &self.shared.body
    }

    pub(crate) fn session_config(&self) -> &SessionConfig {
        &self.shared.session
    }

    // --- Response ---

    pub fn status(&self) -> StatusCode {
        self.shared.response.lock().status
    }

    pub fn set_status(&self, status: StatusCode) {
        self.shared.response.lock().status = status;
    }

    /// Replace a response header.
    pub fn set_header(&self, name: &str, value: &str) -> Result<(), ContextError> {
        let (name, value) = header_pair(name, value)?;
        self.shared.response.lock().headers.insert(name, value);
        Ok(())
    }

    /// Add a response header without removing existing values.
    pub fn append_header(&self, name: &str, value: &str) -> Result<(), ContextError> {
        let (name, value) = header_pair(name, value)?;
        self.shared.response.lock().headers.append(name, value);
        Ok(())
    }

    pub(crate) fn append_header_value(&self, name: HeaderName, value: HeaderValue) {
        self.shared.response.lock().headers.append(name, value);
    }

    /// Append UTF-8 text to the response body.
    pub fn write(&self, text: &str) {
        self.write_bytes(text.as_bytes());
    }

    pub fn write_bytes(&self, bytes: &[u8]) {
        self.shared.response.lock().body.extend_from_slice(bytes);
    }

    /// Write `value` as compact JSON with `Content-Type: application/json`.
    ///
    /// If serialization fails nothing is written, the status becomes 500 and
    /// the error is returned.
    pub fn write_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), ContextError> {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                let mut response = self.shared.response.lock();
                response
                    .headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response.body.extend_from_slice(&bytes);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, path = %self.path(), "JSON marshal error");
                self.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                Err(ContextError::Json(e))
            }
        }
    }

    /// Send a file from disk as the response body.
    ///
    /// A missing file answers 404, any other read failure 500.
    pub async fn serve_file(&self, path: impl AsRef<Path>) -> Result<(), ContextError> {
        let path = path.as_ref();
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let mut response = self.shared.response.lock();
                response
                    .headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static(content_type(path)));
                response.body.extend_from_slice(&bytes);
                Ok(())
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::NotFound {
                    self.set_status(StatusCode::NOT_FOUND);
                    self.write("404 page not found\n");
                } else {
                    tracing::error!(error = %e, path = %path.display(), "Failed to read file");
                    self.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                }
                Err(ContextError::Io(e))
            }
        }
    }

    /// Turn the buffered response into an HTTP response.
    pub fn into_response(self) -> Response {
        let state = std::mem::take(&mut *self.shared.response.lock());
        let mut response = Response::new(Body::from(state.body.freeze()));
        *response.status_mut() = state.status;
        *response.headers_mut() = state.headers;
        response
    }

    // --- Request-scoped values ---

    /// Store a value for the rest of this request.
    pub fn set_value<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.shared.values.lock().insert(key.into(), Arc::new(value));
    }

    /// Fetch a value stored earlier in this request.
    ///
    /// Returns `Ok(None)` when nothing is stored under `key`.
    pub fn value<T: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<T>>, ContextError> {
        let Some(value) = self.shared.values.lock().get(key).cloned() else {
            return Ok(None);
        };
        value
            .downcast::<T>()
            .map(Some)
            .map_err(|_| ContextError::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    pub fn has_value(&self, key: &str) -> bool {
        self.shared.values.lock().contains_key(key)
    }

    pub fn remove_value(&self, key: &str) -> bool {
        self.shared.values.lock().remove(key).is_some()
    }
}

fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ContextError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ContextError::InvalidHeader(name.to_string()))?;
    let value =
        HeaderValue::from_str(value).map_err(|_| ContextError::InvalidHeader(value.to_string()))?;
    Ok((name, value))
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
        .as_str()
    {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
pub(crate) fn test_context(request: axum::http::Request<Body>) -> Context {
    let (parts, _) = request.into_parts();
    Context::new(parts, Bytes::new(), Arc::new(SessionConfig::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn ctx() -> Context {
        test_context(Request::builder().uri("/x?a=1").body(Body::empty()).unwrap())
    }

    async fn body_of(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    #[test]
    fn test_request_accessors() {
        let ctx = ctx();
        assert_eq!(ctx.method(), Method::GET);
        assert_eq!(ctx.path(), "/x");
        assert_eq!(ctx.query(), Some("a=1"));
        assert!(ctx.header("host").is_none());
    }

    #[test]
    fn test_values_are_shared_between_clones() {
        let ctx = ctx();
        let other = ctx.clone();
        ctx.set_value("user", String::from("alice"));

        let user = other.value::<String>("user").unwrap().unwrap();
        assert_eq!(user.as_str(), "alice");
        assert!(other.has_value("user"));
    }

    #[test]
    fn test_missing_value_is_none() {
        assert!(ctx().value::<String>("nope").unwrap().is_none());
    }

    #[test]
    fn test_wrong_type_is_mismatch() {
        let ctx = ctx();
        ctx.set_value("n", 42u32);
        let err = ctx.value::<String>("n").unwrap_err();
        assert!(matches!(err, ContextError::TypeMismatch { ref key, .. } if key == "n"));

        assert!(ctx.remove_value("n"));
        assert!(!ctx.has_value("n"));
    }

    #[tokio::test]
    async fn test_write_appends() {
        let ctx = ctx();
        ctx.write("hello ");
        ctx.write("world");
        let response = ctx.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(CONTENT_TYPE).is_none());
        assert_eq!(body_of(response).await, "hello world");
    }

    #[tokio::test]
    async fn test_write_json() {
        let ctx = ctx();
        ctx.write_json(&serde_json::json!({"a": 1})).unwrap();
        let response = ctx.into_response();
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_of(response).await, r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_write_json_failure_writes_nothing() {
        // Maps with non-string keys cannot be JSON objects.
        let mut bad = HashMap::new();
        bad.insert((1, 2), "x");

        let ctx = ctx();
        assert!(matches!(ctx.write_json(&bad), Err(ContextError::Json(_))));
        let response = ctx.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_of(response).await.is_empty());
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let ctx = ctx();
        assert!(ctx.set_header("x-ok", "yes").is_ok());
        assert!(matches!(
            ctx.set_header("bad header", "x"),
            Err(ContextError::InvalidHeader(_))
        ));
    }

    #[tokio::test]
    async fn test_serve_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icon.ico");
        std::fs::write(&path, b"\x00\x00\x01\x00").unwrap();

        let ctx = ctx();
        ctx.serve_file(&path).await.unwrap();
        let response = ctx.into_response();
        assert_eq!(response.headers()[CONTENT_TYPE], "image/x-icon");
        assert_eq!(body_of(response).await.as_ref(), b"\x00\x00\x01\x00");

        let ctx = self::ctx();
        assert!(ctx.serve_file(dir.path().join("missing.ico")).await.is_err());
        assert_eq!(ctx.into_response().status(), StatusCode::NOT_FOUND);
    }
}
