//! Static file serving with gzip compression.
//!
//! # Data Flow
//! ```text
//! Request
//!     → Gzip (cache header, negotiates encoding)
//!     → StripPrefix (drop the mount prefix from the path)
//!     → ServeDir (resolve under the directory, read file)
//! ```
//!
//! # Design Decisions
//! - Every response gets `Cache-Control: max-age=<secs>`
//! - Clients without gzip get the inner response untouched
//! - Compression buffers the body and finishes the encoder exactly once, after
//!   the inner service has produced the whole file
//! - Only files whose `Content-Length` lies within
//!   `[gzip_min_size, gzip_max_size]` are buffered; anything else streams
//!   through as is
//! - Partial (206), not-modified (304), empty, already-encoded and
//!   already-compressed formats (images, archives, video) pass through
//!   uncompressed

use std::convert::Infallible;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{
    HeaderMap, HeaderValue, ACCEPT_ENCODING, CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LENGTH,
    CONTENT_TYPE, VARY,
};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use flate2::write::GzEncoder;
use flate2::Compression;
use futures_util::future::BoxFuture;
use tower::util::MapResponse;
use tower::{Layer, Service, ServiceBuilder};
use tower_http::services::fs::ServeFileSystemResponseBody;
use tower_http::services::ServeDir;

use crate::config::StaticFilesConfig;
use crate::routing::mux::not_found;

type FileResponse = axum::http::Response<ServeFileSystemResponseBody>;

/// `ServeDir` with its response body boxed into an axum `Body`.
pub type Files = MapResponse<ServeDir, fn(FileResponse) -> Response>;

/// The full static-file stack mounted by `Group::serve_files`.
pub type StaticFiles = Gzip<StripPrefix<Files>>;

fn into_response(response: FileResponse) -> Response {
    response.into_response()
}

/// Build the service mounted by `Group::serve_files`.
pub fn serve_dir(dir: &Path, prefix: &str, config: &StaticFilesConfig) -> StaticFiles {
    let files: Files = MapResponse::new(
        ServeDir::new(dir),
        into_response as fn(FileResponse) -> Response,
    );
    ServiceBuilder::new()
        .layer(GzipLayer::new(config))
        .layer(StripPrefixLayer::new(prefix))
        .service(files)
}

/// Returns true if the `Accept-Encoding` header allows gzip.
fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|item| {
            let mut parts = item.split(';');
            let coding = parts.next().unwrap_or("").trim();
            let disabled = parts.any(|p| {
                p.trim()
                    .strip_prefix("q=")
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .is_some_and(|q| q == 0.0)
            });
            coding.eq_ignore_ascii_case("gzip") && !disabled
        })
}

/// Which file responses are worth compressing.
#[derive(Debug, Clone)]
struct GzipPolicy {
    min_size: u64,
    max_size: u64,
    excluded_types: Arc<[String]>,
}

impl GzipPolicy {
    fn from_config(config: &StaticFilesConfig) -> Self {
        Self {
            min_size: config.gzip_min_size,
            max_size: config.gzip_max_size,
            excluded_types: config
                .gzip_excluded_types
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
        }
    }

    fn should_compress(&self, response: &Response) -> bool {
        if matches!(
            response.status(),
            StatusCode::PARTIAL_CONTENT | StatusCode::NOT_MODIFIED | StatusCode::NO_CONTENT
        ) {
            return false;
        }
        let headers = response.headers();
        if headers.contains_key(CONTENT_ENCODING) {
            return false;
        }

        // Unknown length would mean buffering without a bound.
        let Some(len) = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
        else {
            return false;
        };
        if len < self.min_size || len > self.max_size {
            return false;
        }

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let base = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        !self.excluded_types.iter().any(|t| *t == base)
    }

    fn buffer_limit(&self) -> usize {
        usize::try_from(self.max_size).unwrap_or(usize::MAX)
    }
}

fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

async fn compress(response: Response, limit: usize) -> Response {
    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read file body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if bytes.is_empty() {
        return Response::from_parts(parts, Body::from(bytes));
    }

    match gzip(&bytes) {
        Ok(compressed) => {
            parts
                .headers
                .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            parts
                .headers
                .append(VARY, HeaderValue::from_static("accept-encoding"));
            parts
                .headers
                .insert(CONTENT_LENGTH, HeaderValue::from(compressed.len()));
            Response::from_parts(parts, Body::from(compressed))
        }
        Err(e) => {
            tracing::error!(error = %e, "Gzip compression failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Layer applying [`Gzip`].
#[derive(Debug, Clone)]
pub struct GzipLayer {
    cache_control: HeaderValue,
    policy: GzipPolicy,
}

impl GzipLayer {
    pub fn new(config: &StaticFilesConfig) -> Self {
        Self {
            cache_control: HeaderValue::from_str(&format!(
                "max-age={}",
                config.cache_max_age_secs
            ))
            .unwrap_or_else(|_| HeaderValue::from_static("max-age=86400")),
            policy: GzipPolicy::from_config(config),
        }
    }
}

impl<S> Layer<S> for GzipLayer {
    type Service = Gzip<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Gzip {
            inner,
            cache_control: self.cache_control.clone(),
            policy: self.policy.clone(),
        }
    }
}

/// Gzip decorator around any file-serving service.
#[derive(Debug, Clone)]
pub struct Gzip<S> {
    inner: S,
    cache_control: HeaderValue,
    policy: GzipPolicy,
}

impl<S> Service<Request> for Gzip<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let compressible = request.method() != Method::HEAD && accepts_gzip(request.headers());
        let cache_control = self.cache_control.clone();
        let policy = self.policy.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let mut response = match inner.call(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            };
            response.headers_mut().insert(CACHE_CONTROL, cache_control);

            if !compressible || !policy.should_compress(&response) {
                return Ok(response);
            }
            Ok(compress(response, policy.buffer_limit()).await)
        })
    }
}

/// Layer applying [`StripPrefix`].
#[derive(Debug, Clone)]
pub struct StripPrefixLayer {
    prefix: Arc<str>,
}

impl StripPrefixLayer {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: Arc::from(prefix),
        }
    }
}

impl<S> Layer<S> for StripPrefixLayer {
    type Service = StripPrefix<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StripPrefix {
            inner,
            prefix: self.prefix.clone(),
        }
    }
}

/// Removes a fixed prefix from the request path; paths without it get 404.
#[derive(Debug, Clone)]
pub struct StripPrefix<S> {
    inner: S,
    prefix: Arc<str>,
}

impl<S> Service<Request> for StripPrefix<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let Some(uri) = strip_prefix(request.uri(), &self.prefix) else {
            return Box::pin(async { Ok(not_found()) });
        };
        *request.uri_mut() = uri;

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(request).await })
    }
}

fn strip_prefix(uri: &Uri, prefix: &str) -> Option<Uri> {
    let rest = uri.path().strip_prefix(prefix)?;
    let path = if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    };
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };
    path_and_query.parse().ok()
}
