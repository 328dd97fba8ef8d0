//! Request correlation for logs and error envelopes.
//!
//! Every request carries a [`RequestId`], either the caller's `x-request-id`
//! or a freshly generated UUID. The id is scoped in a task-local so code deep
//! in a handler (error rendering in particular) can pick it up without
//! threading it through every signature.

use std::{cell::RefCell, fmt, future::Future};

use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    trace::{MakeSpan, TraceLayer},
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Upper bound on accepted caller-supplied ids; longer values are replaced.
const MAX_REQUEST_ID_LEN: usize = 128;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

impl Default for RequestId {
    fn default() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }
}

impl RequestId {
    pub fn new(value: impl Into<String>) -> Self {
        RequestId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts an inbound header value if it is short visible ASCII.
    fn from_header(value: &HeaderValue) -> Option<Self> {
        let raw = value.to_str().ok()?.trim();
        if raw.is_empty()
            || raw.len() > MAX_REQUEST_ID_LEN
            || !raw.bytes().all(|b| b.is_ascii_graphic())
        {
            return None;
        }
        Some(RequestId::new(raw))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

tokio::task_local! {
    static CURRENT_REQUEST_ID: RefCell<Option<RequestId>>;
}

pub async fn scope_request_id<Fut, R>(request_id: RequestId, future: Fut) -> R
where
    Fut: Future<Output = R>,
{
    CURRENT_REQUEST_ID
        .scope(RefCell::new(Some(request_id)), future)
        .await
}

pub fn current_request_id() -> Option<RequestId> {
    CURRENT_REQUEST_ID
        .try_with(|cell| cell.borrow().clone())
        .ok()
        .flatten()
}

#[derive(Clone, Default)]
pub struct RequestSpanMaker;

impl<B> MakeSpan<B> for RequestSpanMaker {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .cloned()
            .unwrap_or_default();

        tracing::info_span!(
            "http.request",
            request_id = %request_id.as_str(),
            method = %request.method(),
            uri = %request.uri(),
        )
    }
}

/// Trace layer that opens one span per request, tagged with its request id.
pub fn configure_http_tracing(
) -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RequestSpanMaker> {
    TraceLayer::new_for_http().make_span_with(RequestSpanMaker)
}

/// Assigns a request id, exposes it to handlers and echoes it on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(RequestId::from_header)
        .unwrap_or_default();

    let header_value = HeaderValue::from_str(request_id.as_str()).ok();
    if let Some(value) = header_value.clone() {
        request
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    request.extensions_mut().insert(request_id.clone());

    let mut response = scope_request_id(request_id, next.run(request)).await;

    if let Some(value) = header_value {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        extract::Extension,
        http::{Request as HttpRequest, StatusCode},
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    async fn echo_request_id(Extension(request_id): Extension<RequestId>) -> String {
        let scoped = current_request_id().map(|rid| rid.0).unwrap_or_default();
        format!("{}|{}", request_id.as_str(), scoped)
    }

    fn app() -> Router {
        Router::new()
            .route("/", get(echo_request_id))
            .layer(axum::middleware::from_fn(request_id_middleware))
    }

    #[tokio::test]
    async fn inbound_request_id_is_preserved() {
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header(REQUEST_ID_HEADER, "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(REQUEST_ID_HEADER).unwrap(),
            "abc-123"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"abc-123|abc-123");
    }

    #[tokio::test]
    async fn missing_request_id_is_generated() {
        let response = app()
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let header = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(Uuid::parse_str(&header).is_ok());
    }

    #[test]
    fn oversized_or_garbled_ids_are_rejected() {
        let long = HeaderValue::from_str(&"a".repeat(MAX_REQUEST_ID_LEN + 1)).unwrap();
        assert!(RequestId::from_header(&long).is_none());
        let spaced = HeaderValue::from_static("has space");
        assert!(RequestId::from_header(&spaced).is_none());
        let ok = HeaderValue::from_static("req-1");
        assert_eq!(RequestId::from_header(&ok), Some(RequestId::new("req-1")));
    }

    #[test]
    fn no_request_id_outside_scope() {
        assert!(current_request_id().is_none());
    }
}
