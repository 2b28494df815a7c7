//! Tower layers applied to every HTTP request, outermost first.

use axum::http::header::HeaderName;
use axum::http::StatusCode;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::HttpConfig;

/// The composed Tower layer type produced by [`build_http_layers`].
///
/// Each layer wraps the next in a `Stack`, from outermost (first applied)
/// to innermost (last applied).
type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        TimeoutLayer,
        tower::layer::util::Stack<
            RequestBodyLimitLayer,
            tower::layer::util::Stack<
                TraceLayer<
                    tower_http::classify::SharedClassifier<
                        tower_http::classify::ServerErrorsAsFailures,
                    >,
                >,
                tower::layer::util::Stack<
                    SetRequestIdLayer<MakeRequestUuid>,
                    tower::layer::util::Identity,
                >,
            >,
        >,
    >,
>;

/// Builds the HTTP-level Tower middleware stack from the listener configuration.
///
/// **Middleware ordering (outermost to innermost):**
/// 1. `SetRequestId` -- assigns a UUID v4 `X-Request-Id` to every incoming request
/// 2. `Tracing` -- logs request/response with structured trace spans
/// 3. `RequestBodyLimit` -- rejects bodies over `max_body_bytes` with 413
/// 4. `Timeout` -- answers 408 when handling exceeds `request_timeout`
/// 5. `PropagateRequestId` -- copies `X-Request-Id` from the request to the response
///
/// The body limit sits outside the timeout: the timeout needs a response body
/// with a `Default`, which the limit's wrapped body does not provide.
#[must_use]
pub fn build_http_layers(config: &HttpConfig) -> HttpLayers {
    let x_request_id = HeaderName::from_static("x-request-id");

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::header::CONTENT_LENGTH;
    use axum::http::Request;
    use axum::routing::put;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;

    fn app(config: &HttpConfig) -> Router {
        Router::new()
            .route("/echo", put(|body: String| async move { body }))
            .layer(build_http_layers(config))
    }

    fn put_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri("/echo")
            .header(CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn small_bodies_pass_and_get_a_request_id() {
        let resp = app(&HttpConfig::default())
            .oneshot(put_request(b"hello".to_vec()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let config = HttpConfig {
            max_body_bytes: 8,
            ..HttpConfig::default()
        };
        let resp = app(&config).oneshot(put_request(vec![b'x'; 64])).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
