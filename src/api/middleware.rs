//! Cross-origin policy and request ids for the game API

use crate::config::ApiConfig;
use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use uuid::Uuid;

/// Request ID header key
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Client-supplied ids longer than this are replaced
const MAX_REQUEST_ID_LEN: usize = 64;

const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(600);

/// Cross-origin policy for the game API.
///
/// Queries are GETs and bets or finalizations are JSON POSTs, so the only
/// request headers a browser needs are `content-type` and the request id.
/// An empty origin list or `*` admits every origin.
pub fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, request_id.clone()])
        .expose_headers([request_id])
        .max_age(PREFLIGHT_MAX_AGE);

    let origins = &config.allowed_origins;
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(AllowOrigin::any());
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring malformed CORS origin {:?}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Keep a client's request id if it is short printable ASCII, otherwise mint one
fn request_id_for(request: &Request) -> String {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Tag the request with an id handlers can read and echo it on the response
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request_id_for(&request);
    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Request ID wrapper for extracting in handlers
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn with_id(id: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/state");
        if let Some(id) = id {
            builder = builder.header(REQUEST_ID_HEADER, id);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_client_request_id_is_kept() {
        assert_eq!(request_id_for(&with_id(Some("trace-me"))), "trace-me");
    }

    #[test]
    fn test_missing_or_oversized_id_is_replaced() {
        let minted = request_id_for(&with_id(None));
        assert!(Uuid::parse_str(&minted).is_ok());

        let long = "x".repeat(MAX_REQUEST_ID_LEN + 1);
        let replaced = request_id_for(&with_id(Some(&long)));
        assert_ne!(replaced, long);
        assert!(Uuid::parse_str(&replaced).is_ok());

        assert!(Uuid::parse_str(&request_id_for(&with_id(Some("")))).is_ok());
    }
}
