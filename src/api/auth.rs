//! Authentication middleware for the REST API
//!
//! Provides optional API key authentication via X-Api-Key header.
//! When ApiConfig::api_key is set, all requests must include a matching
//! X-Api-Key header or they will receive a 401 Unauthorized response.

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

/// Authentication middleware that checks for a valid API key in the X-Api-Key header
///
/// # Arguments
///
/// * `State(expected_api_key)` - The API key that must be present in the X-Api-Key header
/// * `request` - The incoming HTTP request
/// * `next` - The next middleware/handler in the chain
///
/// # Returns
///
/// Returns either:
/// - 401 Unauthorized if the API key is missing or invalid
/// - The response from the next handler if authentication succeeds
///
/// # Examples
///
/// ```no_run
/// use axum::{Router, middleware};
/// use mint_reports::api::auth::require_api_key;
///
/// let api_key = Some("secret-key-123".to_string());
/// let router: Router = Router::new()
///     .layer(middleware::from_fn_with_state(
///         api_key,
///         require_api_key
///     ));
/// ```
pub async fn require_api_key(
    State(expected_api_key): State<Option<String>>,
    request: Request,
    next: Next,
) -> Response {
    // If no API key is configured, allow all requests through
    let Some(expected_key) = expected_api_key else {
        return next.run(request).await;
    };

    // Extract the X-Api-Key header
    let api_key_header = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());

    match api_key_header {
        Some(provided_key)
            if constant_time_eq(provided_key.as_bytes(), expected_key.as_bytes()) =>
        {
            next.run(request).await
        }
        Some(_) => unauthorized_response("Invalid API key"),
        None => unauthorized_response("Missing X-Api-Key header"),
    }
}

/// Compares every byte regardless of where the first mismatch occurs
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn unauthorized_response(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(ApiError::unauthorized(message))).into_response()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, middleware, routing::get};
    use tower::ServiceExt;

    fn guarded(api_key: Option<&str>) -> Router {
        Router::new()
            .route("/reports", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                api_key.map(str::to_string),
                require_api_key,
            ))
    }

    async fn call(router: Router, header: Option<(&str, &str)>) -> (StatusCode, Option<ApiError>) {
        let mut request = Request::builder().uri("/reports");
        if let Some((name, value)) = header {
            request = request.header(name, value);
        }
        let response = router
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).ok())
    }

    #[tokio::test]
    async fn test_open_when_no_key_configured() {
        let (status, _) = call(guarded(None), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_matching_key_passes_any_header_case() {
        let (status, _) = call(guarded(Some("s3cret")), Some(("X-Api-Key", "s3cret"))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(guarded(Some("s3cret")), Some(("x-api-key", "s3cret"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_key_is_unauthorized() {
        let (status, body) = call(guarded(Some("s3cret")), None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body = body.unwrap();
        assert_eq!(body.error.code, "unauthorized");
        assert_eq!(body.error.message, "Missing X-Api-Key header");
    }

    #[tokio::test]
    async fn test_key_comparison_is_exact() {
        for wrong in ["S3CRET", "s3cret ", "s3cre", ""] {
            let (status, body) = call(guarded(Some("s3cret")), Some(("X-Api-Key", wrong))).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{wrong:?} was accepted");
            assert_eq!(body.unwrap().error.message, "Invalid API key");
        }
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
