//! HTTP basic auth middleware shared by the broker API and the node agent.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::WWW_AUTHENTICATE;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use tracing::debug;

use redisbroker_core::config::Credentials;

/// Reject requests whose basic-auth credentials do not match.
///
/// Mount with `middleware::from_fn_with_state(Arc<Credentials>, require_basic_auth)`.
pub async fn require_basic_auth(
    State(expected): State<Arc<Credentials>>,
    auth: Option<TypedHeader<Authorization<Basic>>>,
    request: Request,
    next: Next,
) -> Response {
    match auth {
        Some(TypedHeader(auth))
            if auth.username() == expected.username && auth.password() == expected.password =>
        {
            next.run(request).await
        }
        _ => {
            debug!(path = %request.uri().path(), "rejecting unauthenticated request");
            (
                StatusCode::UNAUTHORIZED,
                [(WWW_AUTHENTICATE, "Basic realm=\"redis-broker\"")],
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header::AUTHORIZATION;
    use axum::routing::get;
    use axum::{middleware, Router};
    use tower::ServiceExt;

    fn router() -> Router {
        let creds = Arc::new(Credentials {
            username: "admin".to_string(),
            password: "secret".to_string(),
        });
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(creds, require_basic_auth))
    }

    fn request(auth: Option<&str>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn accepts_matching_credentials() {
        // admin:secret
        let resp = router()
            .oneshot(request(Some("Basic YWRtaW46c2VjcmV0")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rejects_missing_header() {
        let resp = router().oneshot(request(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().contains_key(WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn rejects_wrong_password() {
        // admin:wrong
        let resp = router()
            .oneshot(request(Some("Basic YWRtaW46d3Jvbmc=")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
