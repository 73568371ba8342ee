//! axum middleware over an [`AuthChain`].
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use axum::{middleware, routing::{get, post}, Router};
//! # use authwarden::integrations::axum::{limit_login_attempts, require_bearer, require_license};
//! # fn build(chain: Arc<authwarden::AuthChain>) -> Router {
//! let secure = Router::new()
//!     .route("/secure", get(|| async { "ok" }))
//!     .route_layer(middleware::from_fn_with_state(chain.clone(), require_license))
//!     .route_layer(middleware::from_fn_with_state(chain.clone(), require_bearer));
//! let login = Router::new()
//!     .route("/login", post(|| async { "ok" }))
//!     .route_layer(middleware::from_fn_with_state(chain, limit_login_attempts));
//! secure.merge(login)
//! # }
//! ```

use crate::chain::{AuthChain, RequestContext};
use crate::license::UnlockStatus;
use crate::protocol::models::Claims;
use crate::AuthwardenError;
use ::axum::body::{to_bytes, Body};
use ::axum::extract::{ConnectInfo, Request, State};
use ::axum::http::{header, HeaderValue, StatusCode};
use ::axum::middleware::Next;
use ::axum::response::{IntoResponse, Response};
use ::axum::Json;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

/// Largest login body buffered for identity extraction.
pub const MAX_LOGIN_BODY_BYTES: usize = 64 * 1024;

/// Verified claims, inserted by [`require_bearer`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Claims);

/// Login identity, inserted by [`limit_login_attempts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginIdentity(pub String);

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AuthwardenError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        let mut response = (
            status,
            Json(ErrorBody {
                error: self.error_code(),
                message,
            }),
        )
            .into_response();

        let headers = response.headers_mut();
        if let Some(secs) = self.retry_after_secs() {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        if self.is_token_failure() {
            let challenge = match self {
                AuthwardenError::HeaderMissing => "Bearer",
                _ => r#"Bearer error="invalid_token""#,
            };
            headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
        }

        response
    }
}

/// Peer address (when served with connect info) and user agent of `req`.
pub fn request_context(req: &Request) -> RequestContext {
    let source_address = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    RequestContext::new(source_address, user_agent)
}

/// Reject requests without a valid bearer token.
pub async fn require_bearer(
    State(chain): State<Arc<AuthChain>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthwardenError> {
    let ctx = request_context(&req);
    let authorization = match req.headers().get(header::AUTHORIZATION) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| AuthwardenError::HeaderMalformed)?
                .to_string(),
        ),
        None => None,
    };

    // A cold key-set cache means a blocking fetch.
    let claims = tokio::task::spawn_blocking(move || chain.authenticate(authorization.as_deref(), &ctx))
        .await
        .map_err(|e| AuthwardenError::Internal(format!("Verification task failed: {}", e)))??;

    req.extensions_mut().insert(AuthenticatedUser(claims));
    Ok(next.run(req).await)
}

/// Reject requests while the license gate is closed.
pub async fn require_license(
    State(chain): State<Arc<AuthChain>>,
    req: Request,
    next: Next,
) -> Result<Response, AuthwardenError> {
    chain.admit_licensed(&request_context(&req))?;
    Ok(next.run(req).await)
}

/// Refuse locked identities on the login route.
///
/// The body is buffered, inspected for `username`, and handed back to the
/// handler unchanged.
pub async fn limit_login_attempts(
    State(chain): State<Arc<AuthChain>>,
    req: Request,
    next: Next,
) -> Result<Response, AuthwardenError> {
    let ctx = request_context(&req);
    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_LOGIN_BODY_BYTES)
        .await
        .map_err(|_| AuthwardenError::MissingIdentity)?;

    let identity = chain.screen_login(&bytes, &ctx)?;

    let mut req = Request::from_parts(parts, Body::from(bytes));
    req.extensions_mut().insert(LoginIdentity(identity));
    Ok(next.run(req).await)
}

/// Handler reporting the license gate state.
pub async fn unlock_status(State(chain): State<Arc<AuthChain>>) -> Json<UnlockStatus> {
    Json(chain.gate().status(chain.clock().as_ref()))
}
