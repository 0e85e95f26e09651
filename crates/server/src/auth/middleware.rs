use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tracing::warn;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// The authenticated user of a request. Every query a handler runs is
/// scoped to `user_id`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: Uuid,
}

pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let bearer = match req.headers().typed_get::<Authorization<Bearer>>() {
        Some(Authorization(token)) => token.token().to_owned(),
        None => {
            return ApiError::Unauthorized("missing bearer token".into()).into_response();
        }
    };

    let identity = match state.jwt().decode_session(&bearer) {
        Ok(identity) => identity,
        Err(error) => {
            warn!(?error, "failed to decode session token");
            return ApiError::Unauthorized("invalid or expired session".into()).into_response();
        }
    };

    utils::sentry::configure_user_scope(&identity.user_id.to_string(), identity.email.as_deref());

    req.extensions_mut().insert(RequestContext {
        user_id: identity.user_id,
    });

    next.run(req).await
}
