use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use murmur_gateway::auth::verify_token;
use murmur_types::UserId;

use crate::error::ApiError;
use crate::state::AppState;

/// The caller's identity, inserted into request extensions by `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserId);

/// Extract and validate the bearer JWT from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = verify_token(&state.jwt_secret, token).map_err(|e| {
        debug!("Rejected bearer token: {}", e);
        ApiError::Unauthorized
    })?;

    // A well-signed token for an id we cannot address is still unusable
    let user = UserId::parse(&claims.sub).map_err(|e| {
        debug!("Token subject {:?} is not a valid user id: {}", claims.sub, e);
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(AuthUser(user));
    Ok(next.run(req).await)
}
