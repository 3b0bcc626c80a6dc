//! services/api/src/web/middleware.rs
//!
//! Identity middleware for protecting routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use classroom_core::ports::PortError;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::{AppState, CurrentUser};

/// The header an upstream gateway sets once it has authenticated the caller.
pub const USER_HEADER: &str = "x-user-id";

/// Middleware that resolves the `x-user-id` header to a user.
///
/// If valid, inserts a `CurrentUser` into request extensions for handlers to use.
/// If invalid, missing, or unknown, returns 401 Unauthorized.
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = req
        .headers()
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or(PortError::Unauthorized)?;

    let user = state.users.get_user(user_id).await.map_err(|e| match e {
        PortError::NotFound(_) => {
            debug!(%user_id, "Request for an unknown user");
            PortError::Unauthorized
        }
        other => other,
    })?;

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}
