//! Session authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the session token from the Authorization header
//! 2. Hash it and resolve it to a user through the `sessions` table
//! 3. Inject the typed [`Principal`] into the request
//! 4. Reject unknown or expired sessions with HTTP 401
//!
//! Sessions are issued elsewhere; this crate only consumes them.

use crate::{AppState, error::AppError, models::user::Principal};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

/// Hex SHA-256 of a session token, the form stored in `sessions.token_hash`.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Session authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <token>` header from request
/// 2. Hash the `<token>` using SHA-256
/// 3. Look up an unexpired session with that hash and load its user
/// 4. If found: inject `Principal` into request, call next handler
/// 5. If not found: return 401 Unauthorized error
///
/// Role and status checks are left to the services, which know what each
/// operation requires.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::InvalidSession)?;

    let token_hash = hash_token(token);

    let principal = {
        let mut tx = state.db.begin().await?;
        let principal = tx.principal_for_session(&token_hash).await?;
        tx.commit().await?;
        principal
    }
    .ok_or(AppError::InvalidSession)?;

    // Route handlers extract this with Extension<Principal>
    request.extensions_mut().insert::<Principal>(principal);

    Ok(next.run(request).await)
}
