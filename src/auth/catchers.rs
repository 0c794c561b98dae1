//! JSON catchers so guard rejections speak the same `{status, reason,
//! message}` contract as the route handlers. A rejecting guard renders its
//! error into the request-local cache; the catcher replays it. A 401 or 403
//! that arrives without a stashed body falls back to the generic rejection
//! for that status.

use rocket::serde::json::Json;
use rocket::{Request, catch};

use crate::auth::AuthError;
use crate::auth::routes::AuthErrorResponse;

/// Error body stashed by a rejecting request guard.
#[derive(Debug, Default)]
pub(crate) struct GuardRejection(pub(crate) Option<AuthErrorResponse>);

#[catch(401)]
pub fn unauthorized(request: &Request<'_>) -> Json<AuthErrorResponse> {
    stashed_or(request, AuthError::AccessTokenRequired)
}

#[catch(403)]
pub fn forbidden(request: &Request<'_>) -> Json<AuthErrorResponse> {
    stashed_or(request, AuthError::InsufficientPermissions)
}

fn stashed_or(request: &Request<'_>, fallback: AuthError) -> Json<AuthErrorResponse> {
    match request.local_cache(GuardRejection::default) {
        GuardRejection(Some(body)) => Json(body.clone()),
        GuardRejection(None) => Json(AuthErrorResponse::from_auth_error(&fallback)),
    }
}
