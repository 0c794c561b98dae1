//! Request guards gating protected routes.
//!
//! Two layers, mirroring the middleware contract the business controllers
//! consume: [`AuthUser`] authenticates the bearer token, the `Require*`
//! wrappers authorize against a fixed role allow-list. Downstream handlers
//! read `user.id`/`user.role` only after both layers pass.
//!
//! Status conventions are part of the published contract and intentionally
//! non-textbook: a missing token answers 401, an invalid or expired token
//! answers 403, and a role mismatch answers 403. Rejections stash their
//! rendered body for the catchers in [`crate::auth::catchers`], so callers
//! see the same JSON error shape the route handlers produce.

use rocket::Request;
use rocket::State;
use rocket::request::{FromRequest, Outcome};
use rocket_okapi::request::OpenApiFromRequest;

use crate::auth::catchers::GuardRejection;
use crate::auth::responses::Role;
use crate::auth::routes::AuthErrorResponse;
use crate::auth::{AuthError, AuthResult, AuthState};

/// Authenticated caller identity, decoded statelessly from the access token.
/// No database round-trip: the token carries everything the gates need.
#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct AuthUser {
    pub id: i32,
    pub role: Role,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match extract_user(request).await {
            Ok(user) => Outcome::Success(user),
            Err(err) => reject(request, err),
        }
    }
}

/// Fail the guard, leaving the rendered error body behind for the catcher.
fn reject<T>(request: &Request<'_>, err: AuthError) -> Outcome<T, AuthError> {
    request.local_cache(|| GuardRejection(Some(AuthErrorResponse::from_auth_error(&err))));
    Outcome::Error((err.status(), err))
}

async fn extract_user(request: &Request<'_>) -> AuthResult<AuthUser> {
    let token = bearer_token_from_request(request)?;

    let auth_state = request
        .guard::<&State<AuthState>>()
        .await
        .succeeded()
        .ok_or_else(|| AuthError::Config("AuthState missing from state".into()))?;

    // Signature, expiry, issuer, and audience checks all collapse into the
    // single "Invalid token" rejection; nothing about the failure leaks.
    let claims = auth_state
        .jwt_service
        .decode_access_token(token)
        .map_err(|_| AuthError::TokenInvalid)?;

    let id: i32 = claims.sub.parse().map_err(|_| AuthError::TokenInvalid)?;

    Ok(AuthUser {
        id,
        role: claims.role,
    })
}

fn bearer_token_from_request<'r>(request: &'r Request<'_>) -> AuthResult<&'r str> {
    let header = request
        .headers()
        .get_one("Authorization")
        .ok_or(AuthError::AccessTokenRequired)?;
    let mut parts = header.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default();
    if scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty() {
        Ok(token)
    } else {
        Err(AuthError::AccessTokenRequired)
    }
}

macro_rules! role_guard {
    ($(#[$doc:meta])* $name:ident, [$($allowed:path),+]) => {
        $(#[$doc])*
        #[derive(Debug, Clone, OpenApiFromRequest)]
        pub struct $name(pub AuthUser);

        #[rocket::async_trait]
        impl<'r> FromRequest<'r> for $name {
            type Error = AuthError;

            async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
                match AuthUser::from_request(request).await {
                    Outcome::Success(user) => {
                        if matches!(user.role, $($allowed)|+) {
                            Outcome::Success($name(user))
                        } else {
                            reject(request, AuthError::InsufficientPermissions)
                        }
                    }
                    Outcome::Error(err) => Outcome::Error(err),
                    Outcome::Forward(status) => Outcome::Forward(status),
                }
            }
        }
    };
}

role_guard!(
    /// Admin-only gate.
    RequireAdmin,
    [Role::Admin]
);
role_guard!(
    /// Recruiter routes; admins pass for oversight.
    RequireRecruiter,
    [Role::Recruiter, Role::Admin]
);
role_guard!(
    /// Student routes; admins pass for oversight.
    RequireStudent,
    [Role::Student, Role::Admin]
);
