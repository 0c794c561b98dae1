//! HTTP handlers for the auth protocol: signup, OTP verification, login,
//! and refresh-token exchange, plus two small authenticated endpoints that
//! exercise the request guards.

use std::sync::LazyLock;

use chrono::{Duration, Utc};
use regex::Regex;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_db_pools::sqlx::{self, Row};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;

use crate::auth::guards::{AuthUser, RequireAdmin};
use crate::auth::responses::{
    LoginRequest, LoginResponse, MeResponse, RefreshRequest, RefreshResponse, Role,
    SigningKeyMetadata, SignupRequest, SignupResponse, UserSummary, VerifyOtpRequest,
    VerifyOtpResponse,
};
use crate::auth::{AuthError, AuthState};

const MIN_PASSWORD_LEN: usize = 8;
const UNIQUE_VIOLATION: &str = "23505";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Basic local@domain.tld shape; full RFC validation is not the goal.
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex compiles")
});

type AuthRouteResult<T> = Result<Json<T>, status::Custom<Json<AuthErrorResponse>>>;

/// JSON error body shared by every auth endpoint. `reason` is the stable
/// machine-readable code; `message` is for humans.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, JsonSchema)]
pub struct AuthErrorResponse {
    pub status: u16,
    pub reason: String,
    pub message: String,
}

impl AuthErrorResponse {
    pub(crate) fn from_auth_error(err: &AuthError) -> Self {
        let status = err.status();
        Self {
            status: status.code,
            reason: err.reason().to_string(),
            message: err.to_string(),
        }
    }
}

/// Register a new account and issue a signup OTP.
///
/// The account starts unverified with the default `user` role. The OTP is
/// handed to the delivery collaborator and, only when
/// `expose_otp_in_response` is set, echoed in the body.
#[openapi(tag = "Auth")]
#[post("/auth/signup", data = "<payload>")]
pub async fn signup(
    state: &State<AuthState>,
    pool: &State<sqlx::PgPool>,
    payload: Json<SignupRequest>,
) -> AuthRouteResult<SignupResponse> {
    let (email, password) = match (&payload.email, &payload.password) {
        (Some(email), Some(password)) => (email.trim().to_string(), password.as_str()),
        _ => return Err(validation("Email and password are required")),
    };

    if !EMAIL_RE.is_match(&email) {
        return Err(validation("Invalid email address"));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(validation("Password must be at least 8 characters"));
    }

    let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = $1")
        .bind(&email)
        .fetch_one(pool.inner())
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    if exists > 0 {
        return Err(respond_error(AuthError::EmailExists));
    }

    let password_hash = state
        .password_service
        .hash_secret(password)
        .map_err(respond_error)?;

    let insert = sqlx::query(
        "INSERT INTO users (email, password_hash, role, is_verified) VALUES ($1, $2, $3, FALSE)",
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(Role::User.as_str())
    .execute(pool.inner())
    .await;

    if let Err(err) = insert {
        // Two concurrent signups can both pass the existence check; the
        // unique constraint on email is the real safety net.
        if is_unique_violation(&err) {
            return Err(respond_error(AuthError::EmailExists));
        }
        return Err(respond_error(AuthError::from(err)));
    }

    let now = Utc::now();
    let code = state.otp_registry.issue(&email, now);
    state.otp_delivery.deliver(&email, &code);

    let otp = state.config.expose_otp_in_response.then_some(code);

    Ok(Json(SignupResponse {
        otp_sent: true,
        otp,
    }))
}

/// Confirm control of the signup email with the one-time code.
///
/// Success flips `is_verified` and consumes the code; no tokens are issued
/// here, verification only unlocks login.
#[openapi(tag = "Auth")]
#[post("/auth/verify-otp", data = "<payload>")]
pub async fn verify_otp(
    state: &State<AuthState>,
    pool: &State<sqlx::PgPool>,
    payload: Json<VerifyOtpRequest>,
) -> AuthRouteResult<VerifyOtpResponse> {
    let (email, otp) = match (&payload.email, &payload.otp) {
        (Some(email), Some(otp)) => (email.trim(), otp.trim()),
        _ => return Err(validation("Email and OTP are required")),
    };

    let now = Utc::now();
    state
        .otp_registry
        .verify(email, otp, now)
        .map_err(respond_error)?;

    sqlx::query("UPDATE users SET is_verified = TRUE WHERE email = $1")
        .bind(email)
        .execute(pool.inner())
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    Ok(Json(VerifyOtpResponse { verified: true }))
}

/// Exchange email + password for an access/refresh token pair.
///
/// Unknown email and wrong password share one generic rejection so account
/// existence does not leak; only the unverified case gets a distinct reason,
/// letting clients route back to the verification flow.
#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<payload>")]
pub async fn login(
    state: &State<AuthState>,
    pool: &State<sqlx::PgPool>,
    payload: Json<LoginRequest>,
) -> AuthRouteResult<LoginResponse> {
    let (email, password) = match (&payload.email, &payload.password) {
        (Some(email), Some(password)) => (email.trim(), password.as_str()),
        _ => return Err(validation("Email and password are required")),
    };

    let row = sqlx::query(
        "SELECT id, email, password_hash, role, is_verified FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool.inner())
    .await
    .map_err(|err| respond_error(AuthError::from(err)))?;

    let row = match row {
        Some(row) => row,
        None => return Err(respond_error(AuthError::InvalidCredentials)),
    };

    let user_id: i32 = row.try_get("id").map_err(internal)?;
    let db_email: String = row.try_get("email").map_err(internal)?;
    let password_hash: String = row.try_get("password_hash").map_err(internal)?;
    let role_str: String = row.try_get("role").map_err(internal)?;
    let is_verified: bool = row.try_get("is_verified").map_err(internal)?;

    if !is_verified {
        return Err(respond_error(AuthError::EmailNotVerified));
    }

    // Verifier errors count as a non-match rather than a 500.
    let verified = match state.password_service.verify_secret(password, &password_hash) {
        Ok(verified) => verified,
        Err(err) => {
            log::warn!("password verification failed for user {}: {}", user_id, err);
            false
        }
    };
    if !verified {
        return Err(respond_error(AuthError::InvalidCredentials));
    }

    let role = Role::from_str(&role_str);
    let access_token = state
        .jwt_service
        .issue_access_token(user_id, role)
        .map_err(respond_error)?;

    let now = Utc::now();
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    let refresh_token = state
        .refresh_store
        .issue_token_tx(
            &mut tx,
            user_id,
            now,
            Duration::seconds(state.config.refresh_token_ttl_secs),
        )
        .await
        .map_err(respond_error)?;

    tx.commit()
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    Ok(Json(LoginResponse {
        access_token: access_token.token,
        refresh_token: refresh_token.token,
        user: UserSummary {
            id: user_id,
            email: db_email,
            role,
        },
    }))
}

/// Rotate a refresh token, returning a new access/refresh pair. The
/// presented secret is dead after this call whether it matched or not.
#[openapi(tag = "Auth")]
#[post("/auth/refresh", data = "<payload>")]
pub async fn refresh(
    state: &State<AuthState>,
    pool: &State<sqlx::PgPool>,
    payload: Json<RefreshRequest>,
) -> AuthRouteResult<RefreshResponse> {
    let presented = match &payload.refresh_token {
        Some(token) if !token.trim().is_empty() => token.trim(),
        _ => return Err(validation("Refresh token is required")),
    };

    let now = Utc::now();
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    let rotation = state
        .refresh_store
        .rotate_token_tx(
            &mut tx,
            presented,
            now,
            Duration::seconds(state.config.refresh_token_ttl_secs),
        )
        .await
        .map_err(respond_error)?;

    let access_token = state
        .jwt_service
        .issue_access_token(rotation.user_id, rotation.role)
        .map_err(respond_error)?;

    tx.commit()
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    Ok(Json(RefreshResponse {
        access_token: access_token.token,
        refresh_token: rotation.new_token.token,
    }))
}

/// Echo the authenticated identity. Doubles as the smoke test for the
/// bearer-token gate.
#[openapi(tag = "Auth")]
#[get("/auth/me")]
pub async fn me(user: AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        id: user.id,
        role: user.role,
    })
}

/// Token-signing metadata, admin-only.
#[openapi(tag = "Auth")]
#[get("/auth/keys")]
pub async fn signing_keys(
    state: &State<AuthState>,
    _admin: RequireAdmin,
) -> AuthRouteResult<SigningKeyMetadata> {
    let jwt_meta = state.jwt_service.metadata();
    Ok(Json(SigningKeyMetadata {
        algorithm: jwt_meta.algorithm,
        issuer: jwt_meta.issuer,
        audience: jwt_meta.audience,
        access_token_ttl_secs: jwt_meta.access_token_ttl_secs,
        refresh_token_ttl_secs: state.config.refresh_token_ttl_secs,
    }))
}

fn respond_error(err: AuthError) -> status::Custom<Json<AuthErrorResponse>> {
    let status = err.status();
    if status == Status::InternalServerError {
        log::error!("auth request failed: {}", err);
    }
    status::Custom(status, Json(AuthErrorResponse::from_auth_error(&err)))
}

fn validation(message: &str) -> status::Custom<Json<AuthErrorResponse>> {
    respond_error(AuthError::Validation(message.to_string()))
}

fn internal(err: sqlx::Error) -> status::Custom<Json<AuthErrorResponse>> {
    respond_error(AuthError::from(err))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_check() {
        assert!(EMAIL_RE.is_match("a@b.edu"));
        assert!(EMAIL_RE.is_match("first.last@campus.example.org"));
        assert!(!EMAIL_RE.is_match("not-an-email"));
        assert!(!EMAIL_RE.is_match("missing@tld"));
        assert!(!EMAIL_RE.is_match("spaces in@local.tld"));
        assert!(!EMAIL_RE.is_match("@no-local.tld"));
    }
}
