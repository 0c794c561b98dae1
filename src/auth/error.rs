use rocket::http::Status;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("Email already registered")]
    EmailExists,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Email not verified")]
    EmailNotVerified,
    #[error("No OTP pending for this email")]
    OtpNotFound,
    #[error("OTP has expired")]
    OtpExpired,
    #[error("Invalid OTP")]
    OtpInvalid,
    #[error("Invalid or expired refresh token")]
    RefreshTokenInvalid,
    #[error("Access token required")]
    AccessTokenRequired,
    #[error("Invalid token")]
    TokenInvalid,
    #[error("Insufficient permissions")]
    InsufficientPermissions,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Sqlx(#[from] rocket_db_pools::sqlx::Error),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("argon2 parameter error: {0}")]
    Argon2(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
    #[error("unexpected error: {0}")]
    Other(String),
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::Validation(_)
            | AuthError::OtpNotFound
            | AuthError::OtpExpired
            | AuthError::OtpInvalid => Status::BadRequest,
            AuthError::EmailExists => Status::Conflict,
            AuthError::InvalidCredentials
            | AuthError::RefreshTokenInvalid
            | AuthError::AccessTokenRequired => Status::Unauthorized,
            // Invalid bearer tokens answer 403, not 401. Unusual, but part of
            // the published contract; clients branch on it.
            AuthError::EmailNotVerified
            | AuthError::TokenInvalid
            | AuthError::InsufficientPermissions => Status::Forbidden,
            AuthError::Config(_)
            | AuthError::Sqlx(_)
            | AuthError::Jwt(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_)
            | AuthError::Other(_) => Status::InternalServerError,
        }
    }

    /// Short machine-readable code included in every error body so clients
    /// can branch without parsing the message text.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "validation",
            AuthError::EmailExists => "email_exists",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::EmailNotVerified => "email_not_verified",
            AuthError::OtpNotFound => "otp_not_found",
            AuthError::OtpExpired => "otp_expired",
            AuthError::OtpInvalid => "otp_invalid",
            AuthError::RefreshTokenInvalid => "invalid_refresh_token",
            AuthError::AccessTokenRequired => "access_token_required",
            AuthError::TokenInvalid => "invalid_token",
            AuthError::InsufficientPermissions => "insufficient_permissions",
            AuthError::Config(_)
            | AuthError::Sqlx(_)
            | AuthError::Jwt(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_)
            | AuthError::Other(_) => "internal_error",
        }
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Argon2(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}
