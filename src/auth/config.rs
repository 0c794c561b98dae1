use crate::auth::{AuthError, AuthResult};

/// Authentication configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: String,
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub otp_ttl_secs: i64,
    /// Echo the OTP back in the signup response instead of relying on the
    /// delivery collaborator. Development convenience only; defaults to off.
    pub expose_otp_in_response: bool,
    /// Interval for the expired-refresh-token sweep. `None` disables the
    /// sweep entirely, leaving cleanup to an external scheduler.
    pub token_sweep_interval_secs: Option<u64>,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let issuer =
            std::env::var("PLACEMENT_JWT_ISSUER").unwrap_or_else(|_| "http://localhost".into());
        let audience =
            std::env::var("PLACEMENT_JWT_AUDIENCE").unwrap_or_else(|_| "placement-api".into());
        let jwt_secret = std::env::var("PLACEMENT_JWT_SECRET")
            .map_err(|_| AuthError::Config("PLACEMENT_JWT_SECRET is required".into()))?;
        let access_token_ttl_secs = std::env::var("PLACEMENT_ACCESS_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(15 * 60);
        let refresh_token_ttl_secs = std::env::var("PLACEMENT_REFRESH_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(7 * 24 * 60 * 60);
        let otp_ttl_secs = std::env::var("PLACEMENT_OTP_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(5 * 60);
        let expose_otp_in_response = std::env::var("PLACEMENT_EXPOSE_OTP_IN_RESPONSE")
            .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
            .unwrap_or(false);
        let token_sweep_interval_secs = std::env::var("PLACEMENT_TOKEN_SWEEP_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0);

        Ok(Self {
            issuer,
            audience,
            jwt_secret,
            access_token_ttl_secs,
            refresh_token_ttl_secs,
            otp_ttl_secs,
            expose_otp_in_response,
            token_sweep_interval_secs,
        })
    }
}
