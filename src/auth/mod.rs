//! Authentication core: configuration, credential hashing, OTP registry,
//! token minting, refresh rotation, Rocket request guards, and the HTTP
//! route handlers. Everything else in the portal consumes this module
//! through the guard pair in [`guards`] and trusts `user.id`/`user.role`
//! once both gates pass.

use std::sync::Arc;

pub mod catchers;
pub mod config;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod otp;
pub mod passwords;
pub mod refresh_store;
pub mod responses;
pub mod routes;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use guards::{AuthUser, RequireAdmin, RequireRecruiter, RequireStudent};
pub use jwt::JwtService;
pub use otp::{InMemoryOtpStore, LogOtpDelivery, OtpDelivery, OtpRegistry, OtpStore};
pub use passwords::PasswordService;
pub use refresh_store::RefreshTokenStore;
pub use responses::Role;

#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub password_service: Arc<PasswordService>,
    pub jwt_service: Arc<JwtService>,
    pub refresh_store: RefreshTokenStore,
    pub otp_registry: Arc<OtpRegistry>,
    pub otp_delivery: Arc<dyn OtpDelivery>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        password_service: Arc<PasswordService>,
        jwt_service: JwtService,
        refresh_store: RefreshTokenStore,
        otp_registry: OtpRegistry,
        otp_delivery: Arc<dyn OtpDelivery>,
    ) -> Self {
        Self {
            config,
            password_service,
            jwt_service: Arc::new(jwt_service),
            refresh_store,
            otp_registry: Arc::new(otp_registry),
            otp_delivery,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AuthConfig {
    AuthConfig {
        issuer: "https://placement.test".into(),
        audience: "placement-api".into(),
        jwt_secret: "super-secret-test-key".into(),
        access_token_ttl_secs: 900,
        refresh_token_ttl_secs: 7 * 24 * 60 * 60,
        otp_ttl_secs: 300,
        expose_otp_in_response: true,
        token_sweep_interval_secs: None,
    }
}
