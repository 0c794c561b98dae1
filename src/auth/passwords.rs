//! Memory-hard hashing for user passwords and refresh-token secrets.
//!
//! Both credential kinds go through the same Argon2id instance: the cost of
//! verification is the point, so it is never cached or downgraded for the
//! refresh-token scan.

use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::RngCore;

use crate::auth::{AuthError, AuthResult};

const SALT_LEN: usize = 16;

#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    pub fn new() -> AuthResult<Self> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(19 * 1024); // 19 MiB
        builder.t_cost(2);
        builder.p_cost(1);
        let params = builder.build().map_err(AuthError::from)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        Ok(Self { argon2 })
    }

    /// Hash a secret into a PHC-format string with a fresh random salt.
    pub fn hash_secret(&self, secret: &str) -> AuthResult<String> {
        let mut salt_bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(AuthError::from)?;
        let hash = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(AuthError::from)?
            .to_string();
        Ok(hash)
    }

    /// Verify a secret against a stored PHC string. A plain mismatch is
    /// `Ok(false)`; only malformed hashes or parameter failures are errors.
    pub fn verify_secret(&self, secret: &str, encoded: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(encoded)?;
        match self.argon2.verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(AuthError::from(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_and_verifies_secrets() {
        let service = PasswordService::new().expect("password service");
        let hash = service.hash_secret("longenough1").expect("hash generation");
        assert!(
            service
                .verify_secret("longenough1", &hash)
                .expect("verify succeeds")
        );
        assert!(
            !service
                .verify_secret("wrong-password", &hash)
                .expect("verify runs")
        );
    }

    #[test]
    fn corrupt_hash_is_an_error_not_a_match() {
        let service = PasswordService::new().expect("password service");
        assert!(service.verify_secret("anything", "not-a-phc-string").is_err());
    }
}
