//! Persisted, argon2-hashed refresh tokens with in-place rotation.
//!
//! The raw secret is an opaque random string returned to the client exactly
//! once; only its argon2 digest is stored. Exchange therefore has to
//! linear-scan the unexpired rows and run the memory-hard verifier against
//! each candidate. That O(n) cost is deliberate: a database leak reveals no
//! usable refresh tokens, and replacing the scan with a plaintext lookup
//! would undo that property.

use std::ops::DerefMut;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rocket_db_pools::sqlx::{self, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::auth::passwords::PasswordService;
use crate::auth::responses::Role;
use crate::auth::{AuthError, AuthResult};

const SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct RefreshTokenIssued {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RefreshTokenRotation {
    pub user_id: i32,
    pub role: Role,
    pub new_token: RefreshTokenIssued,
}

#[derive(Clone)]
pub struct RefreshTokenStore {
    pool: PgPool,
    hasher: Arc<PasswordService>,
}

impl RefreshTokenStore {
    pub fn new(pool: PgPool, hasher: Arc<PasswordService>) -> Self {
        Self { pool, hasher }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a fresh token row for `user_id`. Strictly additive: prior
    /// sessions for the same user stay valid.
    pub async fn issue_token_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i32,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> AuthResult<RefreshTokenIssued> {
        let secret = generate_secret();
        let token_hash = self.hasher.hash_secret(&secret)?;
        let expires_at = now + ttl;

        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .bind(now)
        .execute(tx.deref_mut())
        .await?;

        Ok(RefreshTokenIssued {
            token: secret,
            expires_at,
        })
    }

    /// Exchange a presented secret for a rotated one.
    ///
    /// Locks every unexpired row (`FOR UPDATE`) before scanning, so two
    /// concurrent presentations of the same secret serialize: the loser
    /// re-reads the already-rotated hash and fails verification. On match the
    /// row is updated in place with a new hash and extended expiry; the old
    /// secret is unusable from that point even though the row id survives.
    pub async fn rotate_token_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        presented: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> AuthResult<RefreshTokenRotation> {
        let candidates = sqlx::query(
            r#"
            SELECT rt.id, rt.user_id, rt.token_hash, u.role
            FROM refresh_tokens rt
            JOIN users u ON u.id = rt.user_id
            WHERE rt.expires_at > $1
            ORDER BY rt.updated_at DESC
            FOR UPDATE OF rt
            "#,
        )
        .bind(now)
        .fetch_all(tx.deref_mut())
        .await?;

        for row in candidates {
            let token_id: Uuid = row.try_get("id")?;
            let token_hash: String = row.try_get("token_hash")?;

            // A corrupt hash must not fail the whole exchange; skip the row
            // and keep scanning.
            let matched = match self.hasher.verify_secret(presented, &token_hash) {
                Ok(matched) => matched,
                Err(err) => {
                    log::warn!("skipping refresh token {}: {}", token_id, err);
                    false
                }
            };
            if !matched {
                continue;
            }

            let user_id: i32 = row.try_get("user_id")?;
            let role_str: String = row.try_get("role")?;

            let secret = generate_secret();
            let token_hash = self.hasher.hash_secret(&secret)?;
            let expires_at = now + ttl;

            sqlx::query(
                "UPDATE refresh_tokens SET token_hash = $1, expires_at = $2, updated_at = $3 WHERE id = $4",
            )
            .bind(token_hash)
            .bind(expires_at)
            .bind(now)
            .bind(token_id)
            .execute(tx.deref_mut())
            .await?;

            return Ok(RefreshTokenRotation {
                user_id,
                role: Role::from_str(&role_str),
                new_token: RefreshTokenIssued {
                    token: secret,
                    expires_at,
                },
            });
        }

        Err(AuthError::RefreshTokenInvalid)
    }

    /// Delete expired rows. Request handling only ever filters on
    /// `expires_at > now`, so this sweep is owned by an external scheduler
    /// and is safe to skip entirely.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
