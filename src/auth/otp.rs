//! One-time signup verification codes.
//!
//! The registry is process-local shared state behind an injectable store
//! trait: single-instance deployments use the in-memory map, multi-instance
//! deployments must plug in a shared store or OTP verification will fail
//! depending on which instance handled the signup. Entries are lost on
//! restart; that is an accepted limitation, logged at startup.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;

use crate::auth::{AuthError, AuthResult};

/// A pending verification code for one email. At most one live entry per
/// email; a new signup overwrites any prior entry.
#[derive(Debug, Clone)]
pub struct OtpEntry {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Keyed TTL store for OTP entries. Implementations must be safe for
/// concurrent per-email access.
pub trait OtpStore: Send + Sync {
    fn put(&self, email: &str, entry: OtpEntry);
    fn get(&self, email: &str) -> Option<OtpEntry>;
    fn remove(&self, email: &str);
    /// Drop every entry whose expiry has passed. Expired entries are also
    /// removed lazily on verification, so this sweep is optional.
    fn purge_expired(&self, now: DateTime<Utc>);
}

#[derive(Debug, Default)]
pub struct InMemoryOtpStore {
    entries: DashMap<String, OtpEntry>,
}

impl InMemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OtpStore for InMemoryOtpStore {
    fn put(&self, email: &str, entry: OtpEntry) {
        self.entries.insert(email.to_string(), entry);
    }

    fn get(&self, email: &str) -> Option<OtpEntry> {
        self.entries.get(email).map(|entry| entry.value().clone())
    }

    fn remove(&self, email: &str) {
        self.entries.remove(email);
    }

    fn purge_expired(&self, now: DateTime<Utc>) {
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}

/// Delivery collaborator handed every freshly issued code. Production wires
/// an email/SMS sender here; the default just logs that a code went out.
pub trait OtpDelivery: Send + Sync {
    fn deliver(&self, email: &str, code: &str);
}

/// Development fallback: acknowledges issuance without revealing the code.
pub struct LogOtpDelivery;

impl OtpDelivery for LogOtpDelivery {
    fn deliver(&self, email: &str, _code: &str) {
        log::info!("issued signup OTP for {}", email);
    }
}

/// Issue/verify protocol over an [`OtpStore`]. All time-dependent calls take
/// `now` explicitly so tests control the clock.
pub struct OtpRegistry {
    store: Box<dyn OtpStore>,
    ttl: Duration,
}

impl OtpRegistry {
    pub fn new(store: Box<dyn OtpStore>, ttl_secs: i64) -> Self {
        Self {
            store,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Draw a fresh 6-digit code for `email`, replacing any pending entry.
    pub fn issue(&self, email: &str, now: DateTime<Utc>) -> String {
        let code = rand::thread_rng().gen_range(100_000..=999_999).to_string();
        self.store.put(
            email,
            OtpEntry {
                code: code.clone(),
                expires_at: now + self.ttl,
            },
        );
        code
    }

    /// Check `code` against the pending entry for `email`.
    ///
    /// The entry is consumed on success and on detected expiry. A plain
    /// mismatch keeps the entry so the caller may retry within the window.
    pub fn verify(&self, email: &str, code: &str, now: DateTime<Utc>) -> AuthResult<()> {
        let entry = self.store.get(email).ok_or(AuthError::OtpNotFound)?;

        if now > entry.expires_at {
            self.store.remove(email);
            return Err(AuthError::OtpExpired);
        }

        if entry.code != code {
            return Err(AuthError::OtpInvalid);
        }

        self.store.remove(email);
        Ok(())
    }

    pub fn purge_expired(&self, now: DateTime<Utc>) {
        self.store.purge_expired(now);
    }
}
