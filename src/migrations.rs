//! Database migration management.
//!
//! Validates and applies SQLx migrations before the API starts serving
//! requests; startup aborts when the schema cannot be brought up to date.

use rocket_db_pools::sqlx::{PgPool, migrate::Migrator};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run pending migrations. Idempotent: already-applied migrations are
/// checksum-verified and skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    log::info!("checking database migration state");

    MIGRATOR.run(pool).await?;

    log::info!("database migrations up to date");
    Ok(())
}
