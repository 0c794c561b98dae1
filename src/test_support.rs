//! Helpers for integration tests: throwaway Postgres databases and a
//! minimal Rocket builder that skips the production fairings.
//!
//! Database-backed tests read `TEST_DATABASE_URL` (a URL with rights to
//! create databases) and provision a uniquely named database per test so
//! they can run in parallel; tests skip themselves when the variable is
//! unset.

use rocket::{Build, Rocket, Route};
use rocket_db_pools::sqlx::postgres::PgPoolOptions;
use rocket_db_pools::sqlx::{self, PgPool};
use uuid::Uuid;

use crate::auth::AuthState;
use crate::migrations::MIGRATOR;

#[derive(Debug)]
pub enum TestDatabaseError {
    /// `TEST_DATABASE_URL` is not set; the test should skip.
    MissingUrl,
    Sqlx(sqlx::Error),
    Migrate(sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for TestDatabaseError {
    fn from(err: sqlx::Error) -> Self {
        TestDatabaseError::Sqlx(err)
    }
}

impl From<sqlx::migrate::MigrateError> for TestDatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        TestDatabaseError::Migrate(err)
    }
}

/// A freshly created, fully migrated database that is dropped on `close`.
pub struct TestDatabase {
    admin_url: String,
    db_name: String,
    pool: PgPool,
}

impl TestDatabase {
    pub async fn new_from_env() -> Result<Self, TestDatabaseError> {
        let admin_url =
            std::env::var("TEST_DATABASE_URL").map_err(|_| TestDatabaseError::MissingUrl)?;

        let db_name = format!("placement_test_{}", Uuid::new_v4().simple());

        let admin_pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&admin_url)
            .await?;
        sqlx::query(&format!(r#"CREATE DATABASE "{}""#, db_name))
            .execute(&admin_pool)
            .await?;
        admin_pool.close().await;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&replace_database(&admin_url, &db_name))
            .await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self {
            admin_url,
            db_name,
            pool,
        })
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }

    /// Drop the provisioned database. Call this at the end of every test;
    /// otherwise the database lingers on the server.
    pub async fn close(self) -> Result<(), TestDatabaseError> {
        self.pool.close().await;

        let admin_pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&self.admin_url)
            .await?;
        sqlx::query(&format!(r#"DROP DATABASE "{}" WITH (FORCE)"#, self.db_name))
            .execute(&admin_pool)
            .await?;
        admin_pool.close().await;

        Ok(())
    }
}

/// Swap the database name in a Postgres connection URL, keeping any query
/// string intact.
fn replace_database(url: &str, db_name: &str) -> String {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    };

    // Everything after the last '/' past the scheme's '//' is the db name.
    let authority_end = base.find("//").map(|idx| idx + 2).unwrap_or(0);
    let trimmed = match base[authority_end..].rfind('/') {
        Some(idx) => &base[..authority_end + idx],
        None => base,
    };

    match query {
        Some(query) => format!("{}/{}?{}", trimmed, db_name, query),
        None => format!("{}/{}", trimmed, db_name),
    }
}

/// Builds a Rocket instance with only the pieces a test needs: no CORS, no
/// migrations fairing, no sweep task.
pub struct TestRocketBuilder {
    rocket: Rocket<Build>,
}

impl TestRocketBuilder {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        // Same catchers production registers; guard tests assert on the
        // JSON bodies they produce.
        Self {
            rocket: rocket::build().register(
                "/",
                rocket::catchers![
                    crate::auth::catchers::unauthorized,
                    crate::auth::catchers::forbidden
                ],
            ),
        }
    }

    pub fn manage_pg_pool(mut self, pool: PgPool) -> Self {
        self.rocket = self.rocket.manage(pool);
        self
    }

    pub fn manage_auth_state(mut self, state: AuthState) -> Self {
        self.rocket = self.rocket.manage(state);
        self
    }

    /// Mount routes under the same `/api/v1` prefix production uses.
    pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
        self.rocket = self.rocket.mount("/api/v1", routes);
        self
    }

    pub fn build(self) -> Rocket<Build> {
        self.rocket
    }

    pub async fn async_client(self) -> rocket::local::asynchronous::Client {
        rocket::local::asynchronous::Client::tracked(self.rocket)
            .await
            .expect("valid rocket instance")
    }

    pub fn blocking_client(self) -> rocket::local::blocking::Client {
        rocket::local::blocking::Client::tracked(self.rocket).expect("valid rocket instance")
    }
}
