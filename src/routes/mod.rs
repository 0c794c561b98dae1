//! HTTP route handlers outside the auth core.
//!
//! Business-domain controllers (jobs, companies, applications, interviews,
//! placements, reports) plug in here as submodules; each one gates its
//! handlers with the guard pair from `crate::auth::guards` before touching
//! any data. Handlers carry `#[openapi]` so `rocket_okapi` can derive the
//! OpenAPI document automatically.

pub mod health;
