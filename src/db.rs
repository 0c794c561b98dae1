use rocket_db_pools::{Database, sqlx};

#[derive(Database)]
#[database("placement_db")]
pub struct PlacementDb(sqlx::PgPool);
