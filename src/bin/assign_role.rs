//! Operator CLI for the out-of-band role-assignment action: promote a
//! signed-up account from the default `user` role to student, recruiter,
//! or admin. Runs against `DATABASE_URL` directly; the API has no endpoint
//! for this.

use std::io::{self, Write};

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use placement_api::auth::Role;

#[derive(Parser, Debug)]
#[command(name = "assign_role", about = "Assign a role to a placement portal user")]
struct Args {
    /// Email address of the account, exactly as registered.
    #[arg(long)]
    email: String,

    /// Role to assign (`user`, `student`, `recruiter`, or `admin`).
    #[arg(long)]
    role: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();

    let role_input = args.role.trim().to_lowercase();
    let role = Role::from_str(&role_input);
    if role.as_str() != role_input {
        writeln!(
            io::stderr(),
            "error: unsupported role '{}'. Use 'user', 'student', 'recruiter', or 'admin'.",
            args.role
        )?;
        std::process::exit(1);
    }

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let updated = sqlx::query("UPDATE users SET role = $1 WHERE email = $2")
        .bind(role.as_str())
        .bind(&args.email)
        .execute(&pool)
        .await?
        .rows_affected();

    if updated == 0 {
        writeln!(
            io::stderr(),
            "error: no user with email '{}' (emails are case-sensitive as stored).",
            args.email
        )?;
        std::process::exit(1);
    }

    println!("Assigned role '{}' to '{}'", role.as_str(), args.email);
    Ok(())
}
