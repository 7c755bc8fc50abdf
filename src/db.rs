//! Key store database: pool, schema migrations and a liveness ping.
//!
//! Reservations, rooms and guests are owned by the property management side
//! and only read here. Keys, key events, access events and API tokens are
//! owned by this service.

use sqlx::{Pool, Postgres};

pub type DbPool = Pool<Postgres>;

/// Open the key store pool.
///
/// `max_connections` comes from `DATABASE_MAX_CONNECTIONS`. Each lifecycle
/// write holds one connection for the length of its row lock, so this is
/// also the ceiling on concurrent key transitions.
///
/// # Errors
///
/// Fails if the URL is malformed or the first connection cannot be made.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Apply the schema in `migrations/`.
///
/// Creates the key tables, the pass type and outcome enums, and the partial
/// unique index that allows one live key per reservation and pass type.
/// Applied versions are tracked in `_sqlx_migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Round trip to the database.
pub async fn ping(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
