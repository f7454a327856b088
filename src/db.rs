//! Performance store connection pool.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Create the bounded Postgres pool used by the performance store and the
/// rejection audit log.
pub async fn create_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(url)
        .await
}
