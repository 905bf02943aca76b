use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PoolError};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Builds the r2d2 pool. Checkouts wait at most `connect_timeout`, which
/// bounds every blocking query moved onto `spawn_blocking`.
pub fn create_pool(database_url: &str, connect_timeout: Duration) -> Result<DbPool, PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(10)
        .min_idle(Some(2))
        .connection_timeout(connect_timeout)
        .test_on_check_out(true)
        .build(manager)?;

    tracing::info!("database connection pool created");
    Ok(pool)
}
