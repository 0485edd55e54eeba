//! Async database connection pool implementation.
//!
//! Uses bb8 connection pool manager with diesel_async for PostgreSQL
//! connections. All workers sharing one queue point their pools at the same
//! database; the pool re-establishes broken connections on checkout, so no
//! extra reset logic is needed around process restarts.

use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::bb8::Pool;

use crate::error::QueueError;

/// Async connection pool type alias.
///
/// bb8::Pool internally uses Arc, so Clone is cheap (just reference count
/// increment). Structures holding AsyncDbPool can derive Clone without
/// additional Arc wrapping.
pub type AsyncDbPool = Pool<AsyncPgConnection>;

/// Creates an async database connection pool.
///
/// Reads DATABASE_URL from environment variables and establishes a
/// connection pool.
///
/// # Errors
///
/// - `QueueError::Configuration` - If DATABASE_URL is not set
/// - `QueueError::ConnectionPool` - If connection pool creation fails
pub async fn establish_async_connection_pool() -> Result<AsyncDbPool, QueueError> {
    let database_url =
        std::env::var("DATABASE_URL").map_err(|e| QueueError::Configuration {
            key: "DATABASE_URL".to_string(),
            source: anyhow::Error::from(e),
        })?;
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder()
        .build(config)
        .await
        .map_err(|e| QueueError::ConnectionPool {
            source: anyhow::Error::from(e),
        })?;
    Ok(pool)
}
