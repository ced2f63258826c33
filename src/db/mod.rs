use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

pub mod catalog;
pub mod jobs;
pub mod memory;
pub mod repository;
pub mod selections;

pub use repository::{ImageRef, JobStore, ProjectCatalog, SelectionStore};

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run embedded database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Postgres-backed implementation of every storage trait.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    item_chunk_size: usize,
}

impl PgStore {
    pub fn new(pool: PgPool, item_chunk_size: usize) -> Self {
        Self {
            pool,
            item_chunk_size: item_chunk_size.max(1),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Parse a text column into a strum-backed enum.
pub(crate) fn decode_enum<T>(value: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr<Err = strum::ParseError>,
{
    value
        .parse::<T>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}
