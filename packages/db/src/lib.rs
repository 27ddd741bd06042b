//! SurrealDB integration for publishing job coordination.
//!
//! This crate provides database connectivity, repositories for the
//! publishing log, the [`PublishLogStore`] seam the coordinator writes
//! through, and the paged log cursor.
//!
//! The in-memory engine is always available; the `rocksdb` feature adds
//! on-disk storage for [`DbConfig::file`].

mod connection;
mod cursor;
mod schema;
mod store;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, get_db, init_db};
pub use cursor::{PageEntry, PublishLogCursor};
pub use schema::init_schema;
pub use store::{MemoryLogStore, PublishLogStore, StoreFuture, SurrealLogStore};

/// Initialize the database with the given configuration.
///
/// This should be called once at application startup.
pub async fn init(config: DbConfig) -> Result<(), DbError> {
    init_db(config).await?;
    init_schema().await?;
    Ok(())
}
