//! Process-wide SurrealDB handle backing the publishing log.

use std::sync::LazyLock;

use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};
use thiserror::Error;
use tokio::sync::OnceCell;

pub type Database = Surreal<Any>;

static DB: LazyLock<OnceCell<Database>> = LazyLock::new(OnceCell::new);

const NAMESPACE: &str = "publishing";
const DATABASE: &str = "log";

/// Where the publishing log lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    endpoint: String,
}

impl DbConfig {
    /// Volatile log, gone with the process.
    pub fn memory() -> Self {
        Self {
            endpoint: "mem://".to_string(),
        }
    }

    /// Log kept in a RocksDB directory. Needs the `rocksdb` feature.
    pub fn file(path: impl AsRef<str>) -> Self {
        Self {
            endpoint: format!("rocksdb://{}", path.as_ref()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Publishing log is not connected")]
    NotInitialized,
    #[error("Connection error: {0}")]
    Connection(#[from] surrealdb::Error),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Connect once. Later calls reuse the first connection and ignore `config`.
pub async fn init_db(config: DbConfig) -> Result<&'static Database, DbError> {
    DB.get_or_try_init(|| async {
        let db = connect(config.endpoint()).await?;
        db.use_ns(NAMESPACE).use_db(DATABASE).await?;
        tracing::info!("Publishing log connected at {}", config.endpoint());
        Ok(db)
    })
    .await
}

pub fn get_db() -> Result<&'static Database, DbError> {
    DB.get().ok_or(DbError::NotInitialized)
}
