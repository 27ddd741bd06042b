use std::error::Error;
use std::sync::LazyLock;

use publish_core::{ItemState, ItemStatus, JobId};
use tokio::runtime::Runtime;
use tokio::sync::{Mutex, MutexGuard};

use db::DbConfig;

static TEST_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Runtime that owns the embedded database's background tasks. Each test
/// has its own runtime, which would take those tasks down when it ends.
static DB_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("database runtime")
});

pub async fn setup_db() -> Result<MutexGuard<'static, ()>, Box<dyn Error>> {
    let guard = TEST_LOCK.lock().await;
    DB_RUNTIME
        .spawn(async { db::init(DbConfig::memory()).await })
        .await??;
    let db_conn = db::get_db()?;
    db_conn
        .query("DELETE item_status; DELETE job_status;")
        .await?;
    Ok(guard)
}

pub fn item(job_id: i64, item_id: i64, state: ItemState) -> ItemStatus {
    ItemStatus::builder(JobId(job_id), state)
        .item(item_id)
        .folder(item_id % 3 + 1)
        .site(1)
        .delivery_type("filesystem")
        .published_location(format!("/site/{item_id}.html"))
        .build()
        .expect("valid item status")
}
