//! Repository implementations for database operations.

mod item_repo;
mod job_status_repo;

pub use item_repo::ItemStatusRepository;
pub use job_status_repo::JobStatusRepository;
