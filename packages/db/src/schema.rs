//! Database schema definitions using SurrealQL.

use crate::{DbError, get_db};

/// Initialize the database schema.
///
/// This creates the publishing log tables and their indexes.
pub async fn init_schema() -> Result<(), DbError> {
    let db = get_db()?;

    tracing::info!("Initializing database schema...");

    // Item status records (the publishing log)
    db.query(ITEM_STATUS_SCHEMA).await?.check()?;

    // Final job aggregates
    db.query(JOB_STATUS_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Item status table schema.
///
/// Records are written by several stages with optional fields, so the table
/// is schemaless and only the columns used for lookups and ordering are
/// indexed.
const ITEM_STATUS_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS item_status SCHEMALESS;

DEFINE INDEX IF NOT EXISTS item_status_reference ON item_status FIELDS reference_id UNIQUE;
DEFINE INDEX IF NOT EXISTS item_status_job ON item_status FIELDS job_id;
DEFINE INDEX IF NOT EXISTS item_status_job_item ON item_status FIELDS job_id, item_id;
DEFINE INDEX IF NOT EXISTS item_status_published ON item_status FIELDS published_date;
"#;

/// Job status table schema.
const JOB_STATUS_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job_status SCHEMALESS;

DEFINE INDEX IF NOT EXISTS job_status_job ON job_status FIELDS job_id UNIQUE;
DEFINE INDEX IF NOT EXISTS job_status_site ON job_status FIELDS site_id;
DEFINE INDEX IF NOT EXISTS job_status_state ON job_status FIELDS state;
"#;
