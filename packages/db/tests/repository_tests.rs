#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;

use chrono::Utc;
use publish_core::{
    ItemState, JobId, JobState, JobStatus, ReferenceId, SortField, SortSpec,
};

use db::{
    DbError, PublishLogStore, SurrealLogStore,
    repositories::{ItemStatusRepository, JobStatusRepository},
};

use common::item;

#[tokio::test]
async fn test_item_status_repository() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    let record = item(10, 1, ItemState::Delivered);
    let saved = ItemStatusRepository::save(&record).await?;
    assert_eq!(saved, record);

    // saving again keeps one row
    ItemStatusRepository::save(&record).await?;
    let ids = ItemStatusRepository::find_reference_ids_for_job(JobId(10), SortSpec::default()).await?;
    assert_eq!(ids, vec![record.reference_id()]);

    // get_many skips unknown ids
    let second = item(10, 2, ItemState::Failed);
    ItemStatusRepository::save(&second).await?;
    let many = ItemStatusRepository::get_many(&[
        record.reference_id(),
        ReferenceId(-1),
        second.reference_id(),
    ])
    .await?;
    assert_eq!(many.len(), 2);
    assert!(many.contains(&record));
    assert!(ItemStatusRepository::get_many(&[]).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_reference_id_ordering() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    let records = vec![
        item(20, 3, ItemState::Delivered),
        item(20, 1, ItemState::Delivered),
        item(20, 2, ItemState::Failed),
        item(20, 1, ItemState::Failed),
    ];
    for record in &records {
        ItemStatusRepository::save(record).await?;
    }
    ItemStatusRepository::save(&item(21, 9, ItemState::Delivered)).await?;

    let by_reference =
        ItemStatusRepository::find_reference_ids_for_job(JobId(20), SortSpec::default()).await?;
    let mut expected: Vec<ReferenceId> = records.iter().map(|r| r.reference_id()).collect();
    expected.sort();
    assert_eq!(by_reference, expected);

    let by_item = ItemStatusRepository::find_reference_ids_for_job(
        JobId(20),
        SortSpec::descending(SortField::ItemId),
    )
    .await?;
    assert_eq!(
        by_item,
        vec![
            records[0].reference_id(),
            records[2].reference_id(),
            records[1].reference_id(),
            records[3].reference_id(),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_job_status_repository() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    let mut status = JobStatus::new(JobId(30), 4, Utc::now());
    status.total_items = 2;
    status.delivered = 1;
    status.failed = 1;
    status.state = JobState::Committed;
    status.end_time = Some(Utc::now());

    let saved = JobStatusRepository::save(&status).await?;
    assert_eq!(saved.job_id, JobId(30));

    // upsert replaces
    status.message = Some("rerun".to_string());
    JobStatusRepository::save(&status).await?;
    let loaded = JobStatusRepository::get(JobId(30)).await?;
    assert_eq!(loaded.message.as_deref(), Some("rerun"));
    assert_eq!(loaded.state, JobState::Committed);
    assert!(loaded.is_balanced());

    let missing = JobStatusRepository::get(JobId(31)).await;
    assert!(matches!(missing, Err(DbError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_surreal_log_store() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;
    let store = SurrealLogStore::new();

    let record = item(40, 1, ItemState::Delivered);
    store.save_item(record.clone()).await?;
    store
        .save_job(JobStatus::new(JobId(40), 1, Utc::now()))
        .await?;

    let items = store.items(vec![record.reference_id()]).await?;
    assert_eq!(items, vec![record.clone()]);

    let ids = store
        .reference_ids_for_job(JobId(40), SortSpec::default())
        .await?;
    assert_eq!(ids, vec![record.reference_id()]);

    assert!(store.job(JobId(40)).await?.is_some());
    assert!(store.job(JobId(41)).await?.is_none());

    Ok(())
}
