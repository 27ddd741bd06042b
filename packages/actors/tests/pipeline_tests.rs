#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use actors::{StageHandlers, SupervisorMessage};
use publish_core::{
    ItemState, ItemStatus, JobId, JobState, PublishEvent, SortSpec, StartJob,
};
use tokio::sync::{Semaphore, broadcast};

use common::{
    DELIVERY, RecordingDelivery, SITE, TestAssembler, ask, eventually, start, start_pipeline,
    unit, wait_for,
};

async fn submit_work(
    supervisor: &actors::ActorRef<SupervisorMessage>,
    unit: publish_core::WorkUnit,
) -> Result<(), Box<dyn Error>> {
    ask(supervisor, |reply| SupervisorMessage::SubmitWork { unit, reply }).await??;
    Ok(())
}

async fn start_job(
    supervisor: &actors::ActorRef<SupervisorMessage>,
    start: StartJob,
) -> Result<(), Box<dyn Error>> {
    ask(supervisor, |reply| SupervisorMessage::StartJob {
        start: Box::new(start),
        reply,
    })
    .await??;
    Ok(())
}

async fn end_job(
    supervisor: &actors::ActorRef<SupervisorMessage>,
    job_id: i64,
) -> Result<(), Box<dyn Error>> {
    ask(supervisor, |reply| SupervisorMessage::EndJob {
        job_id: JobId(job_id),
        reply,
    })
    .await??;
    Ok(())
}

async fn cancel_job(
    supervisor: &actors::ActorRef<SupervisorMessage>,
    job_id: i64,
) -> Result<(), Box<dyn Error>> {
    ask(supervisor, |reply| SupervisorMessage::CancelJob {
        job_id: JobId(job_id),
        reply,
    })
    .await??;
    Ok(())
}

#[tokio::test]
async fn test_job_runs_to_commit() -> Result<(), Box<dyn Error>> {
    let delivery = RecordingDelivery::new(DELIVERY);
    let handlers = StageHandlers::new()
        .with_assembler(TestAssembler::default())
        .with_delivery(delivery.clone());
    let (supervisor, store) = start_pipeline(handlers).await?;

    let work = unit(3);
    let request_id = work.request_id();
    submit_work(&supervisor, work).await?;
    start_job(&supervisor, start(1001).with_work(request_id)).await?;

    let running = wait_for(&supervisor, 1001, |s| s.delivered == 3).await?;
    assert_eq!(running.total_items, 3);
    assert_eq!(running.queued_for_assembly, 3);
    assert_eq!(running.state, JobState::Active);

    end_job(&supervisor, 1001).await?;
    let status = wait_for(&supervisor, 1001, |s| s.state == JobState::Committed).await?;
    assert_eq!(status.delivered, 3);
    assert_eq!(status.failed, 0);
    assert_eq!(status.assembled, 3);
    assert!(status.is_balanced());
    assert_eq!(delivery.delivered_count(), 3);

    // Only final outcomes are written to the log.
    eventually(|| store.item_count() == 3).await?;
    let ids = ask(&supervisor, |reply| SupervisorMessage::FindReferenceIds {
        job_id: JobId(1001),
        sort: SortSpec::default(),
        reply,
    })
    .await??;
    let records = ask(&supervisor, |reply| SupervisorMessage::GetItemStatus {
        reference_ids: ids,
        reply,
    })
    .await??;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.state() == ItemState::Delivered));
    assert!(records.iter().all(|r| r.published_location().is_some()));

    supervisor.send_message(SupervisorMessage::Shutdown)?;
    Ok(())
}

#[tokio::test]
async fn test_cancel_discards_in_flight_work() -> Result<(), Box<dyn Error>> {
    let gate = Arc::new(Semaphore::new(0));
    let assembler = TestAssembler::default().gated(gate.clone());
    let calls = assembler.calls.clone();
    let delivery = RecordingDelivery::new(DELIVERY);
    let handlers = StageHandlers::new()
        .with_assembler(assembler)
        .with_delivery(delivery.clone());
    let (supervisor, _store) = start_pipeline(handlers).await?;

    let work = unit(2);
    let request_id = work.request_id();
    submit_work(&supervisor, work).await?;
    start_job(&supervisor, start(1002).with_work(request_id)).await?;
    wait_for(&supervisor, 1002, |s| s.queued_for_assembly == 2).await?;
    // Both items are stuck inside the assembler.
    eventually(|| calls.load(Ordering::SeqCst) == 2).await?;

    cancel_job(&supervisor, 1002).await?;
    wait_for(&supervisor, 1002, |s| s.state == JobState::Cancelled).await?;

    // Let the stalled assemblies finish; their results must not count.
    gate.add_permits(2);
    let status = wait_for(&supervisor, 1002, |s| s.discarded == 2).await?;
    assert_eq!(status.assembled, 0);

    end_job(&supervisor, 1002).await?;
    let status = wait_for(&supervisor, 1002, |s| s.state == JobState::Cancelled).await?;
    assert_eq!(status.delivered, 0);
    assert_eq!(delivery.delivered_count(), 0);

    supervisor.send_message(SupervisorMessage::Shutdown)?;
    Ok(())
}

#[tokio::test]
async fn test_transactional_sink_commits_on_end() -> Result<(), Box<dyn Error>> {
    let delivery = RecordingDelivery::new(DELIVERY).transactional();
    let handlers = StageHandlers::new()
        .with_assembler(TestAssembler::default())
        .with_delivery(delivery.clone());
    let (supervisor, store) = start_pipeline(handlers).await?;

    let work = unit(2);
    let request_id = work.request_id();
    submit_work(&supervisor, work).await?;
    start_job(&supervisor, start(1003).with_work(request_id)).await?;

    let prepared = wait_for(&supervisor, 1003, |s| s.prepared_for_delivery == 2).await?;
    assert_eq!(prepared.delivered, 0);
    assert_eq!(store.item_count(), 0);

    end_job(&supervisor, 1003).await?;
    let status = wait_for(&supervisor, 1003, |s| s.state == JobState::Committed).await?;
    assert_eq!(status.delivered, 2);
    assert_eq!(delivery.commits.load(Ordering::SeqCst), 1);
    assert_eq!(delivery.rollbacks.load(Ordering::SeqCst), 0);

    eventually(|| store.item_count() == 2).await?;
    let ids = ask(&supervisor, |reply| SupervisorMessage::FindReferenceIds {
        job_id: JobId(1003),
        sort: SortSpec::default(),
        reply,
    })
    .await??;
    let records = ask(&supervisor, |reply| SupervisorMessage::GetItemStatus {
        reference_ids: ids,
        reply,
    })
    .await??;
    assert!(records.iter().all(|r| r.state() == ItemState::Delivered));

    supervisor.send_message(SupervisorMessage::Shutdown)?;
    Ok(())
}

#[tokio::test]
async fn test_cancel_rolls_back_prepared_results() -> Result<(), Box<dyn Error>> {
    let delivery = RecordingDelivery::new(DELIVERY).transactional();
    let handlers = StageHandlers::new()
        .with_assembler(TestAssembler::default())
        .with_delivery(delivery.clone());
    let (supervisor, store) = start_pipeline(handlers).await?;

    let work = unit(2);
    let request_id = work.request_id();
    submit_work(&supervisor, work).await?;
    start_job(&supervisor, start(1004).with_work(request_id)).await?;
    wait_for(&supervisor, 1004, |s| s.prepared_for_delivery == 2).await?;

    cancel_job(&supervisor, 1004).await?;
    cancel_job(&supervisor, 1004).await?;
    let status = wait_for(&supervisor, 1004, |s| s.state == JobState::Cancelled).await?;
    assert_eq!(status.delivered, 0);
    eventually(|| delivery.rollbacks.load(Ordering::SeqCst) == 1).await?;

    end_job(&supervisor, 1004).await?;
    let status = wait_for(&supervisor, 1004, |s| s.state == JobState::Cancelled).await?;
    assert_eq!(status.delivered, 0);
    assert_eq!(delivery.commits.load(Ordering::SeqCst), 0);
    assert_eq!(delivery.rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(store.item_count(), 0);

    supervisor.send_message(SupervisorMessage::Shutdown)?;
    Ok(())
}

#[tokio::test]
async fn test_cancel_during_commit_rolls_back() -> Result<(), Box<dyn Error>> {
    let delivery = RecordingDelivery::new(DELIVERY)
        .transactional()
        .slow_commit(Duration::from_millis(1500));
    let handlers = StageHandlers::new()
        .with_assembler(TestAssembler::default())
        .with_delivery(delivery.clone());
    let (supervisor, store) = start_pipeline(handlers).await?;

    let work = unit(2);
    let request_id = work.request_id();
    submit_work(&supervisor, work).await?;
    start_job(&supervisor, start(2001).with_work(request_id)).await?;
    wait_for(&supervisor, 2001, |s| s.prepared_for_delivery == 2).await?;

    end_job(&supervisor, 2001).await?;
    wait_for(&supervisor, 2001, |s| s.state == JobState::Committing).await?;
    eventually(|| delivery.commits.load(Ordering::SeqCst) == 1).await?;

    // The queue keeps dispatching while the sink commits.
    let asked = Instant::now();
    cancel_job(&supervisor, 2001).await?;
    assert!(asked.elapsed() < Duration::from_millis(1000));

    let status = wait_for(&supervisor, 2001, |s| s.state == JobState::Cancelled).await?;
    assert_eq!(status.delivered, 0);
    eventually(|| delivery.rollbacks.load(Ordering::SeqCst) == 1).await?;

    // The late commit result leaves the job cancelled.
    tokio::time::sleep(Duration::from_millis(1700)).await;
    let status = wait_for(&supervisor, 2001, |_| true).await?;
    assert_eq!(status.state, JobState::Cancelled);
    assert_eq!(status.delivered, 0);
    assert_eq!(store.item_count(), 0);

    supervisor.send_message(SupervisorMessage::Shutdown)?;
    Ok(())
}

#[tokio::test]
async fn test_stage_failures_are_counted() -> Result<(), Box<dyn Error>> {
    let delivery = RecordingDelivery::new(DELIVERY);
    let handlers = StageHandlers::new()
        .with_assembler(TestAssembler::default().failing(2))
        .with_delivery(delivery.clone());
    let (supervisor, store) = start_pipeline(handlers).await?;

    let work = unit(3);
    let request_id = work.request_id();
    submit_work(&supervisor, work).await?;
    start_job(&supervisor, start(1005).with_work(request_id)).await?;
    wait_for(&supervisor, 1005, |s| s.finished() == 3).await?;

    end_job(&supervisor, 1005).await?;
    let status = wait_for(&supervisor, 1005, |s| s.state == JobState::Committed).await?;
    assert_eq!(status.delivered, 2);
    assert_eq!(status.failed, 1);
    assert_eq!(status.message, None);

    eventually(|| store.item_count() == 3).await?;
    let ids = ask(&supervisor, |reply| SupervisorMessage::FindReferenceIds {
        job_id: JobId(1005),
        sort: SortSpec::default(),
        reply,
    })
    .await??;
    let records = ask(&supervisor, |reply| SupervisorMessage::GetItemStatus {
        reference_ids: ids,
        reply,
    })
    .await??;
    let failed: Vec<&ItemStatus> = records
        .iter()
        .filter(|r| r.state() == ItemState::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].item_id(), 2);
    assert_eq!(failed[0].messages(), ["template error in content 2"]);

    supervisor.send_message(SupervisorMessage::Shutdown)?;
    Ok(())
}

#[tokio::test]
async fn test_missing_delivery_handler_fails_items() -> Result<(), Box<dyn Error>> {
    let handlers = StageHandlers::new().with_assembler(TestAssembler::default());
    let (supervisor, _store) = start_pipeline(handlers).await?;

    let work = unit(2);
    let request_id = work.request_id();
    submit_work(&supervisor, work).await?;
    start_job(
        &supervisor,
        StartJob::new(1006, SITE)
            .with_delivery_type("ftp")
            .with_work(request_id),
    )
    .await?;

    let status = wait_for(&supervisor, 1006, |s| s.failed == 2).await?;
    assert_eq!(status.delivered, 0);
    assert_eq!(status.assembled, 2);

    supervisor.send_message(SupervisorMessage::Shutdown)?;
    Ok(())
}

#[tokio::test]
async fn test_expanded_pages_extend_expected_outcomes() -> Result<(), Box<dyn Error>> {
    let delivery = RecordingDelivery::new(DELIVERY);
    let handlers = StageHandlers::new()
        .with_assembler(TestAssembler::default().with_pages(1, 3))
        .with_delivery(delivery.clone());
    let (supervisor, _store) = start_pipeline(handlers).await?;

    let work = unit(1);
    let request_id = work.request_id();
    submit_work(&supervisor, work).await?;
    start_job(&supervisor, start(1007).with_work(request_id)).await?;
    wait_for(&supervisor, 1007, |s| s.delivered == 3).await?;

    end_job(&supervisor, 1007).await?;
    let status = wait_for(&supervisor, 1007, |s| s.state == JobState::Committed).await?;
    assert_eq!(status.total_items, 1);
    assert_eq!(status.expanded_pages, 2);
    assert!(status.is_balanced());

    let mut pages: Vec<i32> = delivery.delivered.lock().iter().map(|d| d.2).collect();
    pages.sort();
    assert_eq!(pages, vec![1, 2, 3]);

    supervisor.send_message(SupervisorMessage::Shutdown)?;
    Ok(())
}

#[tokio::test]
async fn test_external_stage_reports_unpublish() -> Result<(), Box<dyn Error>> {
    let (supervisor, store) = start_pipeline(StageHandlers::new()).await?;

    start_job(&supervisor, start(1008).unpublish()).await?;
    for item_id in [7, 8] {
        let status = ItemStatus::builder(JobId(1008), ItemState::Unpublished)
            .item(item_id)
            .site(SITE)
            .delivery_type(DELIVERY)
            .publish(false)
            .build()?;
        ask(&supervisor, |reply| SupervisorMessage::ReportItem {
            status: Box::new(status),
            reply,
        })
        .await??;
    }

    wait_for(&supervisor, 1008, |s| s.delivered == 2).await?;
    end_job(&supervisor, 1008).await?;
    let status = wait_for(&supervisor, 1008, |s| s.state == JobState::Committed).await?;
    assert_eq!(status.total_items, 2);
    assert!(status.is_balanced());
    eventually(|| store.item_count() == 2).await?;

    supervisor.send_message(SupervisorMessage::Shutdown)?;
    Ok(())
}

#[tokio::test]
async fn test_end_of_unknown_job_is_refused() -> Result<(), Box<dyn Error>> {
    let (supervisor, _store) = start_pipeline(StageHandlers::new()).await?;

    let result = ask(&supervisor, |reply| SupervisorMessage::EndJob {
        job_id: JobId(4040),
        reply,
    })
    .await?;
    assert_eq!(result, Err("Job not found: 4040".to_string()));

    // Cancelling an unknown job is accepted and does nothing.
    cancel_job(&supervisor, 4040).await?;
    assert_eq!(common::job_status(&supervisor, 4040).await?, None);

    supervisor.send_message(SupervisorMessage::Shutdown)?;
    Ok(())
}

#[tokio::test]
async fn test_events_are_broadcast() -> Result<(), Box<dyn Error>> {
    let handlers = StageHandlers::new()
        .with_assembler(TestAssembler::default())
        .with_delivery(RecordingDelivery::new(DELIVERY));
    let (supervisor, _store) = start_pipeline(handlers).await?;

    let (tx, mut rx) = broadcast::channel(256);
    supervisor.send_message(SupervisorMessage::Subscribe { sender: tx })?;

    let work = unit(1);
    let request_id = work.request_id();
    submit_work(&supervisor, work).await?;
    start_job(&supervisor, start(1009).with_work(request_id)).await?;
    wait_for(&supervisor, 1009, |s| s.delivered == 1).await?;
    end_job(&supervisor, 1009).await?;
    wait_for(&supervisor, 1009, |s| s.state == JobState::Committed).await?;

    let mut committed = None;
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while committed.is_none() && tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(std::time::Duration::from_millis(100), rx.recv()).await {
            Ok(Ok(PublishEvent::JobCommitted {
                job_id, delivered, ..
            })) => committed = Some((job_id, delivered)),
            Ok(Ok(_)) | Err(_) => {}
            Ok(Err(e)) => return Err(e.into()),
        }
    }
    assert_eq!(committed, Some((JobId(1009), 1)));

    supervisor.send_message(SupervisorMessage::Shutdown)?;
    Ok(())
}
