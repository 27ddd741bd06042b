//! Units of stage work handed from the dispatch queue to workers.

use std::sync::Arc;

use bytes::Bytes;
use publish_core::{FolderContent, ItemState, ItemStatusBuilder, JobId, ReferenceId, StartJob};

/// Pipeline stage a worker serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Assembly,
    Delivery,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Assembly => write!(f, "assembly"),
            Stage::Delivery => write!(f, "delivery"),
        }
    }
}

/// Render one item.
#[derive(Debug, Clone)]
pub struct AssemblyTask {
    pub job: Arc<StartJob>,
    pub item: FolderContent,
}

impl AssemblyTask {
    pub fn job_id(&self) -> JobId {
        self.job.job_id()
    }
}

/// Output of assembling one item.
#[derive(Debug, Clone, Default)]
pub struct AssembledItem {
    pub assembly_url: Option<String>,
    pub template_id: Option<i64>,
    /// Rendered pages. The first is the item itself; any further pages are
    /// expansions delivered as child records of the item.
    pub pages: Vec<Bytes>,
}

impl AssembledItem {
    /// A single-page result.
    pub fn single(body: impl Into<Bytes>) -> Self {
        Self {
            pages: vec![body.into()],
            ..Self::default()
        }
    }

    pub fn with_assembly_url(mut self, url: impl Into<String>) -> Self {
        self.assembly_url = Some(url.into());
        self
    }

    pub fn with_template(mut self, template_id: i64) -> Self {
        self.template_id = Some(template_id);
        self
    }

    /// Append an expanded page.
    pub fn with_page(mut self, body: impl Into<Bytes>) -> Self {
        self.pages.push(body.into());
        self
    }
}

/// Write one rendered page to its destination.
#[derive(Debug, Clone)]
pub struct DeliveryTask {
    pub job: Arc<StartJob>,
    pub item: FolderContent,
    pub template_id: Option<i64>,
    pub assembly_url: Option<String>,
    /// 1-based page number.
    pub page: i32,
    /// Reference id of the item's assembly record, set for expanded pages.
    pub parent: Option<ReferenceId>,
    pub body: Bytes,
}

impl DeliveryTask {
    pub fn job_id(&self) -> JobId {
        self.job.job_id()
    }

    pub fn delivery_type(&self) -> &str {
        self.job.delivery_type()
    }
}

/// Output of a delivery.
#[derive(Debug, Clone, Default)]
pub struct DeliveredItem {
    pub location: String,
    /// Opaque data the sink needs to undo this delivery later.
    pub unpublishing_information: Vec<u8>,
}

impl DeliveredItem {
    pub fn at(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            unpublishing_information: Vec::new(),
        }
    }
}

/// A task as handed to a worker.
#[derive(Debug, Clone)]
pub enum StageTask {
    Assembly(AssemblyTask),
    Delivery(DeliveryTask),
}

impl StageTask {
    pub fn job_id(&self) -> JobId {
        match self {
            StageTask::Assembly(task) => task.job_id(),
            StageTask::Delivery(task) => task.job_id(),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            StageTask::Assembly(_) => Stage::Assembly,
            StageTask::Delivery(_) => Stage::Delivery,
        }
    }
}

/// Status builder pre-filled with everything the job and item determine.
pub(crate) fn item_status(job: &StartJob, item: FolderContent, state: ItemState) -> ItemStatusBuilder {
    publish_core::ItemStatus::builder(job.job_id(), state)
        .item(item.content_id())
        .folder(item.folder_id())
        .site(job.site_id())
        .pub_server(job.pub_server_id())
        .delivery_context(job.delivery_context())
        .delivery_type(job.delivery_type())
        .publish(job.is_publish())
}
