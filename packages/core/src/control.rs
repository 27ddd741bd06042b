//! START/END control messages that bracket a job's lifetime.

use serde::{Deserialize, Serialize};

use crate::{JobId, RequestId, ValidationError};

/// Delivery type used when a START does not name one.
pub const DEFAULT_DELIVERY_TYPE: &str = "filesystem";

/// Kind of a control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Start,
    End,
}

impl std::fmt::Display for ControlKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlKind::Start => write!(f, "start"),
            ControlKind::End => write!(f, "end"),
        }
    }
}

/// Everything a START carries.
///
/// Built with [`StartJob::new`] and the `with_*` methods; deserialization
/// applies the same site check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StartFields")]
pub struct StartJob {
    job_id: JobId,
    site_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub_server_id: Option<i64>,
    /// Opaque to the coordinator; handed through to stage handlers.
    payload: serde_json::Value,
    /// Work unit whose items make up this job.
    #[serde(skip_serializing_if = "Option::is_none")]
    work_request_id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    edition_id: Option<i64>,
    delivery_type: String,
    delivery_context: i32,
    is_publish: bool,
}

#[derive(Deserialize)]
struct StartFields {
    job_id: JobId,
    site_id: i64,
    #[serde(default)]
    pub_server_id: Option<i64>,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default)]
    work_request_id: Option<RequestId>,
    #[serde(default)]
    edition_id: Option<i64>,
    #[serde(default = "default_delivery_type")]
    delivery_type: String,
    #[serde(default)]
    delivery_context: i32,
    #[serde(default = "publish_by_default")]
    is_publish: bool,
}

fn default_delivery_type() -> String {
    DEFAULT_DELIVERY_TYPE.to_string()
}

fn publish_by_default() -> bool {
    true
}

impl TryFrom<StartFields> for StartJob {
    type Error = ValidationError;

    fn try_from(fields: StartFields) -> Result<Self, Self::Error> {
        if fields.site_id <= 0 {
            return Err(ValidationError::InvalidField {
                field: "site_id",
                reason: format!("must be positive, got {}", fields.site_id),
            });
        }
        Ok(Self {
            job_id: fields.job_id,
            site_id: fields.site_id,
            pub_server_id: fields.pub_server_id,
            payload: fields.payload,
            work_request_id: fields.work_request_id,
            edition_id: fields.edition_id,
            delivery_type: fields.delivery_type,
            delivery_context: fields.delivery_context,
            is_publish: fields.is_publish,
        })
    }
}

impl StartJob {
    /// Create a START for a publish run.
    ///
    /// # Panics
    ///
    /// Panics if `site_id` is not positive; a START without a site is a
    /// caller bug.
    pub fn new(job_id: impl Into<JobId>, site_id: i64) -> Self {
        assert!(site_id > 0, "site id must be positive, got {site_id}");
        Self {
            job_id: job_id.into(),
            site_id,
            pub_server_id: None,
            payload: serde_json::Value::Null,
            work_request_id: None,
            edition_id: None,
            delivery_type: default_delivery_type(),
            delivery_context: 0,
            is_publish: true,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn site_id(&self) -> i64 {
        self.site_id
    }

    pub fn pub_server_id(&self) -> Option<i64> {
        self.pub_server_id
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn work_request_id(&self) -> Option<RequestId> {
        self.work_request_id
    }

    pub fn edition_id(&self) -> Option<i64> {
        self.edition_id
    }

    pub fn delivery_type(&self) -> &str {
        &self.delivery_type
    }

    pub fn delivery_context(&self) -> i32 {
        self.delivery_context
    }

    pub fn is_publish(&self) -> bool {
        self.is_publish
    }

    pub fn with_pub_server(mut self, pub_server_id: i64) -> Self {
        self.pub_server_id = Some(pub_server_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Attach the work unit whose items this job publishes.
    pub fn with_work(mut self, request_id: RequestId) -> Self {
        self.work_request_id = Some(request_id);
        self
    }

    pub fn with_edition(mut self, edition_id: i64) -> Self {
        self.edition_id = Some(edition_id);
        self
    }

    pub fn with_delivery_type(mut self, delivery_type: impl Into<String>) -> Self {
        self.delivery_type = delivery_type.into();
        self
    }

    pub fn with_delivery_context(mut self, delivery_context: i32) -> Self {
        self.delivery_context = delivery_context;
        self
    }

    /// Mark this job as an unpublish run.
    pub fn unpublish(mut self) -> Self {
        self.is_publish = false;
        self
    }
}

/// A high-priority control message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobControlMessage {
    Start(StartJob),
    End {
        job_id: JobId,
        site_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub_server_id: Option<i64>,
    },
}

impl JobControlMessage {
    /// Build an END message.
    ///
    /// # Panics
    ///
    /// Panics if `site_id` is not positive.
    pub fn end(job_id: JobId, site_id: i64, pub_server_id: Option<i64>) -> Self {
        assert!(site_id > 0, "site id must be positive, got {site_id}");
        JobControlMessage::End {
            job_id,
            site_id,
            pub_server_id,
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            JobControlMessage::Start(start) => start.job_id(),
            JobControlMessage::End { job_id, .. } => *job_id,
        }
    }

    pub fn site_id(&self) -> i64 {
        match self {
            JobControlMessage::Start(start) => start.site_id(),
            JobControlMessage::End { site_id, .. } => *site_id,
        }
    }

    pub fn pub_server_id(&self) -> Option<i64> {
        match self {
            JobControlMessage::Start(start) => start.pub_server_id(),
            JobControlMessage::End { pub_server_id, .. } => *pub_server_id,
        }
    }

    pub fn kind(&self) -> ControlKind {
        match self {
            JobControlMessage::Start(_) => ControlKind::Start,
            JobControlMessage::End { .. } => ControlKind::End,
        }
    }
}

impl From<StartJob> for JobControlMessage {
    fn from(start: StartJob) -> Self {
        JobControlMessage::Start(start)
    }
}
