//! Per-item outcome records produced by the assembly and delivery stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, ReferenceId};

/// Errors raised when a message is built from incomplete data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Outcome carried by an item status record.
///
/// New outcomes may be added; consumers must treat members they do not know
/// as contributing to no counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ItemState {
    /// Queued for assembly.
    Queued,
    /// Assembled successfully and handed on to delivery.
    Assembled,
    /// Staged in a transactional delivery sink, awaiting commit.
    Prepared,
    /// Written to its destination.
    Delivered,
    /// Assembly or delivery failed.
    Failed,
    /// Removed from its destination by an unpublish run.
    Unpublished,
}

impl ItemState {
    /// States after which the item produces no further records.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemState::Delivered | ItemState::Failed | ItemState::Unpublished
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Queued => "queued",
            ItemState::Assembled => "assembled",
            ItemState::Prepared => "prepared",
            ItemState::Delivered => "delivered",
            ItemState::Failed => "failed",
            ItemState::Unpublished => "unpublished",
        }
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome record for one item (or one expanded page of an item).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStatus {
    reference_id: ReferenceId,
    job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub_server_id: Option<i64>,
    delivery_context: i32,
    state: ItemState,
    is_publish: bool,
    elapsed_millis: u64,
    published_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assembly_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    published_location: Option<String>,
    item_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    folder_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    template_id: Option<i64>,
    site_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    page: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_page_reference_id: Option<ReferenceId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    unpublishing_information: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unpublish_ref_id: Option<ReferenceId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    messages: Vec<String>,
    delivery_type: String,
}

impl ItemStatus {
    /// Start building a record for `job_id` with the given outcome.
    pub fn builder(job_id: JobId, state: ItemState) -> ItemStatusBuilder {
        ItemStatusBuilder::new(job_id, state)
    }

    pub fn reference_id(&self) -> ReferenceId {
        self.reference_id
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn pub_server_id(&self) -> Option<i64> {
        self.pub_server_id
    }

    pub fn delivery_context(&self) -> i32 {
        self.delivery_context
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    pub fn is_publish(&self) -> bool {
        self.is_publish
    }

    pub fn elapsed_millis(&self) -> u64 {
        self.elapsed_millis
    }

    pub fn published_date(&self) -> DateTime<Utc> {
        self.published_date
    }

    pub fn assembly_url(&self) -> Option<&str> {
        self.assembly_url.as_deref()
    }

    pub fn published_location(&self) -> Option<&str> {
        self.published_location.as_deref()
    }

    pub fn item_id(&self) -> i64 {
        self.item_id
    }

    pub fn folder_id(&self) -> Option<i64> {
        self.folder_id
    }

    pub fn template_id(&self) -> Option<i64> {
        self.template_id
    }

    pub fn site_id(&self) -> i64 {
        self.site_id
    }

    pub fn page(&self) -> Option<i32> {
        self.page
    }

    pub fn parent_page_reference_id(&self) -> Option<ReferenceId> {
        self.parent_page_reference_id
    }

    pub fn unpublishing_information(&self) -> &[u8] {
        &self.unpublishing_information
    }

    pub fn unpublish_ref_id(&self) -> Option<ReferenceId> {
        self.unpublish_ref_id
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn delivery_type(&self) -> &str {
        &self.delivery_type
    }

    /// The `(parent, page)` key for a record describing an expanded page.
    pub fn expanded_page_key(&self) -> Option<(ReferenceId, i32)> {
        Some((self.parent_page_reference_id?, self.page?))
    }

    /// The final form of a record that was prepared in a transactional sink
    /// and has now been committed.
    pub(crate) fn into_committed(mut self) -> Self {
        self.state = if self.is_publish {
            ItemState::Delivered
        } else {
            ItemState::Unpublished
        };
        self
    }
}

/// Builder for [`ItemStatus`].
///
/// `item_id`, `site_id` and a non-empty `delivery_type` are required. The
/// reference id and published date are assigned by [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct ItemStatusBuilder {
    job_id: JobId,
    state: ItemState,
    pub_server_id: Option<i64>,
    delivery_context: i32,
    is_publish: bool,
    elapsed_millis: u64,
    assembly_url: Option<String>,
    published_location: Option<String>,
    item_id: Option<i64>,
    folder_id: Option<i64>,
    template_id: Option<i64>,
    site_id: Option<i64>,
    page: Option<i32>,
    parent_page_reference_id: Option<ReferenceId>,
    unpublishing_information: Vec<u8>,
    unpublish_ref_id: Option<ReferenceId>,
    messages: Vec<String>,
    delivery_type: Option<String>,
}

impl ItemStatusBuilder {
    fn new(job_id: JobId, state: ItemState) -> Self {
        Self {
            job_id,
            state,
            pub_server_id: None,
            delivery_context: 0,
            is_publish: true,
            elapsed_millis: 0,
            assembly_url: None,
            published_location: None,
            item_id: None,
            folder_id: None,
            template_id: None,
            site_id: None,
            page: None,
            parent_page_reference_id: None,
            unpublishing_information: Vec::new(),
            unpublish_ref_id: None,
            messages: Vec::new(),
            delivery_type: None,
        }
    }

    pub fn item(mut self, item_id: i64) -> Self {
        self.item_id = Some(item_id);
        self
    }

    pub fn folder(mut self, folder_id: i64) -> Self {
        self.folder_id = Some(folder_id);
        self
    }

    pub fn template(mut self, template_id: i64) -> Self {
        self.template_id = Some(template_id);
        self
    }

    pub fn site(mut self, site_id: i64) -> Self {
        self.site_id = Some(site_id);
        self
    }

    pub fn pub_server(mut self, pub_server_id: Option<i64>) -> Self {
        self.pub_server_id = pub_server_id;
        self
    }

    pub fn delivery_context(mut self, delivery_context: i32) -> Self {
        self.delivery_context = delivery_context;
        self
    }

    pub fn delivery_type(mut self, delivery_type: impl Into<String>) -> Self {
        self.delivery_type = Some(delivery_type.into());
        self
    }

    pub fn publish(mut self, is_publish: bool) -> Self {
        self.is_publish = is_publish;
        self
    }

    pub fn elapsed_millis(mut self, elapsed_millis: u64) -> Self {
        self.elapsed_millis = elapsed_millis;
        self
    }

    pub fn assembly_url(mut self, url: impl Into<String>) -> Self {
        self.assembly_url = Some(url.into());
        self
    }

    pub fn published_location(mut self, location: impl Into<String>) -> Self {
        self.published_location = Some(location.into());
        self
    }

    pub fn page(mut self, page: i32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn parent_page(mut self, parent: ReferenceId) -> Self {
        self.parent_page_reference_id = Some(parent);
        self
    }

    pub fn unpublishing_information(mut self, info: Vec<u8>) -> Self {
        self.unpublishing_information = info;
        self
    }

    pub fn unpublish_ref(mut self, original: ReferenceId) -> Self {
        self.unpublish_ref_id = Some(original);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = String>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Validate and freeze the record, allocating its reference id.
    pub fn build(self) -> Result<ItemStatus, ValidationError> {
        let item_id = self.item_id.ok_or(ValidationError::MissingField("item_id"))?;
        if item_id <= 0 {
            return Err(ValidationError::InvalidField {
                field: "item_id",
                reason: format!("must be positive, got {item_id}"),
            });
        }
        let site_id = self.site_id.ok_or(ValidationError::MissingField("site_id"))?;
        if site_id <= 0 {
            return Err(ValidationError::InvalidField {
                field: "site_id",
                reason: format!("must be positive, got {site_id}"),
            });
        }
        let delivery_type = self
            .delivery_type
            .filter(|t| !t.trim().is_empty())
            .ok_or(ValidationError::MissingField("delivery_type"))?;
        if self.parent_page_reference_id.is_some() && self.page.is_none() {
            return Err(ValidationError::InvalidField {
                field: "page",
                reason: "a child page record must carry its page number".into(),
            });
        }

        Ok(ItemStatus {
            reference_id: ReferenceId::next(),
            job_id: self.job_id,
            pub_server_id: self.pub_server_id,
            delivery_context: self.delivery_context,
            state: self.state,
            is_publish: self.is_publish,
            elapsed_millis: self.elapsed_millis,
            published_date: Utc::now(),
            assembly_url: self.assembly_url,
            published_location: self.published_location,
            item_id,
            folder_id: self.folder_id,
            template_id: self.template_id,
            site_id,
            page: self.page,
            parent_page_reference_id: self.parent_page_reference_id,
            unpublishing_information: self.unpublishing_information,
            unpublish_ref_id: self.unpublish_ref_id,
            messages: self.messages,
            delivery_type,
        })
    }
}
