//! Demand-publish work units.

use serde::{Deserialize, Serialize};

use crate::{RequestId, ValidationError};

/// A (folder, content) pair naming one item to publish.
///
/// Both ids are positive; every constructor, deserialization included,
/// checks this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PairFields")]
pub struct FolderContent {
    folder_id: i64,
    content_id: i64,
}

#[derive(Deserialize)]
struct PairFields {
    folder_id: i64,
    content_id: i64,
}

impl TryFrom<PairFields> for FolderContent {
    type Error = ValidationError;

    fn try_from(fields: PairFields) -> Result<Self, Self::Error> {
        Self::try_new(fields.folder_id, fields.content_id)
    }
}

fn positive(field: &'static str, value: i64) -> Result<i64, ValidationError> {
    if value > 0 {
        Ok(value)
    } else {
        Err(ValidationError::InvalidField {
            field,
            reason: format!("must be positive, got {}", value),
        })
    }
}

impl FolderContent {
    /// Create a pair.
    ///
    /// # Panics
    ///
    /// Panics if either id is not positive. A half-formed pair is a
    /// programming error in the submitter, not a recoverable condition.
    pub fn new(folder_id: i64, content_id: i64) -> Self {
        match Self::try_new(folder_id, content_id) {
            Ok(pair) => pair,
            Err(e) => panic!("invalid folder/content pair: {e}"),
        }
    }

    /// Create a pair, reporting a non-positive id as an error.
    pub fn try_new(folder_id: i64, content_id: i64) -> Result<Self, ValidationError> {
        Ok(Self {
            folder_id: positive("folder_id", folder_id)?,
            content_id: positive("content_id", content_id)?,
        })
    }

    pub fn folder_id(&self) -> i64 {
        self.folder_id
    }

    pub fn content_id(&self) -> i64 {
        self.content_id
    }
}

/// An immutable batch of items submitted as one demand-publish request.
///
/// The request id is assigned at construction, so it stays stable when the
/// submission itself is retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit {
    request_id: RequestId,
    items: Vec<FolderContent>,
}

impl WorkUnit {
    /// Create a work unit. Empty is allowed; the pairs were checked when
    /// they were built.
    pub fn new(items: Vec<FolderContent>) -> Self {
        Self {
            request_id: RequestId::next(),
            items,
        }
    }

    /// Create a work unit from raw `(folder_id, content_id)` tuples.
    ///
    /// # Panics
    ///
    /// Panics on the first pair with a non-positive id.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (i64, i64)>) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(folder_id, content_id)| FolderContent::new(folder_id, content_id))
                .collect(),
        )
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn items(&self) -> &[FolderContent] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Consume the unit, yielding its items.
    pub fn into_items(self) -> Vec<FolderContent> {
        self.items
    }
}
