//! Sort specifications for publishing log views.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::ItemStatus;

/// Field a log view is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    ReferenceId,
    PublishedDate,
    ItemId,
    FolderId,
    TemplateId,
    State,
    PublishedLocation,
    ElapsedMillis,
    Page,
}

impl SortField {
    /// Column name in the `item_status` table.
    pub fn column(&self) -> &'static str {
        match self {
            SortField::ReferenceId => "reference_id",
            SortField::PublishedDate => "published_date",
            SortField::ItemId => "item_id",
            SortField::FolderId => "folder_id",
            SortField::TemplateId => "template_id",
            SortField::State => "state",
            SortField::PublishedLocation => "published_location",
            SortField::ElapsedMillis => "elapsed_millis",
            SortField::Page => "page",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// A field plus direction. Ties are always broken by ascending reference id
/// so the resulting order is stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    pub fn ascending(field: SortField) -> Self {
        Self::new(field, SortDirection::Ascending)
    }

    pub fn descending(field: SortField) -> Self {
        Self::new(field, SortDirection::Descending)
    }

    /// Compare two records under this spec.
    pub fn compare(&self, a: &ItemStatus, b: &ItemStatus) -> Ordering {
        let primary = match self.field {
            SortField::ReferenceId => a.reference_id().cmp(&b.reference_id()),
            SortField::PublishedDate => a.published_date().cmp(&b.published_date()),
            SortField::ItemId => a.item_id().cmp(&b.item_id()),
            SortField::FolderId => a.folder_id().cmp(&b.folder_id()),
            SortField::TemplateId => a.template_id().cmp(&b.template_id()),
            SortField::State => a.state().as_str().cmp(b.state().as_str()),
            SortField::PublishedLocation => a.published_location().cmp(&b.published_location()),
            SortField::ElapsedMillis => a.elapsed_millis().cmp(&b.elapsed_millis()),
            SortField::Page => a.page().cmp(&b.page()),
        };
        let primary = match self.direction {
            SortDirection::Ascending => primary,
            SortDirection::Descending => primary.reverse(),
        };
        primary.then_with(|| a.reference_id().cmp(&b.reference_id()))
    }
}
