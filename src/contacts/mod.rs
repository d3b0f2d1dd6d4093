//! Contact directory - read-only source of truth for which contacts exist
//!
//! The directory is external to this crate; implementations here are an
//! in-process one (`memory`) and a JSON file one (`file`).

pub mod file;
pub mod memory;

pub use file::FileDirectory;
pub use memory::MemoryDirectory;

use crate::selection::ContactId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Phone number kind, with the type code used for sorting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneKind {
    Custom(String),
    Home,
    Mobile,
    Work,
    FaxWork,
    FaxHome,
    Pager,
    Other,
}

impl PhoneKind {
    pub fn code(&self) -> u8 {
        match self {
            PhoneKind::Custom(_) => 0,
            PhoneKind::Home => 1,
            PhoneKind::Mobile => 2,
            PhoneKind::Work => 3,
            PhoneKind::FaxWork => 4,
            PhoneKind::FaxHome => 5,
            PhoneKind::Pager => 6,
            PhoneKind::Other => 7,
        }
    }

    /// Text shown next to the number: the standard name or the custom label
    pub fn label(&self) -> &str {
        match self {
            PhoneKind::Custom(label) => label,
            PhoneKind::Home => "Home",
            PhoneKind::Mobile => "Mobile",
            PhoneKind::Work => "Work",
            PhoneKind::FaxWork => "Work Fax",
            PhoneKind::FaxHome => "Home Fax",
            PhoneKind::Pager => "Pager",
            PhoneKind::Other => "Other",
        }
    }

    fn custom_label(&self) -> &str {
        match self {
            PhoneKind::Custom(label) => label,
            _ => "",
        }
    }
}

/// Snapshot of one directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: ContactId,
    /// Key for photo lookup
    pub person_id: i64,
    pub display_name: String,
    pub number: String,
    pub kind: PhoneKind,
}

impl ContactRecord {
    pub fn type_label(&self) -> &str {
        self.kind.label()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Contact picker order
    Ascending,
    /// Render order: the last record rendered ends up on top
    Descending,
}

/// Ascending comparison: upper-cased name, type code, upper-cased custom label
pub fn compare_records(a: &ContactRecord, b: &ContactRecord) -> Ordering {
    a.display_name
        .to_uppercase()
        .cmp(&b.display_name.to_uppercase())
        .then_with(|| a.kind.code().cmp(&b.kind.code()))
        .then_with(|| {
            a.kind
                .custom_label()
                .to_uppercase()
                .cmp(&b.kind.custom_label().to_uppercase())
        })
}

pub fn sort_records(records: &mut [ContactRecord], order: SortOrder) {
    match order {
        SortOrder::Ascending => records.sort_by(compare_records),
        SortOrder::Descending => records.sort_by(|a, b| compare_records(b, a)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Contact directory unavailable: {0}")]
    Unavailable(String),

    #[error("Contact directory I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Contact directory is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Read-only lookup of current contacts
pub trait ContactDirectory: Send + Sync {
    /// Records for `ids`, sorted by `order`. An id missing from the result
    /// no longer exists.
    fn lookup(
        &self,
        ids: &BTreeSet<ContactId>,
        order: SortOrder,
    ) -> Result<Vec<ContactRecord>, DirectoryError>;

    /// Every contact in the directory
    fn all(&self, order: SortOrder) -> Result<Vec<ContactRecord>, DirectoryError>;
}
