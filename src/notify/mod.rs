//! Notification sink - presentation boundary for pinned quick actions
//!
//! A sink shows one ongoing, non-clearable notification per slot. Sinks that
//! stack notifications show the most recently presented one on top.

pub mod file;
pub mod memory;

pub use file::FileSink;
pub use memory::MemorySink;

use crate::contacts::ContactRecord;
use crate::selection::{ActionType, ContactId, Selection, SlotId};
use serde::{Deserialize, Serialize};

/// Everything a sink needs to draw one quick-action notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderData {
    pub slot: SlotId,
    pub action: ActionType,
    pub verb: String,
    pub contact: ContactId,
    /// Photo lookup key
    pub person_id: i64,
    pub display_name: String,
    pub type_label: String,
    pub number: String,
    /// URI launched when the notification is tapped
    pub uri: String,
    pub ongoing: bool,
}

impl RenderData {
    pub fn new(selection: &Selection, contact: &ContactRecord) -> Self {
        Self {
            slot: selection.slot,
            action: selection.action,
            verb: selection.action.verb().to_string(),
            contact: contact.id,
            person_id: contact.person_id,
            display_name: contact.display_name.clone(),
            type_label: contact.type_label().to_string(),
            number: contact.number.clone(),
            uri: format!("{}{}", selection.action.scheme(), contact.number),
            ongoing: true,
        }
    }

    /// One-line summary, e.g. `Call Ann (Mobile) 555-0100`
    pub fn headline(&self) -> String {
        format!(
            "{} {} ({}) {}",
            self.verb, self.display_name, self.type_label, self.number
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Notification sink rejected slot {slot}: {reason}")]
    Rejected { slot: SlotId, reason: String },

    #[error("Notification sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Notification sink state error: {0}")]
    State(#[from] serde_json::Error),
}

pub trait NotificationSink: Send + Sync {
    /// Show (or replace) the notification in `slot`
    fn present(&self, slot: SlotId, data: &RenderData) -> Result<(), SinkError>;

    /// Remove the notification in `slot`, if any
    fn dismiss(&self, slot: SlotId) -> Result<(), SinkError>;

    /// Remove every notification this sink shows
    fn dismiss_all(&self) -> Result<(), SinkError>;
}
