//! Selection system - bounded pool of notification slots
//! bound to (contact, action) pairs and mirrored to SQLite
//!
//! - `table` - durable rows, no business logic
//! - `store` - in-memory slot arena, allocation and pool invariants

pub mod store;
pub mod table;

pub use store::SelectionStore;
pub use table::SelectionTable;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of notification slots available system-wide
pub const POOL_SIZE: usize = 10;

/// Identifier of a contact in the external directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(pub i64);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notification identifier drawn from `[0, POOL_SIZE)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub u32);

impl SlotId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of quick action pinned to a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    Call,
    Text,
}

impl ActionType {
    /// Text stored in the `type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Call => "CALL",
            ActionType::Text => "TEXT",
        }
    }

    /// URI scheme the action is launched with
    pub fn scheme(&self) -> &'static str {
        match self {
            ActionType::Call => "tel:",
            ActionType::Text => "smsto:",
        }
    }

    /// Verb shown on the notification
    pub fn verb(&self) -> &'static str {
        match self {
            ActionType::Call => "Call",
            ActionType::Text => "Text",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CALL" => Ok(ActionType::Call),
            "TEXT" => Ok(ActionType::Text),
            other => Err(SelectionError::UnknownActionType(other.to_string())),
        }
    }
}

/// A slot bound to a (contact, action) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub slot: SlotId,
    pub contact: ContactId,
    pub action: ActionType,
}

/// Selection store error types
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("Selection storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Corrupt selection row {row_id}: {reason}")]
    CorruptRow { row_id: i64, reason: String },

    #[error("All {pool_size} notification slots are in use")]
    CapacityExceeded { pool_size: usize },

    #[error("Unknown action type: {0}")]
    UnknownActionType(String),
}

impl SelectionError {
    /// True for failures of the durable table (as opposed to contract violations)
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            SelectionError::Storage(_) | SelectionError::CorruptRow { .. }
        )
    }
}
