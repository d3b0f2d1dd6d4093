//! In-process sink that keeps the presented tray and a call log

use super::{NotificationSink, RenderData, SinkError};
use crate::selection::SlotId;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Present(SlotId),
    Dismiss(SlotId),
    DismissAll,
}

#[derive(Default)]
struct SinkState {
    tray: BTreeMap<SlotId, RenderData>,
    /// Slot ids in presentation order, most recent last
    stack: Vec<SlotId>,
    calls: Vec<SinkCall>,
    failing: HashSet<SlotId>,
    fail_clear: bool,
}

#[derive(Default)]
pub struct MemorySink {
    state: Mutex<SinkState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `present` fail for `slot`
    pub fn fail_slot(&self, slot: SlotId) {
        if let Ok(mut state) = self.state.lock() {
            state.failing.insert(slot);
        }
    }

    /// Make `dismiss_all` fail
    pub fn fail_clear(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_clear = fail;
        }
    }

    /// Currently presented notifications by slot
    pub fn presented(&self) -> BTreeMap<SlotId, RenderData> {
        self.state
            .lock()
            .map(|s| s.tray.clone())
            .unwrap_or_default()
    }

    /// Presented notifications top to bottom (newest first)
    pub fn stacked(&self) -> Vec<RenderData> {
        self.state
            .lock()
            .map(|s| {
                s.stack
                    .iter()
                    .rev()
                    .filter_map(|slot| s.tray.get(slot).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.state
            .lock()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut SinkState) -> Result<T, SinkError>,
    ) -> Result<T, SinkError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| SinkError::Rejected {
                slot: SlotId(0),
                reason: e.to_string(),
            })?;
        f(&mut state)
    }
}

impl NotificationSink for MemorySink {
    fn present(&self, slot: SlotId, data: &RenderData) -> Result<(), SinkError> {
        self.with_state(|state| {
            state.calls.push(SinkCall::Present(slot));
            if state.failing.contains(&slot) {
                return Err(SinkError::Rejected {
                    slot,
                    reason: "configured to fail".to_string(),
                });
            }
            state.stack.retain(|s| *s != slot);
            state.stack.push(slot);
            state.tray.insert(slot, data.clone());
            Ok(())
        })
    }

    fn dismiss(&self, slot: SlotId) -> Result<(), SinkError> {
        self.with_state(|state| {
            state.calls.push(SinkCall::Dismiss(slot));
            state.stack.retain(|s| *s != slot);
            state.tray.remove(&slot);
            Ok(())
        })
    }

    fn dismiss_all(&self) -> Result<(), SinkError> {
        self.with_state(|state| {
            state.calls.push(SinkCall::DismissAll);
            if state.fail_clear {
                return Err(SinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "clear failed",
                )));
            }
            state.stack.clear();
            state.tray.clear();
            Ok(())
        })
    }
}
