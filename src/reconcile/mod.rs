//! Reconciliation - resync presented notifications with stored selections
//! and the live contact directory
//!
//! A pass is strictly sequential:
//! 1. dismiss every presented notification
//! 2. read the contacts in use (stop if none)
//! 3. look those contacts up, descending
//! 4. render each returned contact's selections in creation order
//! 5. delete the selections of every contact the directory did not return
//!
//! The pass is the only place stale selections get pruned.

pub mod worker;

pub use worker::{spawn_worker, PassTicket, ReconcileHandle, ReconcileWorker, WorkerConfig};

use crate::contacts::{ContactDirectory, DirectoryError, SortOrder};
use crate::notify::{NotificationSink, RenderData, SinkError};
use crate::selection::{ContactId, SelectionError, SelectionStore, SlotId};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A notification that could not be presented; the pass carries on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderFailure {
    pub contact: ContactId,
    pub slot: SlotId,
    pub reason: String,
}

/// Outcome of one completed pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Slots presented, in render order
    pub rendered: Vec<SlotId>,
    /// Contacts whose selections were deleted, with how many
    pub pruned: Vec<(ContactId, usize)>,
    pub render_failures: Vec<RenderFailure>,
}

impl PassReport {
    pub fn pruned_contacts(&self) -> BTreeSet<ContactId> {
        self.pruned.iter().map(|(c, _)| *c).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.render_failures.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    DirectoryUnavailable(#[from] DirectoryError),

    #[error("Failed to clear notifications: {0}")]
    Sink(#[from] SinkError),

    #[error("Failed to prune selections: {0}")]
    Storage(#[from] SelectionError),

    #[error("Reconcile worker stopped before the pass completed")]
    WorkerGone,
}

/// Runs reconciliation passes against injected collaborators
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<SelectionStore>,
    directory: Arc<dyn ContactDirectory>,
    sink: Arc<dyn NotificationSink>,
}

impl Reconciler {
    pub fn new(
        store: Arc<SelectionStore>,
        directory: Arc<dyn ContactDirectory>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            directory,
            sink,
        }
    }

    /// Run one full pass to completion. Blocking.
    pub fn run_pass(&self) -> Result<PassReport, ReconcileError> {
        let mut report = PassReport::default();

        self.sink.dismiss_all()?;

        let mut unresolved = self.store.contacts_in_use();
        if unresolved.is_empty() {
            tracing::debug!("No selections, nothing to reconcile");
            return Ok(report);
        }

        let records = self.directory.lookup(&unresolved, SortOrder::Descending)?;

        for contact in &records {
            // skip ids we did not ask for and repeated records
            if !unresolved.remove(&contact.id) {
                continue;
            }

            for selection in self.store.selections_for_contact(contact.id) {
                let data = RenderData::new(&selection, contact);
                match self.sink.present(selection.slot, &data) {
                    Ok(()) => {
                        tracing::debug!("Rendered slot {}: {}", selection.slot, data.headline());
                        report.rendered.push(selection.slot);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Failed to render slot {} for contact {}: {}",
                            selection.slot,
                            contact.id,
                            e
                        );
                        report.render_failures.push(RenderFailure {
                            contact: contact.id,
                            slot: selection.slot,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        // Whatever the directory did not return has been deleted from it.
        // The store lock is taken per call, not held since the read above.
        // Selections made in between are neither rendered nor pruned here;
        // the pass their change triggers picks them up.
        for contact in unresolved {
            let removed = self.store.delete_selections_for_contact(contact)?;
            tracing::warn!(
                "Contact {} no longer exists, pruned {} selections",
                contact,
                removed
            );
            report.pruned.push((contact, removed));
        }

        tracing::info!(
            "Reconciled: {} rendered, {} contacts pruned, {} render failures",
            report.rendered.len(),
            report.pruned.len(),
            report.render_failures.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::{ContactRecord, MemoryDirectory, PhoneKind};
    use crate::notify::memory::SinkCall;
    use crate::notify::MemorySink;
    use crate::selection::{ActionType, SelectionTable, POOL_SIZE};

    const A: ContactId = ContactId(1);
    const B: ContactId = ContactId(2);

    fn record(id: ContactId, name: &str) -> ContactRecord {
        ContactRecord {
            id,
            person_id: id.0 * 100,
            display_name: name.to_string(),
            number: format!("555-01{:02}", id.0),
            kind: PhoneKind::Mobile,
        }
    }

    struct Fixture {
        store: Arc<SelectionStore>,
        directory: Arc<MemoryDirectory>,
        sink: Arc<MemorySink>,
        reconciler: Reconciler,
    }

    fn fixture(records: Vec<ContactRecord>) -> Fixture {
        let store = Arc::new(SelectionStore::load(SelectionTable::in_memory().unwrap()).unwrap());
        let directory = Arc::new(MemoryDirectory::new(records));
        let sink = Arc::new(MemorySink::new());
        let reconciler = Reconciler::new(store.clone(), directory.clone(), sink.clone());
        Fixture {
            store,
            directory,
            sink,
            reconciler,
        }
    }

    #[test]
    fn test_missing_contact_is_pruned() {
        let f = fixture(vec![record(A, "Ann")]);
        f.store.set_selection(A, ActionType::Call).unwrap();
        f.store.set_selection(B, ActionType::Call).unwrap();
        f.store.set_selection(B, ActionType::Text).unwrap();
        assert_eq!(f.store.selection_count(), 3);

        let report = f.reconciler.run_pass().unwrap();

        assert_eq!(report.pruned, vec![(B, 2)]);
        assert_eq!(report.rendered, vec![SlotId(0)]);
        assert_eq!(f.store.contacts_in_use(), BTreeSet::from([A]));
        assert!(!f.store.is_selected(B));
        assert_eq!(f.store.set_selection(ContactId(3), ActionType::Call).unwrap(), SlotId(1));
        assert_eq!(f.store.set_selection(ContactId(3), ActionType::Text).unwrap(), SlotId(2));
        assert_eq!(f.sink.presented().len(), 1);
    }

    #[test]
    fn test_pass_is_idempotent() {
        let f = fixture(vec![record(A, "Ann"), record(B, "Bea")]);
        f.store.set_selection(A, ActionType::Call).unwrap();
        f.store.set_selection(B, ActionType::Text).unwrap();

        let first = f.reconciler.run_pass().unwrap();
        let presented = f.sink.presented();
        let selections = f.store.snapshot();

        let second = f.reconciler.run_pass().unwrap();
        assert_eq!(first, second);
        assert_eq!(f.sink.presented(), presented);
        assert_eq!(f.store.snapshot(), selections);
    }

    #[test]
    fn test_directory_edits_show_on_next_pass() {
        let f = fixture(vec![record(A, "Ann")]);
        f.store.set_selection(A, ActionType::Call).unwrap();
        f.reconciler.run_pass().unwrap();

        let mut edited = record(A, "Annie");
        edited.number = "555-9999".to_string();
        f.directory.upsert(edited);
        f.reconciler.run_pass().unwrap();

        let presented = f.sink.presented();
        assert_eq!(presented.len(), 1);
        assert_eq!(presented[&SlotId(0)].display_name, "Annie");
        assert_eq!(presented[&SlotId(0)].uri, "tel:555-9999");
    }

    #[test]
    fn test_clears_before_reading_and_stops_when_empty() {
        let f = fixture(vec![record(A, "Ann")]);
        let report = f.reconciler.run_pass().unwrap();

        assert_eq!(report, PassReport::default());
        assert_eq!(f.sink.calls(), vec![SinkCall::DismissAll]);
        assert_eq!(f.directory.lookup_count(), 0);
    }

    #[test]
    fn test_render_order_puts_first_name_on_top() {
        let f = fixture(vec![
            record(A, "Cy"),
            record(B, "al"),
            record(ContactId(3), "Bo"),
        ]);
        f.store.set_selection(B, ActionType::Text).unwrap();
        f.store.set_selection(B, ActionType::Call).unwrap();
        f.store.set_selection(A, ActionType::Call).unwrap();
        f.store.set_selection(ContactId(3), ActionType::Call).unwrap();

        f.reconciler.run_pass().unwrap();

        let top_down: Vec<(String, ActionType)> = f
            .sink
            .stacked()
            .into_iter()
            .map(|n| (n.display_name, n.action))
            .collect();
        assert_eq!(
            top_down,
            vec![
                ("al".to_string(), ActionType::Call),
                ("al".to_string(), ActionType::Text),
                ("Bo".to_string(), ActionType::Call),
                ("Cy".to_string(), ActionType::Call),
            ]
        );
    }

    #[test]
    fn test_directory_failure_leaves_store_untouched() {
        let f = fixture(vec![record(A, "Ann")]);
        f.store.set_selection(A, ActionType::Call).unwrap();
        f.store.set_selection(B, ActionType::Call).unwrap();

        f.directory.set_offline(true);
        let err = f.reconciler.run_pass().unwrap_err();
        assert!(matches!(err, ReconcileError::DirectoryUnavailable(_)));
        assert!(f.sink.presented().is_empty());
        assert!(f.store.is_selected(A));
        assert!(f.store.is_selected(B));

        f.directory.set_offline(false);
        let report = f.reconciler.run_pass().unwrap();
        assert_eq!(report.pruned, vec![(B, 1)]);
        assert_eq!(f.sink.presented().len(), 1);
    }

    #[test]
    fn test_render_failure_does_not_abort_pass() {
        let f = fixture(vec![record(A, "Ann"), record(B, "Bea")]);
        f.store.set_selection(A, ActionType::Call).unwrap();
        f.store.set_selection(B, ActionType::Call).unwrap();
        f.store.set_selection(ContactId(9), ActionType::Call).unwrap();
        f.sink.fail_slot(SlotId(1));

        let report = f.reconciler.run_pass().unwrap();

        assert!(!report.is_clean());
        assert_eq!(report.render_failures.len(), 1);
        assert_eq!(report.render_failures[0].contact, B);
        assert_eq!(report.rendered, vec![SlotId(0)]);
        assert_eq!(report.pruned_contacts(), BTreeSet::from([ContactId(9)]));
        // failed render does not drop the selection
        assert!(f.store.is_selected(B));
    }

    #[test]
    fn test_clear_failure_aborts_before_store_access() {
        let f = fixture(vec![]);
        f.store.set_selection(A, ActionType::Call).unwrap();
        f.sink.fail_clear(true);

        let err = f.reconciler.run_pass().unwrap_err();
        assert!(matches!(err, ReconcileError::Sink(_)));
        assert!(f.store.is_selected(A));
        assert_eq!(f.directory.lookup_count(), 0);
    }

    #[test]
    fn test_full_pool_renders_every_slot() {
        let records: Vec<ContactRecord> = (0..POOL_SIZE as i64)
            .map(|i| record(ContactId(i), &format!("c{i:02}")))
            .collect();
        let f = fixture(records);
        for i in 0..POOL_SIZE as i64 {
            f.store.set_selection(ContactId(i), ActionType::Call).unwrap();
        }

        let report = f.reconciler.run_pass().unwrap();
        assert_eq!(report.rendered.len(), POOL_SIZE);
        assert_eq!(f.sink.presented().len(), POOL_SIZE);
    }
}
