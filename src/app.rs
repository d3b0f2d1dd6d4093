//! App facade
//!
//! Owns the selection store and the reconcile worker and is handed to the UI
//! and startup code. Nothing here is process-global: build one `QuickDial`
//! and pass it around.

use crate::config::TomlConfig;
use crate::contacts::{ContactDirectory, ContactRecord, DirectoryError, FileDirectory, SortOrder};
use crate::notify::{FileSink, NotificationSink};
use crate::reconcile::{
    spawn_worker, PassTicket, ReconcileHandle, ReconcileWorker, Reconciler, WorkerConfig,
};
use crate::selection::{
    ActionType, ContactId, SelectionError, SelectionStore, SelectionTable, SlotId, POOL_SIZE,
};
use std::sync::Arc;

/// What the user picked for a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Call,
    Text,
    Both,
    None,
}

impl Choice {
    /// Actions in set order. Later selections render above earlier ones,
    /// so `Both` sets TEXT first to keep CALL on top.
    pub fn actions(&self) -> &'static [ActionType] {
        match self {
            Choice::Call => &[ActionType::Call],
            Choice::Text => &[ActionType::Text],
            Choice::Both => &[ActionType::Text, ActionType::Call],
            Choice::None => &[],
        }
    }
}

#[derive(Debug)]
pub enum ChoiceOutcome {
    /// Selections replaced; the pass re-rendering them was queued
    Applied { slots: Vec<SlotId>, ticket: PassTicket },
    /// `Choice::None`: the contact's notifications and selections are gone
    Cleared { removed: usize },
    /// Pool is full and the contact holds no slot to reuse
    AtCapacity,
    /// The choice needs more slots than are free
    TooMany { requested: usize, available: usize },
}

/// A contact as shown in the picker
#[derive(Debug, Clone)]
pub struct PickerEntry {
    pub record: ContactRecord,
    pub selected: bool,
}

pub struct QuickDial {
    store: Arc<SelectionStore>,
    directory: Arc<dyn ContactDirectory>,
    sink: Arc<dyn NotificationSink>,
    reconcile: ReconcileHandle,
    worker: ReconcileWorker,
}

impl QuickDial {
    /// Start the reconcile worker and queue the startup pass.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(
        store: Arc<SelectionStore>,
        directory: Arc<dyn ContactDirectory>,
        sink: Arc<dyn NotificationSink>,
        worker: WorkerConfig,
    ) -> (Self, PassTicket) {
        let reconciler = Reconciler::new(Arc::clone(&store), Arc::clone(&directory), Arc::clone(&sink));
        let (reconcile, worker) = spawn_worker(reconciler, worker);
        let startup = reconcile.reconcile_now();

        (
            Self {
                store,
                directory,
                sink,
                reconcile,
                worker,
            },
            startup,
        )
    }

    /// Wire up the file-backed collaborators named in `config`
    pub fn open(config: &TomlConfig) -> Result<(Self, PassTicket), SelectionError> {
        let table = SelectionTable::open(config.storage.database_path())?;
        let store = Arc::new(SelectionStore::load(table)?);
        let directory = Arc::new(FileDirectory::new(config.directory.contacts_path()));
        let sink = Arc::new(FileSink::new(config.tray.state_path()));

        Ok(Self::start(store, directory, sink, (&config.worker).into()))
    }

    pub fn store(&self) -> &SelectionStore {
        &self.store
    }

    /// Trigger handle for startup / restart collaborators
    pub fn reconcile_handle(&self) -> ReconcileHandle {
        self.reconcile.clone()
    }

    pub fn reconcile_now(&self) -> PassTicket {
        self.reconcile.reconcile_now()
    }

    /// Apply a picker choice for `contact`.
    ///
    /// Capacity problems come back as outcomes, not errors; the store is left
    /// unchanged in that case.
    pub fn choose(&self, contact: ContactId, choice: Choice) -> Result<ChoiceOutcome, SelectionError> {
        let actions = choice.actions();
        if actions.is_empty() {
            let removed = self.clear_contact(contact)?;
            return Ok(ChoiceOutcome::Cleared { removed });
        }

        let current = self.store.selection_count_for_contact(contact);
        if current == 0 && self.store.is_full() {
            return Ok(ChoiceOutcome::AtCapacity);
        }

        let delta = actions.len() as isize - current as isize;
        if self.store.would_exceed_capacity(delta) {
            return Ok(self.too_many(actions.len(), contact));
        }

        let previous = self.store.slots_for_contact(contact);
        let slots = match self.store.replace_selections_for_contact(contact, actions) {
            Ok(slots) => slots,
            // another caller took the last slots after our check
            Err(SelectionError::CapacityExceeded { .. }) => {
                return Ok(self.too_many(actions.len(), contact));
            }
            Err(e) => return Err(e),
        };

        self.dismiss_slots(&previous);
        let ticket = self.reconcile.reconcile_now();

        Ok(ChoiceOutcome::Applied { slots, ticket })
    }

    /// Dismiss a contact's notifications and delete its selections
    pub fn clear_contact(&self, contact: ContactId) -> Result<usize, SelectionError> {
        let slots = self.store.slots_for_contact(contact);
        self.dismiss_slots(&slots);
        self.store.delete_selections_for_contact(contact)
    }

    /// Every directory contact, ascending, flagged when it has selections
    pub fn picker(&self) -> Result<Vec<PickerEntry>, DirectoryError> {
        let records = self.directory.all(SortOrder::Ascending)?;
        Ok(records
            .into_iter()
            .map(|record| PickerEntry {
                selected: self.store.is_selected(record.id),
                record,
            })
            .collect())
    }

    /// Stop the worker and wait for it to drain.
    ///
    /// Handles given out by [`reconcile_handle`](Self::reconcile_handle) do
    /// not keep it alive; their later triggers resolve as
    /// [`ReconcileError::WorkerGone`](crate::reconcile::ReconcileError::WorkerGone).
    pub async fn shutdown(self) {
        self.worker.shutdown().await;
    }

    fn too_many(&self, requested: usize, contact: ContactId) -> ChoiceOutcome {
        let held = self.store.selection_count_for_contact(contact);
        let available = POOL_SIZE - self.store.selection_count() + held;
        ChoiceOutcome::TooMany {
            requested,
            available,
        }
    }

    fn dismiss_slots(&self, slots: &[SlotId]) {
        for slot in slots {
            if let Err(e) = self.sink.dismiss(*slot) {
                tracing::warn!("Failed to dismiss slot {}: {}", slot, e);
            }
        }
    }
}
