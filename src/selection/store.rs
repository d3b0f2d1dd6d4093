//! Selection store
//!
//! Authoritative in-memory view of the selection table. Every operation runs
//! under a single lock that covers both the slot arena and the SQLite
//! connection, so allocation, capacity checks and deletes are atomic.
//! Rows are written before the arena changes; a failed write leaves the
//! store exactly as it was.

use super::table::{SelectionRow, SelectionTable};
use super::{ActionType, ContactId, Selection, SelectionError, SlotId, POOL_SIZE};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Fixed-size slot arena with a per-contact index in creation order
#[derive(Debug, Clone)]
struct SlotArena {
    slots: [Option<Selection>; POOL_SIZE],
    by_contact: BTreeMap<ContactId, Vec<SlotId>>,
}

impl SlotArena {
    fn new() -> Self {
        Self {
            slots: [None; POOL_SIZE],
            by_contact: BTreeMap::new(),
        }
    }

    /// Rebuild from stored rows, rejecting anything that breaks the pool invariants
    fn from_rows(rows: Vec<SelectionRow>) -> Result<Self, SelectionError> {
        let mut arena = Self::new();

        for row in rows {
            let corrupt = |reason: String| SelectionError::CorruptRow {
                row_id: row.row_id,
                reason,
            };

            let index = usize::try_from(row.slot_id)
                .ok()
                .filter(|i| *i < POOL_SIZE)
                .ok_or_else(|| corrupt(format!("slot {} outside pool", row.slot_id)))?;
            let action: ActionType = row
                .action
                .parse()
                .map_err(|_| corrupt(format!("unknown type {:?}", row.action)))?;
            let contact = ContactId(row.contact_id);

            if arena.slots[index].is_some() {
                return Err(corrupt(format!("slot {} assigned twice", index)));
            }
            if arena.find(contact, action).is_some() {
                return Err(corrupt(format!(
                    "duplicate {} selection for contact {}",
                    action, contact
                )));
            }

            arena.insert(Selection {
                slot: SlotId(index as u32),
                contact,
                action,
            });
        }

        Ok(arena)
    }

    fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn lowest_free(&self) -> Option<SlotId> {
        self.slots
            .iter()
            .position(Option::is_none)
            .map(|i| SlotId(i as u32))
    }

    fn find(&self, contact: ContactId, action: ActionType) -> Option<SlotId> {
        self.by_contact
            .get(&contact)?
            .iter()
            .copied()
            .find(|slot| matches!(self.slots[slot.index()], Some(s) if s.action == action))
    }

    fn insert(&mut self, selection: Selection) {
        self.slots[selection.slot.index()] = Some(selection);
        self.by_contact
            .entry(selection.contact)
            .or_default()
            .push(selection.slot);
    }

    fn remove_contact(&mut self, contact: ContactId) -> Vec<Selection> {
        let slots = self.by_contact.remove(&contact).unwrap_or_default();
        slots
            .into_iter()
            .filter_map(|slot| self.slots[slot.index()].take())
            .collect()
    }

    fn slots_for(&self, contact: ContactId) -> &[SlotId] {
        self.by_contact
            .get(&contact)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn selections_for(&self, contact: ContactId) -> Vec<Selection> {
        self.slots_for(contact)
            .iter()
            .filter_map(|slot| self.slots[slot.index()])
            .collect()
    }
}

struct Inner {
    arena: SlotArena,
    table: SelectionTable,
}

pub struct SelectionStore {
    inner: Mutex<Inner>,
}

impl SelectionStore {
    /// Build the store from the table's current contents (all or nothing)
    pub fn load(table: SelectionTable) -> Result<Self, SelectionError> {
        let rows = table.load_rows()?;
        let arena = SlotArena::from_rows(rows)?;

        tracing::info!(
            "Loaded {} selections for {} contacts",
            arena.len(),
            arena.by_contact.len()
        );

        Ok(Self {
            inner: Mutex::new(Inner { arena, table }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Writes hit the table before the arena, so a panicked holder
        // cannot leave the two out of step.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `action` for `contact` to a slot.
    ///
    /// Returns the existing slot when the pair is already selected. Callers
    /// are expected to check [`would_exceed_capacity`](Self::would_exceed_capacity)
    /// first; a full pool with no existing match is
    /// [`SelectionError::CapacityExceeded`].
    pub fn set_selection(
        &self,
        contact: ContactId,
        action: ActionType,
    ) -> Result<SlotId, SelectionError> {
        let mut inner = self.lock();

        if let Some(slot) = inner.arena.find(contact, action) {
            return Ok(slot);
        }

        let slot = inner
            .arena
            .lowest_free()
            .ok_or(SelectionError::CapacityExceeded {
                pool_size: POOL_SIZE,
            })?;
        let selection = Selection {
            slot,
            contact,
            action,
        };

        inner.table.insert(&selection)?;
        inner.arena.insert(selection);

        tracing::info!("Selected {} for contact {} in slot {}", action, contact, slot);
        Ok(slot)
    }

    /// Remove every selection of `contact` and free its slots
    pub fn delete_selections_for_contact(&self, contact: ContactId) -> Result<usize, SelectionError> {
        let mut inner = self.lock();

        if inner.arena.slots_for(contact).is_empty() {
            return Ok(0);
        }

        let deleted_rows = inner.table.delete_for_contact(contact)?;
        let removed = inner.arena.remove_contact(contact);

        if deleted_rows != removed.len() {
            tracing::warn!(
                "Contact {}: deleted {} rows but cache held {} selections",
                contact,
                deleted_rows,
                removed.len()
            );
        }

        tracing::info!("Removed {} selections for contact {}", removed.len(), contact);
        Ok(removed.len())
    }

    /// Replace all of a contact's selections with `actions`, in order.
    ///
    /// The capacity check counts the contact's current slots as free. On any
    /// failure nothing changes.
    pub fn replace_selections_for_contact(
        &self,
        contact: ContactId,
        actions: &[ActionType],
    ) -> Result<Vec<SlotId>, SelectionError> {
        let mut inner = self.lock();

        let mut next = inner.arena.clone();
        next.remove_contact(contact);

        let mut added = Vec::with_capacity(actions.len());
        for &action in actions {
            if next.find(contact, action).is_some() {
                continue;
            }
            let slot = next.lowest_free().ok_or(SelectionError::CapacityExceeded {
                pool_size: POOL_SIZE,
            })?;
            let selection = Selection {
                slot,
                contact,
                action,
            };
            next.insert(selection);
            added.push(selection);
        }

        inner.table.replace_for_contact(contact, &added)?;
        inner.arena = next;

        tracing::info!(
            "Contact {} now holds {} selections",
            contact,
            added.len()
        );
        Ok(added.iter().map(|s| s.slot).collect())
    }

    /// Selections of `contact` in the order they were made
    pub fn selections_for_contact(&self, contact: ContactId) -> Vec<Selection> {
        self.lock().arena.selections_for(contact)
    }

    pub fn slots_for_contact(&self, contact: ContactId) -> Vec<SlotId> {
        self.lock().arena.slots_for(contact).to_vec()
    }

    /// Contacts with at least one active selection
    pub fn contacts_in_use(&self) -> BTreeSet<ContactId> {
        self.lock().arena.by_contact.keys().copied().collect()
    }

    pub fn selection_count(&self) -> usize {
        self.lock().arena.len()
    }

    pub fn selection_count_for_contact(&self, contact: ContactId) -> usize {
        self.lock().arena.slots_for(contact).len()
    }

    /// Would `delta` more selections overflow the pool?
    pub fn would_exceed_capacity(&self, delta: isize) -> bool {
        self.lock().arena.len() as isize + delta > POOL_SIZE as isize
    }

    pub fn is_full(&self) -> bool {
        self.selection_count() >= POOL_SIZE
    }

    pub fn is_selected(&self, contact: ContactId) -> bool {
        !self.lock().arena.slots_for(contact).is_empty()
    }

    /// Every active selection, ordered by slot
    pub fn snapshot(&self) -> Vec<Selection> {
        self.lock().arena.slots.iter().flatten().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;
    use std::collections::HashSet;

    const A: ContactId = ContactId(1);
    const B: ContactId = ContactId(2);

    fn empty_store() -> SelectionStore {
        SelectionStore::load(SelectionTable::in_memory().unwrap()).unwrap()
    }

    fn assert_pool_invariants(store: &SelectionStore) {
        let all = store.snapshot();
        assert!(all.len() <= POOL_SIZE);
        let slots: HashSet<SlotId> = all.iter().map(|s| s.slot).collect();
        assert_eq!(slots.len(), all.len());
        assert_eq!(store.selection_count(), all.len());
    }

    #[test]
    fn test_allocates_lowest_free_slot() {
        let store = empty_store();
        assert_eq!(store.set_selection(A, ActionType::Call).unwrap(), SlotId(0));
        assert_eq!(store.set_selection(B, ActionType::Call).unwrap(), SlotId(1));
        assert_eq!(store.set_selection(B, ActionType::Text).unwrap(), SlotId(2));

        store.delete_selections_for_contact(A).unwrap();
        assert_eq!(store.set_selection(ContactId(3), ActionType::Text).unwrap(), SlotId(0));
        assert_pool_invariants(&store);
    }

    #[test]
    fn test_set_selection_is_idempotent() {
        let store = empty_store();
        let first = store.set_selection(A, ActionType::Call).unwrap();
        let second = store.set_selection(A, ActionType::Call).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.selection_count(), 1);
    }

    #[test]
    fn test_selections_keep_creation_order() {
        let store = empty_store();
        store.set_selection(B, ActionType::Call).unwrap();
        store.set_selection(A, ActionType::Text).unwrap();
        store.set_selection(A, ActionType::Call).unwrap();

        let actions: Vec<ActionType> = store
            .selections_for_contact(A)
            .iter()
            .map(|s| s.action)
            .collect();
        assert_eq!(actions, vec![ActionType::Text, ActionType::Call]);
        assert!(store.selections_for_contact(ContactId(99)).is_empty());
    }

    #[test]
    fn test_delete_frees_slots_immediately() {
        let store = empty_store();
        store.set_selection(A, ActionType::Call).unwrap();
        store.set_selection(B, ActionType::Call).unwrap();
        store.set_selection(B, ActionType::Text).unwrap();

        assert_eq!(store.delete_selections_for_contact(B).unwrap(), 2);
        assert!(!store.is_selected(B));
        assert_eq!(store.delete_selections_for_contact(B).unwrap(), 0);

        assert_eq!(store.set_selection(ContactId(3), ActionType::Call).unwrap(), SlotId(1));
        assert_eq!(store.set_selection(ContactId(3), ActionType::Text).unwrap(), SlotId(2));
    }

    #[test]
    fn test_full_pool_rejects_new_contact() {
        let store = empty_store();
        for i in 0..POOL_SIZE as i64 {
            store.set_selection(ContactId(100 + i), ActionType::Call).unwrap();
        }
        assert!(store.is_full());
        assert!(store.would_exceed_capacity(1));
        assert!(!store.would_exceed_capacity(0));

        let err = store.set_selection(ContactId(500), ActionType::Call).unwrap_err();
        assert!(matches!(err, SelectionError::CapacityExceeded { pool_size: POOL_SIZE }));

        // existing pair still resolves while full
        assert_eq!(store.set_selection(ContactId(100), ActionType::Call).unwrap(), SlotId(0));
        assert_pool_invariants(&store);
    }

    #[test]
    fn test_would_exceed_capacity_with_negative_delta() {
        let store = empty_store();
        store.set_selection(A, ActionType::Call).unwrap();
        assert!(!store.would_exceed_capacity(-1));
        assert!(!store.would_exceed_capacity(9));
        assert!(store.would_exceed_capacity(10));
    }

    #[test]
    fn test_mixed_sequence_keeps_invariants() {
        let store = empty_store();
        let actions = [ActionType::Call, ActionType::Text];
        for step in 0..60i64 {
            let contact = ContactId(step % 7);
            if step % 5 == 4 {
                store.delete_selections_for_contact(contact).unwrap();
            } else if !store.would_exceed_capacity(1) {
                store
                    .set_selection(contact, actions[(step % 2) as usize])
                    .unwrap();
            }
            assert_pool_invariants(&store);
        }
    }

    #[test]
    fn test_reload_reproduces_slots_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selections.db");
        {
            let store = SelectionStore::load(SelectionTable::open(&path).unwrap()).unwrap();
            store.set_selection(A, ActionType::Text).unwrap();
            store.set_selection(B, ActionType::Call).unwrap();
            store.set_selection(A, ActionType::Call).unwrap();
            store.delete_selections_for_contact(B).unwrap();
        }

        let store = SelectionStore::load(SelectionTable::open(&path).unwrap()).unwrap();
        let selections = store.selections_for_contact(A);
        assert_eq!(selections.len(), 2);
        assert_eq!(selections[0].action, ActionType::Text);
        assert_eq!(selections[0].slot, SlotId(0));
        assert_eq!(selections[1].slot, SlotId(2));
        assert_eq!(store.contacts_in_use(), BTreeSet::from([A]));
        assert_eq!(store.set_selection(B, ActionType::Text).unwrap(), SlotId(1));
    }

    #[test]
    fn test_load_rejects_corrupt_rows() {
        let cases = [
            (99, "CALL"),
            (-1, "CALL"),
            (0, "FAX"),
        ];
        for (slot, action) in cases {
            let table = SelectionTable::in_memory().unwrap();
            table
                .connection()
                .execute(
                    "INSERT INTO selections (slot_id, contact_id, type) VALUES (?1, 1, ?2)",
                    params![slot, action],
                )
                .unwrap();
            let err = SelectionStore::load(table).err().unwrap();
            assert!(matches!(err, SelectionError::CorruptRow { .. }), "{slot} {action}");
            assert!(err.is_storage());
        }
    }

    #[test]
    fn test_load_rejects_duplicate_slot() {
        let table = SelectionTable::in_memory().unwrap();
        for contact in [1, 2] {
            table
                .connection()
                .execute(
                    "INSERT INTO selections (slot_id, contact_id, type) VALUES (3, ?1, 'CALL')",
                    params![contact],
                )
                .unwrap();
        }
        assert!(SelectionStore::load(table).is_err());
    }

    #[test]
    fn test_replace_counts_own_slots_as_free() {
        let store = empty_store();
        for i in 0..(POOL_SIZE as i64 - 1) {
            store.set_selection(ContactId(100 + i), ActionType::Call).unwrap();
        }
        store.set_selection(A, ActionType::Call).unwrap();
        assert!(store.is_full());

        // A swaps its one slot for one text slot
        let slots = store
            .replace_selections_for_contact(A, &[ActionType::Text])
            .unwrap();
        assert_eq!(slots, vec![SlotId(9)]);

        // A cannot grow to two while the pool is full
        let err = store
            .replace_selections_for_contact(A, &[ActionType::Text, ActionType::Call])
            .unwrap_err();
        assert!(matches!(err, SelectionError::CapacityExceeded { .. }));
        assert_eq!(store.selections_for_contact(A)[0].action, ActionType::Text);
        assert_pool_invariants(&store);
    }

    #[test]
    fn test_replace_ignores_repeated_actions() {
        let store = empty_store();
        let slots = store
            .replace_selections_for_contact(A, &[ActionType::Call, ActionType::Call])
            .unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(store.selection_count_for_contact(A), 1);
    }

    #[test]
    fn test_failed_write_leaves_store_unchanged() {
        let store = empty_store();
        store.set_selection(A, ActionType::Call).unwrap();
        store.set_selection(A, ActionType::Text).unwrap();
        let before = store.snapshot();

        store
            .lock()
            .table
            .connection()
            .execute_batch("DROP TABLE selections")
            .unwrap();

        let err = store.set_selection(B, ActionType::Call).unwrap_err();
        assert!(matches!(err, SelectionError::Storage(_)));

        let err = store.delete_selections_for_contact(A).unwrap_err();
        assert!(matches!(err, SelectionError::Storage(_)));

        let err = store
            .replace_selections_for_contact(A, &[ActionType::Call])
            .unwrap_err();
        assert!(matches!(err, SelectionError::Storage(_)));

        assert_eq!(store.snapshot(), before);
        assert_eq!(store.selection_count(), 2);
        assert_eq!(store.selection_count_for_contact(A), 2);
        assert!(store.is_selected(A));
        assert!(!store.is_selected(B));
        assert_pool_invariants(&store);
    }
}
