//! In-process contact directory

use super::{sort_records, ContactDirectory, ContactRecord, DirectoryError, SortOrder};
use crate::selection::ContactId;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

/// Directory held in memory; contacts can be added or removed while in use
#[derive(Default)]
pub struct MemoryDirectory {
    records: RwLock<Vec<ContactRecord>>,
    offline: AtomicBool,
    lookups: AtomicUsize,
}

impl MemoryDirectory {
    pub fn new(records: Vec<ContactRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            ..Self::default()
        }
    }

    pub fn upsert(&self, record: ContactRecord) {
        if let Ok(mut records) = self.records.write() {
            records.retain(|r| r.id != record.id);
            records.push(record);
        }
    }

    pub fn remove(&self, id: ContactId) -> bool {
        self.records
            .write()
            .map(|mut records| {
                let before = records.len();
                records.retain(|r| r.id != id);
                records.len() != before
            })
            .unwrap_or(false)
    }

    /// Make every lookup fail until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of lookups served or refused so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Result<Vec<ContactRecord>, DirectoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("directory is offline".to_string()));
        }
        self.records
            .read()
            .map(|records| records.clone())
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))
    }
}

impl ContactDirectory for MemoryDirectory {
    fn lookup(
        &self,
        ids: &BTreeSet<ContactId>,
        order: SortOrder,
    ) -> Result<Vec<ContactRecord>, DirectoryError> {
        let mut found: Vec<ContactRecord> = self
            .snapshot()?
            .into_iter()
            .filter(|r| ids.contains(&r.id))
            .collect();
        sort_records(&mut found, order);
        Ok(found)
    }

    fn all(&self, order: SortOrder) -> Result<Vec<ContactRecord>, DirectoryError> {
        let mut records = self.snapshot()?;
        sort_records(&mut records, order);
        Ok(records)
    }
}
