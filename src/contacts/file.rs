//! JSON file contact directory
//! Re-read on every lookup so external edits are picked up by the next pass

use super::{sort_records, ContactDirectory, ContactRecord, DirectoryError, SortOrder};
use crate::selection::ContactId;
use std::collections::BTreeSet;
use std::path::PathBuf;

pub struct FileDirectory {
    path: PathBuf,
}

impl FileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Result<Vec<ContactRecord>, DirectoryError> {
        if !self.path.exists() {
            return Err(DirectoryError::Unavailable(format!(
                "no contacts file at {:?}",
                self.path
            )));
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let records: Vec<ContactRecord> = serde_json::from_str(&contents)?;
        tracing::debug!("Read {} contacts from {:?}", records.len(), self.path);
        Ok(records)
    }
}

impl ContactDirectory for FileDirectory {
    fn lookup(
        &self,
        ids: &BTreeSet<ContactId>,
        order: SortOrder,
    ) -> Result<Vec<ContactRecord>, DirectoryError> {
        let mut found: Vec<ContactRecord> = self
            .read_all()?
            .into_iter()
            .filter(|r| ids.contains(&r.id))
            .collect();
        sort_records(&mut found, order);
        Ok(found)
    }

    fn all(&self, order: SortOrder) -> Result<Vec<ContactRecord>, DirectoryError> {
        let mut records = self.read_all()?;
        sort_records(&mut records, order);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_reads_records_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("contacts.json");
        std::fs::write(
            &path,
            r#"[
                {"id": 1, "person_id": 11, "display_name": "Zoe", "number": "1", "kind": "home"},
                {"id": 2, "person_id": 12, "display_name": "Abe", "number": "2", "kind": {"custom": "Boat"}}
            ]"#,
        )
        .unwrap();

        let directory = FileDirectory::new(&path);
        let all = directory.all(SortOrder::Ascending).unwrap();
        assert_eq!(all[0].display_name, "Abe");
        assert_eq!(all[0].type_label(), "Boat");

        let found = directory
            .lookup(&BTreeSet::from([ContactId(1)]), SortOrder::Descending)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].person_id, 11);
    }

    #[test]
    fn test_missing_or_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("contacts.json");
        let directory = FileDirectory::new(&path);
        assert!(matches!(
            directory.all(SortOrder::Ascending),
            Err(DirectoryError::Unavailable(_))
        ));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            directory.all(SortOrder::Ascending),
            Err(DirectoryError::Malformed(_))
        ));
    }
}
