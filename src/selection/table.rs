//! SQLite-backed selection table
//! One row per active selection, rowid records creation order

use super::{ContactId, Selection};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

const TABLE_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS selections (
    id INTEGER PRIMARY KEY,
    slot_id INTEGER NOT NULL,
    contact_id INTEGER NOT NULL,
    type TEXT NOT NULL
)";

/// A row as stored, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRow {
    pub row_id: i64,
    pub slot_id: i64,
    pub contact_id: i64,
    pub action: String,
}

pub struct SelectionTable {
    conn: Connection,
}

impl SelectionTable {
    /// Open (or create) the table in the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, rusqlite::Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Could not create database directory {:?}: {}", parent, e);
            }
        }

        let conn = Connection::open(path)?;
        let table = Self { conn };
        table.init_schema()?;

        tracing::info!("Selection table opened at {:?}", path);
        Ok(table)
    }

    /// Non-durable table, for tests and dry runs
    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        let table = Self {
            conn: Connection::open_in_memory()?,
        };
        table.init_schema()?;
        Ok(table)
    }

    /// Default database location under the user's local data dir
    pub fn default_path() -> PathBuf {
        crate::utils::data_dir().join("selections.db")
    }

    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute(TABLE_SCHEMA, [])?;
        Ok(())
    }

    /// Full scan in creation order
    pub fn load_rows(&self) -> Result<Vec<SelectionRow>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, slot_id, contact_id, type FROM selections ORDER BY id")?;

        let rows = stmt
            .query_map([], |row| {
                Ok(SelectionRow {
                    row_id: row.get(0)?,
                    slot_id: row.get(1)?,
                    contact_id: row.get(2)?,
                    action: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Insert one selection, returning its row id
    pub fn insert(&self, selection: &Selection) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO selections (slot_id, contact_id, type) VALUES (?1, ?2, ?3)",
            params![
                i64::from(selection.slot.0),
                selection.contact.0,
                selection.action.as_str()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Delete every row of a contact in one transaction
    pub fn delete_for_contact(&mut self, contact: ContactId) -> Result<usize, rusqlite::Error> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM selections WHERE contact_id = ?1",
            params![contact.0],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    /// Swap a contact's rows for `selections` in one transaction
    pub fn replace_for_contact(
        &mut self,
        contact: ContactId,
        selections: &[Selection],
    ) -> Result<usize, rusqlite::Error> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM selections WHERE contact_id = ?1",
            params![contact.0],
        )?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO selections (slot_id, contact_id, type) VALUES (?1, ?2, ?3)")?;
            for selection in selections {
                stmt.execute(params![
                    i64::from(selection.slot.0),
                    selection.contact.0,
                    selection.action.as_str()
                ])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    pub fn count(&self) -> Result<usize, rusqlite::Error> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM selections", [], |row| row.get(0))?;
        Ok(total as usize)
    }

    /// Raw access for tests that need to plant bad rows
    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}
