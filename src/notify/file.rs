//! File-backed tray
//!
//! Keeps the presented notifications in a JSON file so short-lived processes
//! (the CLI) can render into it and show it later. Writes go through a temp
//! file and a rename.

use super::{NotificationSink, RenderData, SinkError};
use crate::selection::SlotId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Presented notifications, oldest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrayState {
    pub notifications: Vec<RenderData>,
}

impl TrayState {
    /// Top-to-bottom view
    pub fn stacked(&self) -> impl Iterator<Item = &RenderData> {
        self.notifications.iter().rev()
    }
}

pub struct FileSink {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Current tray contents; an absent file is an empty tray
    pub fn read_tray(&self) -> Result<TrayState, SinkError> {
        read_tray(&self.path)
    }

    fn update(&self, f: impl FnOnce(&mut TrayState)) -> Result<(), SinkError> {
        let _lock = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut tray = read_tray(&self.path)?;
        f(&mut tray);
        write_tray(&self.path, &tray)
    }
}

fn read_tray(path: &Path) -> Result<TrayState, SinkError> {
    if !path.exists() {
        return Ok(TrayState::default());
    }
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn write_tray(path: &Path, tray: &TrayState) -> Result<(), SinkError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(tray)?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, contents)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

impl NotificationSink for FileSink {
    fn present(&self, slot: SlotId, data: &RenderData) -> Result<(), SinkError> {
        self.update(|tray| {
            tray.notifications.retain(|n| n.slot != slot);
            tray.notifications.push(data.clone());
        })?;
        tracing::debug!("Presented {} in slot {}", data.headline(), slot);
        Ok(())
    }

    fn dismiss(&self, slot: SlotId) -> Result<(), SinkError> {
        self.update(|tray| tray.notifications.retain(|n| n.slot != slot))
    }

    fn dismiss_all(&self) -> Result<(), SinkError> {
        self.update(|tray| tray.notifications.clear())
    }
}
