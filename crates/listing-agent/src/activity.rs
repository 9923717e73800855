//! JSONL activity log: one line per job transition or attempt.
//!
//! Append-only, rotated by size into `.1` … `.5`.

use anyhow::{Context, Result};
use chrono::Utc;
use listing_core::JobId;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Default size before rotation (100 MB).
const MAX_LOG_SIZE: u64 = 100 * 1024 * 1024;

const MAX_ROTATIONS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub timestamp: String,
    pub job_id: Option<JobId>,
    pub action: String,
    pub message: String,
    pub level: ActivityLevel,
}

struct Writer {
    file: File,
    current_size: u64,
}

/// Shared, thread-safe activity log.
pub struct ActivityLog {
    path: PathBuf,
    max_size: u64,
    writer: Mutex<Writer>,
}

impl ActivityLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path,
            max_size: MAX_LOG_SIZE,
            writer: Mutex::new(Writer { file, current_size }),
        })
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    /// Append an event. Failures are logged, never returned.
    pub fn record(&self, job_id: Option<JobId>, action: &str, message: &str, level: ActivityLevel) {
        let event = ActivityEvent {
            timestamp: Utc::now().to_rfc3339(),
            job_id,
            action: action.to_string(),
            message: message.to_string(),
            level,
        };
        if let Err(e) = self.append(&event) {
            warn!(path = %self.path.display(), error = %e, "failed to write activity log");
        }
    }

    pub fn info(&self, job_id: JobId, action: &str, message: &str) {
        self.record(Some(job_id), action, message, ActivityLevel::Info);
    }

    pub fn error(&self, job_id: JobId, action: &str, message: &str) {
        self.record(Some(job_id), action, message, ActivityLevel::Error);
    }

    fn append(&self, event: &ActivityEvent) -> Result<()> {
        let json = serde_json::to_string(event)?;
        let mut writer = match self.writer.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        if writer.current_size >= self.max_size {
            self.rotate(&mut writer)?;
        }
        writeln!(writer.file, "{json}")?;
        writer.current_size += json.len() as u64 + 1;
        Ok(())
    }

    /// activity.jsonl → activity.jsonl.1, .1 → .2, and so on.
    fn rotate(&self, writer: &mut Writer) -> Result<()> {
        writer.file.flush()?;

        let oldest = rotation_path(&self.path, MAX_ROTATIONS);
        if oldest.exists() {
            let _ = std::fs::remove_file(&oldest);
        }
        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            if from.exists() {
                let _ = std::fs::rename(&from, rotation_path(&self.path, i + 1));
            }
        }
        let _ = std::fs::rename(&self.path, rotation_path(&self.path, 1));

        writer.file = open_append(&self.path).context("failed to reopen activity log after rotation")?;
        writer.current_size = 0;
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open activity log: {}", path.display()))
}

fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("activity.jsonl")
    );
    base.with_file_name(name)
}

/// Read back every event in the current (unrotated) file.
pub fn read_events(path: &Path) -> Result<Vec<ActivityEvent>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).context("malformed activity line"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_events_append_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let log = ActivityLog::open(&path).unwrap();
        let id = Uuid::new_v4();
        log.info(id, "status", "pending -> in_progress");
        log.error(id, "attempt", "Failed to load page");

        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].job_id, Some(id));
        assert_eq!(events[1].level, ActivityLevel::Error);
        assert_eq!(events[1].message, "Failed to load page");
    }

    #[test]
    fn test_rotation_keeps_bounded_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let log = ActivityLog::open(&path).unwrap().with_max_size(1);
        for i in 0..8 {
            log.record(None, "tick", &i.to_string(), ActivityLevel::Info);
        }
        assert!(rotation_path(&path, 1).exists());
        assert!(rotation_path(&path, MAX_ROTATIONS).exists());
        assert!(!rotation_path(&path, MAX_ROTATIONS + 1).exists());

        let current = read_events(&path).unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].message, "7");
    }
}
