//! Timestamped screenshot persistence.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use tracing::warn;

/// Subdirectory of the upload root that holds screenshots.
pub const SCREENSHOT_DIR: &str = "screenshots";

/// Writes PNGs under `<root>/screenshots/` and hands back root-relative paths.
#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    root: PathBuf,
}

impl ScreenshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Relative path for a new screenshot named after `label`.
    pub fn next_relative_path(&self, label: &str) -> String {
        let ts = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
        format!("{SCREENSHOT_DIR}/{label}_{ts}_{suffix}.png")
    }

    /// Persist `png`; failures are logged and yield `None`.
    pub async fn save(&self, label: &str, png: &[u8]) -> Option<String> {
        match self.try_save(label, png).await {
            Ok(rel) => Some(rel),
            Err(e) => {
                warn!(label, error = %e, "failed to store screenshot");
                None
            }
        }
    }

    async fn try_save(&self, label: &str, png: &[u8]) -> Result<String> {
        let rel = self.next_relative_path(label);
        let full = self.root.join(&rel);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&full, png)
            .await
            .with_context(|| format!("failed to write {}", full.display()))?;
        Ok(rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_returns_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScreenshotStore::new(dir.path());
        let rel = store.save("submission", b"\x89PNG").await.unwrap();
        assert!(rel.starts_with("screenshots/submission_"));
        assert!(rel.ends_with(".png"));
        assert_eq!(std::fs::read(dir.path().join(&rel)).unwrap(), b"\x89PNG");
    }

    #[tokio::test]
    async fn test_unwritable_root_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let store = ScreenshotStore::new(&file);
        assert!(store.save("error", b"x").await.is_none());
    }

    #[test]
    fn test_paths_are_unique() {
        let store = ScreenshotStore::new("/tmp");
        assert_ne!(store.next_relative_path("a"), store.next_relative_path("a"));
    }
}
