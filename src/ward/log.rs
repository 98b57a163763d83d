//! Persisted ward error log.
//!
//! Every failed validation appends an annotated entry to
//! `ward-errors-unresolved.txt` inside the quest folder; resolving a scope
//! removes only that scope's entries. The file is an audit trail for humans
//! and context for later spiritmender attempts.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::PathBuf;

const ERROR_FILE: &str = "ward-errors-unresolved.txt";
const SEPARATOR_LEN: usize = 80;

pub struct WardLog {
    /// Directory holding active quest folders
    active_dir: PathBuf,
}

impl WardLog {
    pub fn new(active_dir: PathBuf) -> Self {
        Self { active_dir }
    }

    fn file_path(&self, folder: &str) -> PathBuf {
        self.active_dir.join(folder).join(ERROR_FILE)
    }

    /// Append an error entry tagged with timestamp, attempt number and scope.
    pub fn append(&self, folder: &str, scope: &str, attempt: u32, errors: &str) -> Result<()> {
        let entry = format!(
            "[{}] [attempt-{}] [task-{}] {}\n{}\n",
            Utc::now().to_rfc3339(),
            attempt,
            scope,
            errors,
            "=".repeat(SEPARATOR_LEN)
        );
        let path = self.file_path(folder);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let existing = fs::read_to_string(&path).unwrap_or_default();
        fs::write(&path, existing + &entry)
            .with_context(|| format!("Failed to save ward errors: {}", path.display()))?;
        Ok(())
    }

    /// Remove all entries tagged with the given scope, leaving other scopes'
    /// entries intact.
    pub fn clear_scope(&self, folder: &str, scope: &str) -> Result<()> {
        let path = self.file_path(folder);
        let Ok(content) = fs::read_to_string(&path) else {
            // No log file means nothing to clear
            return Ok(());
        };

        let tag = format!("[task-{}]", scope);
        let separator = "=".repeat(SEPARATOR_LEN);
        let mut kept = Vec::new();
        let mut skipping = false;

        for line in content.lines() {
            if !skipping && line.contains(&tag) {
                skipping = true;
                continue;
            }
            if skipping {
                if line.starts_with(&separator) {
                    skipping = false;
                }
                continue;
            }
            kept.push(line);
        }

        let mut rebuilt = kept.join("\n");
        if !rebuilt.is_empty() && !rebuilt.ends_with('\n') {
            rebuilt.push('\n');
        }
        fs::write(&path, rebuilt)
            .with_context(|| format!("Failed to rewrite ward error log: {}", path.display()))?;
        Ok(())
    }

    /// Full log contents, or empty if no errors were ever recorded.
    pub fn read(&self, folder: &str) -> String {
        fs::read_to_string(self.file_path(folder)).unwrap_or_default()
    }
}
