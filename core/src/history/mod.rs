pub mod storage;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStepResult {
    pub description: String,
    pub duration: f64,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildHistoryEntry {
    pub timestamp: DateTime<Local>,
    pub recipe: String,
    pub build_id: Option<u64>,
    pub duration: f64,
    pub success: bool,
    pub error_count: usize,
    pub warning_count: usize,
    pub steps: Vec<BuildStepResult>,
    pub git_commit: Option<String>,
    pub git_branch: Option<String>,
}

impl BuildHistoryEntry {
    pub fn new(recipe: String) -> Self {
        Self {
            timestamp: Local::now(),
            recipe,
            build_id: None,
            duration: 0.0,
            success: false,
            error_count: 0,
            warning_count: 0,
            steps: Vec::new(),
            git_commit: capture_git_commit(),
            git_branch: capture_git_branch(),
        }
    }

    pub fn add_step(&mut self, step: BuildStepResult) {
        self.steps.push(step);
    }

    pub fn finalize(
        &mut self,
        build_id: Option<u64>,
        duration: f64,
        success: bool,
        error_count: usize,
        warning_count: usize,
    ) {
        self.build_id = build_id;
        self.duration = duration;
        self.success = success;
        self.error_count = error_count;
        self.warning_count = warning_count;
    }
}

pub struct BuildHistory {
    entries: Vec<BuildHistoryEntry>,
    storage_path: PathBuf,
    max_builds: usize,
}

impl BuildHistory {
    pub fn new(storage_path: PathBuf, max_builds: usize) -> anyhow::Result<Self> {
        let entries = storage::load_history(&storage_path)?;
        Ok(Self {
            entries,
            storage_path,
            max_builds,
        })
    }

    pub fn add_entry(&mut self, entry: BuildHistoryEntry) -> anyhow::Result<()> {
        self.entries.push(entry);

        if self.entries.len() > self.max_builds {
            self.entries.remove(0);
        }

        storage::save_history(&self.storage_path, &self.entries)
    }

    pub fn entries(&self) -> &[BuildHistoryEntry] {
        &self.entries
    }

    pub fn last_entry(&self) -> Option<&BuildHistoryEntry> {
        self.entries.last()
    }

    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.entries.clear();
        storage::save_history(&self.storage_path, &self.entries)
    }
}

fn capture_git_commit() -> Option<String> {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
}

fn capture_git_branch() -> Option<String> {
    std::process::Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
}
