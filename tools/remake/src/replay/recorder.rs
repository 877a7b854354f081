//! Appends one `BuildStepRecord` per executed build step.
//!
//! A `RecordingSession` owns the open log handle for one build-tool run.
//! Every append is flushed before control returns to the build tool, and
//! no failure ever reaches the caller.

use crate::config::RecordingConfig;
use crate::errors::RemakeError;
use crate::replay::recording::{BuildStepRecord, DependencyRef};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A build step as observed by the host tool, already resolved to plain values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedStep {
    pub target: String,
    pub command: String,
    pub dependencies: Vec<DependencyRef>,
    pub continue_on_error: bool,
    pub working_directory: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub written: u64,
    pub failed: u64,
    /// Events the adapter could not turn into a record.
    pub dropped: u64,
}

pub struct RecordingSession {
    path: PathBuf,
    file: File,
    entry_point: String,
    stats: RecorderStats,
}

impl RecordingSession {
    pub fn open(
        path: impl AsRef<Path>,
        entry_point: impl Into<String>,
        truncate: bool,
    ) -> Result<Self, RemakeError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| RemakeError::Io(e.to_string()))?;
        }
        let io_err = |e: std::io::Error| RemakeError::Io(format!("{}: {e}", path.display()));
        if truncate {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)
                .map_err(io_err)?;
        }
        // Always O_APPEND: a nested run may write to the same log meanwhile.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        Ok(Self {
            path,
            file,
            entry_point: entry_point.into(),
            stats: RecorderStats::default(),
        })
    }

    /// `Ok(None)` when no log destination is configured: recording is off.
    pub fn from_config(cfg: &RecordingConfig) -> Result<Option<Self>, RemakeError> {
        let Some(path) = &cfg.log_path else {
            return Ok(None);
        };
        let entry_point = match &cfg.entry_point {
            Some(entry) => entry.display().to_string(),
            None => std::env::current_exe()
                .map(|exe| exe.display().to_string())
                .unwrap_or_default(),
        };
        Self::open(path, entry_point, cfg.truncate).map(Some)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    /// True when `command` calls back into our own entry point; the nested
    /// run records its inner steps itself.
    pub fn is_recursive(&self, command: &str) -> bool {
        if self.entry_point.is_empty() {
            return false;
        }
        command
            .strip_prefix(self.entry_point.as_str())
            .and_then(|rest| rest.chars().next())
            .is_some_and(char::is_whitespace)
    }

    pub fn build_record(&self, step: CapturedStep) -> BuildStepRecord {
        BuildStepRecord {
            is_recursive_invocation: self.is_recursive(&step.command),
            target: step.target,
            command: step.command,
            working_directory: step.working_directory,
            dependencies: step.dependencies,
            continue_on_error: step.continue_on_error,
        }
    }

    /// Append and flush one record. Failures are counted, never returned.
    pub fn record(&mut self, step: CapturedStep) {
        let record = self.build_record(step);
        match self.append(&record) {
            Ok(()) => self.stats.written += 1,
            Err(_) => self.stats.failed += 1,
        }
    }

    pub(crate) fn note_dropped(&mut self) {
        self.stats.dropped += 1;
    }

    fn append(&mut self, record: &BuildStepRecord) -> Result<(), RemakeError> {
        let mut line = record.to_line()?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .map_err(|e| RemakeError::Io(e.to_string()))?;
        self.file.flush().map_err(|e| RemakeError::Io(e.to_string()))
    }
}
