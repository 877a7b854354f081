//! Serializable types for the replay log.
//!
//! A replay log is a JSONL file where each line is one `BuildStepRecord`
//! JSON object. Field names are fixed: `file`, `cmd`, `cwd`, `deps`,
//! `recmake`, `noerror`.

use crate::errors::RemakeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ── DependencyRef ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencyRef {
    /// Relative to the record's working directory, or absolute.
    #[serde(rename = "file")]
    pub path: String,
    /// Logical prerequisite with no file on disk; never existence-checked.
    #[serde(rename = "phony")]
    pub is_phony: bool,
}

impl DependencyRef {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_phony: false,
        }
    }

    pub fn phony(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_phony: true,
        }
    }

    pub fn resolve(&self, working_directory: &Path) -> PathBuf {
        // `join` keeps absolute paths as they are.
        working_directory.join(&self.path)
    }
}

// ── BuildStepRecord ───────────────────────────────────────────────────────────

/// One executed build step. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStepRecord {
    #[serde(rename = "file")]
    pub target: String,
    #[serde(rename = "cmd")]
    pub command: String,
    #[serde(rename = "cwd")]
    pub working_directory: PathBuf,
    #[serde(rename = "deps")]
    pub dependencies: Vec<DependencyRef>,
    #[serde(rename = "noerror")]
    pub continue_on_error: bool,
    #[serde(rename = "recmake")]
    pub is_recursive_invocation: bool,
}

impl BuildStepRecord {
    pub fn to_line(&self) -> Result<String, RemakeError> {
        serde_json::to_string(self).map_err(|e| RemakeError::Io(e.to_string()))
    }
}

// ── Legacy handling ───────────────────────────────────────────────────────────

/// What to do with lines written in the older shape (bare dependency paths,
/// no `noerror` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegacyPolicy {
    #[default]
    Upgrade,
    Reject,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Structured(DependencyRef),
    Legacy(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRecord {
    file: String,
    cmd: String,
    cwd: PathBuf,
    deps: Vec<RawDependency>,
    recmake: bool,
    noerror: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub record: BuildStepRecord,
    /// The line used the legacy shape and was upgraded.
    pub upgraded: bool,
}

/// Decode one log line. The error is a message without line context; the
/// caller attaches the line number.
pub fn parse_line(line: &str, policy: LegacyPolicy) -> Result<ParsedLine, String> {
    let raw: RawRecord = serde_json::from_str(line).map_err(|e| e.to_string())?;

    let legacy_deps = raw
        .deps
        .iter()
        .filter(|dep| matches!(dep, RawDependency::Legacy(_)))
        .count();
    if legacy_deps != 0 && legacy_deps != raw.deps.len() {
        return Err("mixed legacy and structured dependency entries".to_string());
    }
    let is_legacy = legacy_deps != 0 || raw.noerror.is_none();
    if is_legacy && policy == LegacyPolicy::Reject {
        return Err("legacy record shape rejected (bare dependency paths or missing `noerror`)"
            .to_string());
    }

    let dependencies = raw
        .deps
        .into_iter()
        .map(|dep| match dep {
            RawDependency::Structured(dep) => dep,
            RawDependency::Legacy(path) => DependencyRef::file(path),
        })
        .collect();

    Ok(ParsedLine {
        record: BuildStepRecord {
            target: raw.file,
            command: raw.cmd,
            working_directory: raw.cwd,
            dependencies,
            continue_on_error: raw.noerror.unwrap_or(false),
            is_recursive_invocation: raw.recmake,
        },
        upgraded: is_legacy,
    })
}
