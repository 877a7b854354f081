//! Replay: load a log and re-run every step whose file dependencies exist.

use crate::config::AppConfig;
use crate::errors::RemakeError;
use crate::logging::{JsonlLogger, LogEvent};
use crate::replay::recording::{parse_line, BuildStepRecord, LegacyPolicy};
use crate::runtime::{FileSystem, ProcessRequest, ProcessRunner, ProductionRuntime, Terminal};
use serde_json::json;
use std::path::{Path, PathBuf};

// ── ReplayLog ─────────────────────────────────────────────────────────────────

/// A parsed replay log, in the order the steps were recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayLog {
    pub path: PathBuf,
    pub records: Vec<BuildStepRecord>,
    /// Lines that used the legacy shape and were upgraded on load.
    pub upgraded: usize,
}

impl ReplayLog {
    /// Fails with `NotFound` when the file is absent and with `Parse` naming
    /// the first bad line; nothing is executed either way.
    pub fn load(
        fs: &dyn FileSystem,
        path: &Path,
        policy: LegacyPolicy,
    ) -> Result<Self, RemakeError> {
        let raw = fs.read_to_string(path)?;
        Self::parse(path, &raw, policy)
    }

    pub fn parse(path: &Path, raw: &str, policy: LegacyPolicy) -> Result<Self, RemakeError> {
        let mut records = Vec::new();
        let mut upgraded = 0;
        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed = parse_line(line, policy).map_err(|message| RemakeError::Parse {
                line: idx + 1,
                message,
            })?;
            if parsed.upgraded {
                upgraded += 1;
            }
            records.push(parsed.record);
        }
        Ok(Self {
            path: path.to_path_buf(),
            records,
            upgraded,
        })
    }

    /// Records left after dropping recursive invocations of the build tool.
    pub fn replayable(&self) -> Vec<&BuildStepRecord> {
        self.records
            .iter()
            .filter(|record| !record.is_recursive_invocation)
            .collect()
    }
}

// ── Outcomes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Executed,
    /// Non-zero exit on a continue-on-error step.
    FailedTolerated { exit_code: i32 },
    Skipped { missing: Vec<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Records considered after the recursive filter.
    pub total: usize,
    pub executed: usize,
    pub skipped: usize,
    pub tolerated_failures: usize,
    pub filtered_recursive: usize,
}

// ── Replayer ──────────────────────────────────────────────────────────────────

pub struct Replayer<'a> {
    runner: &'a dyn ProcessRunner,
    fs: &'a dyn FileSystem,
    terminal: &'a dyn Terminal,
    shell: String,
    strip_prefix: Option<String>,
    logger: Option<JsonlLogger>,
}

impl<'a> Replayer<'a> {
    pub fn new(
        runner: &'a dyn ProcessRunner,
        fs: &'a dyn FileSystem,
        terminal: &'a dyn Terminal,
    ) -> Self {
        Self {
            runner,
            fs,
            terminal,
            shell: "/bin/sh".to_string(),
            strip_prefix: None,
            logger: None,
        }
    }

    pub fn from_config(runtime: &'a ProductionRuntime, cfg: &AppConfig) -> Self {
        Self::new(
            runtime.process_runner.as_ref(),
            runtime.file_system.as_ref(),
            runtime.terminal.as_ref(),
        )
        .with_shell(cfg.replay.shell.clone())
        .with_strip_prefix(cfg.replay.strip_prefix.clone())
        .with_logger(JsonlLogger::from_config(&cfg.logging))
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_strip_prefix(mut self, prefix: Option<String>) -> Self {
        self.strip_prefix = prefix;
        self
    }

    pub fn with_logger(mut self, logger: Option<JsonlLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Replays every non-recursive record in log order. Stops at the first
    /// fatal failure; there is no resume.
    pub fn run(&self, log: &ReplayLog) -> Result<ReplaySummary, RemakeError> {
        let steps = log.replayable();
        let mut summary = ReplaySummary {
            total: steps.len(),
            filtered_recursive: log.records.len() - steps.len(),
            ..ReplaySummary::default()
        };
        self.log_event(
            "info",
            "replay_started",
            json!({
                "log": log.path.display().to_string(),
                "records": log.records.len(),
                "replayable": summary.total,
                "upgraded_legacy": log.upgraded,
            }),
        );

        for (index, record) in steps.iter().enumerate() {
            self.terminal.write_line(&format!(
                "[{index}/{}] making {}",
                summary.total,
                display_target(&record.target, self.strip_prefix.as_deref())
            ))?;
            match self.replay_step(record)? {
                StepOutcome::Executed => summary.executed += 1,
                StepOutcome::FailedTolerated { .. } => {
                    summary.executed += 1;
                    summary.tolerated_failures += 1;
                }
                StepOutcome::Skipped { .. } => summary.skipped += 1,
            }
        }

        self.log_event(
            "info",
            "replay_finished",
            json!({
                "total": summary.total,
                "executed": summary.executed,
                "skipped": summary.skipped,
                "tolerated_failures": summary.tolerated_failures,
                "filtered_recursive": summary.filtered_recursive,
            }),
        );
        Ok(summary)
    }

    /// Decide and act on one record: skip when a file dependency is absent,
    /// otherwise run the command through the shell in the recorded cwd.
    pub fn replay_step(&self, record: &BuildStepRecord) -> Result<StepOutcome, RemakeError> {
        let missing = self.missing_dependencies(record);
        if !missing.is_empty() {
            self.terminal
                .write_line(&format!("SKIP: missing: {}", missing.join(", ")))?;
            self.log_event(
                "info",
                "step_skipped",
                json!({ "target": record.target, "missing": missing }),
            );
            return Ok(StepOutcome::Skipped { missing });
        }

        let output = self.runner.run(ProcessRequest::shell(
            &self.shell,
            &record.command,
            &record.working_directory,
        ))?;
        if output.success() {
            self.log_event(
                "info",
                "step_executed",
                json!({ "target": record.target, "cmd": record.command }),
            );
            return Ok(StepOutcome::Executed);
        }

        if record.continue_on_error {
            self.terminal.write_line(&format!(
                "ignored: exit status {} from {}",
                output.exit_code,
                display_target(&record.target, self.strip_prefix.as_deref())
            ))?;
            self.log_event(
                "warn",
                "step_failed_tolerated",
                json!({
                    "target": record.target,
                    "cmd": record.command,
                    "exit_code": output.exit_code,
                }),
            );
            return Ok(StepOutcome::FailedTolerated {
                exit_code: output.exit_code,
            });
        }

        self.log_event(
            "error",
            "step_failed",
            json!({
                "target": record.target,
                "cmd": record.command,
                "cwd": record.working_directory.display().to_string(),
                "exit_code": output.exit_code,
            }),
        );
        Err(RemakeError::CommandFailed {
            status: output.exit_code,
            command: record.command.clone(),
            cwd: record.working_directory.clone(),
        })
    }

    /// Non-phony dependencies that do not exist under the record's cwd.
    pub fn missing_dependencies(&self, record: &BuildStepRecord) -> Vec<String> {
        record
            .dependencies
            .iter()
            .filter(|dep| !dep.is_phony && !self.fs.exists(&dep.resolve(&record.working_directory)))
            .map(|dep| dep.path.clone())
            .collect()
    }

    fn log_event(&self, level: &str, event_type: &str, payload: serde_json::Value) {
        if let Some(logger) = &self.logger {
            let _ = logger.append(&LogEvent {
                level,
                event_type,
                payload,
            });
        }
    }
}

pub fn display_target<'t>(target: &'t str, strip_prefix: Option<&str>) -> &'t str {
    strip_prefix
        .filter(|prefix| !prefix.is_empty())
        .and_then(|prefix| target.strip_prefix(prefix))
        .unwrap_or(target)
}
