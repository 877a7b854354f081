use crate::errors::RemakeError;
use crate::replay::recording::LegacyPolicy;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub type EnvMap = BTreeMap<String, String>;

/// Names the recording log; unset disables recording.
pub const ENV_MAKE_LOG: &str = "MAKE_LOG";
pub const ENV_BUILD_ROOT: &str = "REMAKE_BUILD_ROOT";
pub const ENV_ENTRY_POINT: &str = "REMAKE_ENTRY_POINT";
pub const ENV_CONFIG: &str = "REMAKE_CONFIG";
/// Set by an outer recording run; nested runs never truncate the shared log.
pub const ENV_RECORDING_ACTIVE: &str = "REMAKE_RECORDING_ACTIVE";

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub strip_prefix: Option<String>,
    pub run_log: Option<PathBuf>,
    pub reject_legacy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    pub recording: RecordingConfig,
    pub replay: ReplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RecordingConfig {
    pub log_path: Option<PathBuf>,
    /// Command prefix that marks a recursive invocation. Defaults to the
    /// recording process's own executable.
    pub entry_point: Option<PathBuf>,
    pub truncate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Cosmetic: removed from targets in progress lines.
    pub strip_prefix: Option<String>,
    pub shell: String,
    pub legacy_records: LegacyPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub run_log: Option<PathBuf>,
    pub max_payload_bytes: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            strip_prefix: None,
            shell: "/bin/sh".to_string(),
            legacy_records: LegacyPolicy::Upgrade,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            run_log: None,
            max_payload_bytes: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAppConfig {
    recording: Option<PartialRecordingConfig>,
    replay: Option<PartialReplayConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialRecordingConfig {
    log_path: Option<PathBuf>,
    entry_point: Option<PathBuf>,
    truncate: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialReplayConfig {
    strip_prefix: Option<String>,
    shell: Option<String>,
    legacy_records: Option<LegacyPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLoggingConfig {
    run_log: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
}

/// Defaults, then the TOML file, then the environment, then the CLI.
pub fn load_config(
    overrides: &CliOverrides,
    env: &EnvMap,
    fs: &dyn FileSystem,
) -> Result<AppConfig, RemakeError> {
    let mut cfg = AppConfig::default();

    let config_path = overrides
        .config_path
        .clone()
        .or_else(|| env.get(ENV_CONFIG).map(PathBuf::from));
    if let Some(path) = &config_path {
        let file_contents = fs.read_to_string(path).map_err(|e| match e {
            RemakeError::NotFound(path) => {
                RemakeError::ConfigParse(format!("config file not found: {}", path.display()))
            }
            other => other,
        })?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| RemakeError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_env(&mut cfg, env);
    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(recording) = partial.recording {
        if let Some(value) = recording.log_path {
            cfg.recording.log_path = Some(value);
        }
        if let Some(value) = recording.entry_point {
            cfg.recording.entry_point = Some(value);
        }
        if let Some(value) = recording.truncate {
            cfg.recording.truncate = value;
        }
    }

    if let Some(replay) = partial.replay {
        if let Some(value) = replay.strip_prefix {
            cfg.replay.strip_prefix = Some(value);
        }
        if let Some(value) = replay.shell {
            cfg.replay.shell = value;
        }
        if let Some(value) = replay.legacy_records {
            cfg.replay.legacy_records = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(value) = logging.run_log {
            cfg.logging.run_log = Some(value);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
    }
}

fn apply_env(cfg: &mut AppConfig, env: &EnvMap) {
    if let Some(path) = env.get(ENV_MAKE_LOG).filter(|v| !v.is_empty()) {
        cfg.recording.log_path = Some(PathBuf::from(path));
    }
    if let Some(entry) = env.get(ENV_ENTRY_POINT).filter(|v| !v.is_empty()) {
        cfg.recording.entry_point = Some(PathBuf::from(entry));
    }
    if let Some(root) = env.get(ENV_BUILD_ROOT).filter(|v| !v.is_empty()) {
        cfg.replay.strip_prefix = Some(root.clone());
    }
    if env.get(ENV_RECORDING_ACTIVE).is_some_and(|v| !v.is_empty()) {
        cfg.recording.truncate = false;
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(prefix) = &overrides.strip_prefix {
        cfg.replay.strip_prefix = Some(prefix.clone());
    }
    if let Some(run_log) = &overrides.run_log {
        cfg.logging.run_log = Some(run_log.clone());
    }
    if overrides.reject_legacy {
        cfg.replay.legacy_records = LegacyPolicy::Reject;
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), RemakeError> {
    if cfg.replay.shell.trim().is_empty() {
        return Err(RemakeError::InvalidConfig(
            "replay.shell must not be empty".to_string(),
        ));
    }

    if cfg.logging.max_payload_bytes == 0 {
        return Err(RemakeError::InvalidConfig(
            "logging.max_payload_bytes must be greater than zero".to_string(),
        ));
    }

    Ok(())
}
