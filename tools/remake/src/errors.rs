use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemakeError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("process error: {0}")]
    Process(String),
    #[error("replay log not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("replay log line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("command failed with exit status {status} in {}: {command}", .cwd.display())]
    CommandFailed {
        status: i32,
        command: String,
        cwd: PathBuf,
    },
}
