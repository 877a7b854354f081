use crate::errors::RemakeError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioMode {
    /// Child shares the parent's stdout/stderr; nothing is captured.
    #[default]
    Inherit,
    Piped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub stdio: StdioMode,
}

impl ProcessRequest {
    /// `<shell> -c <command>` run inside `cwd`.
    pub fn shell(shell: &str, command: &str, cwd: &Path) -> Self {
        Self {
            program: shell.to_string(),
            args: vec!["-c".to_string(), command.to_string()],
            cwd: Some(cwd.to_path_buf()),
            stdio: StdioMode::Inherit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub trait ProcessRunner: Send + Sync {
    fn spawn(&self, request: ProcessRequest) -> Result<u64, RemakeError>;
    fn wait(&self, handle: u64) -> Result<ProcessOutput, RemakeError>;

    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, RemakeError> {
        let handle = self.spawn(request)?;
        self.wait(handle)
    }
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, RemakeError>;
    fn exists(&self, path: &Path) -> bool;
}

pub trait Terminal: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), RemakeError>;
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, RemakeError> {
        std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RemakeError::NotFound(path.to_path_buf()),
            _ => RemakeError::Io(e.to_string()),
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[derive(Default)]
struct ProcessState {
    next_handle: u64,
    children: HashMap<u64, std::process::Child>,
}

pub struct ProductionProcessRunner {
    state: Mutex<ProcessState>,
}

impl ProductionProcessRunner {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProcessState::default()),
        }
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, ProcessState>, RemakeError> {
        self.state
            .lock()
            .map_err(|_| RemakeError::Process("process lock poisoned".to_string()))
    }
}

impl Default for ProductionProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner for ProductionProcessRunner {
    fn spawn(&self, request: ProcessRequest) -> Result<u64, RemakeError> {
        let mut cmd = std::process::Command::new(&request.program);
        cmd.args(&request.args);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        if request.stdio == StdioMode::Piped {
            cmd.stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped());
        }

        let child = cmd.spawn().map_err(|e| {
            RemakeError::Process(format!("failed to spawn {}: {e}", request.program))
        })?;
        let mut state = self.lock_state()?;
        let handle = state.next_handle;
        state.next_handle += 1;
        state.children.insert(handle, child);
        Ok(handle)
    }

    fn wait(&self, handle: u64) -> Result<ProcessOutput, RemakeError> {
        let child = self.lock_state()?.children.remove(&handle);
        let child =
            child.ok_or_else(|| RemakeError::Process(format!("unknown handle {handle}")))?;
        let output = child
            .wait_with_output()
            .map_err(|e| RemakeError::Process(e.to_string()))?;
        Ok(ProcessOutput {
            // Killed by a signal: no code.
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn write_line(&self, line: &str) -> Result<(), RemakeError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| RemakeError::Io(e.to_string()))?;
        // Child commands share stdout; keep our lines ordered with theirs.
        out.flush().map_err(|e| RemakeError::Io(e.to_string()))
    }
}

pub struct ProductionRuntime {
    pub file_system: Arc<dyn FileSystem>,
    pub process_runner: Arc<dyn ProcessRunner>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            file_system: Arc::new(ProductionFileSystem),
            process_runner: Arc::new(ProductionProcessRunner::new()),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.add_file(path, contents);
        fs
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, RemakeError> {
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| RemakeError::NotFound(path.to_path_buf()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().expect("files lock").contains_key(path)
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    writes: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }
}

impl Terminal for FakeTerminal {
    fn write_line(&self, line: &str) -> Result<(), RemakeError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }
}

/// Records every spawned request and answers `wait` from a FIFO of queued
/// responses. An empty queue answers with exit code 0.
#[derive(Default, Clone)]
pub struct FakeProcessRunner {
    responses: Arc<Mutex<Vec<Result<ProcessOutput, RemakeError>>>>,
    spawned: Arc<Mutex<Vec<ProcessRequest>>>,
    next_handle: Arc<Mutex<u64>>,
}

impl FakeProcessRunner {
    pub fn push_response(&self, output: Result<ProcessOutput, RemakeError>) {
        self.responses.lock().expect("responses lock").push(output);
    }

    pub fn push_exit_code(&self, exit_code: i32) {
        self.push_response(Ok(ProcessOutput {
            exit_code,
            ..ProcessOutput::default()
        }));
    }

    pub fn spawned(&self) -> Vec<ProcessRequest> {
        self.spawned.lock().expect("spawned lock").clone()
    }

    /// The `-c` payload of every spawned shell request, in order.
    pub fn shell_commands(&self) -> Vec<String> {
        self.spawned()
            .into_iter()
            .filter_map(|request| request.args.last().cloned())
            .collect()
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn spawn(&self, request: ProcessRequest) -> Result<u64, RemakeError> {
        self.spawned.lock().expect("spawned lock").push(request);
        let mut next = self.next_handle.lock().expect("next lock");
        let handle = *next;
        *next += 1;
        Ok(handle)
    }

    fn wait(&self, _handle: u64) -> Result<ProcessOutput, RemakeError> {
        let mut responses = self.responses.lock().expect("responses lock");
        if responses.is_empty() {
            return Ok(ProcessOutput::default());
        }
        responses.remove(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_request_wraps_command_in_dash_c() {
        let request = ProcessRequest::shell("/bin/sh", "cc -c foo.c", Path::new("/work"));
        assert_eq!(request.program, "/bin/sh");
        assert_eq!(request.args, vec!["-c", "cc -c foo.c"]);
        assert_eq!(request.cwd.as_deref(), Some(Path::new("/work")));
        assert_eq!(request.stdio, StdioMode::Inherit);
    }

    #[test]
    fn production_runner_reports_exit_code_and_cwd() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = ProductionProcessRunner::new();
        let mut request = ProcessRequest::shell("/bin/sh", "pwd; exit 3", dir.path());
        request.stdio = StdioMode::Piped;
        let output = runner.run(request).expect("run shell");
        assert_eq!(output.exit_code, 3);
        let reported = std::fs::canonicalize(output.stdout.trim()).expect("canonical pwd");
        let expected = std::fs::canonicalize(dir.path()).expect("canonical tempdir");
        assert_eq!(reported, expected);
    }

    #[test]
    fn production_runner_rejects_unknown_handle() {
        let runner = ProductionProcessRunner::new();
        assert!(matches!(runner.wait(42), Err(RemakeError::Process(_))));
    }

    #[test]
    fn production_file_system_maps_missing_file_to_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.log");
        let err = ProductionFileSystem
            .read_to_string(&missing)
            .expect_err("missing file");
        assert!(matches!(err, RemakeError::NotFound(path) if path == missing));
    }

    #[test]
    fn fake_runner_defaults_to_success_and_records_requests() {
        let runner = FakeProcessRunner::default();
        runner.push_exit_code(2);
        let first = runner
            .run(ProcessRequest::shell("sh", "false", Path::new("/")))
            .expect("first");
        let second = runner
            .run(ProcessRequest::shell("sh", "true", Path::new("/")))
            .expect("second");
        assert_eq!(first.exit_code, 2);
        assert!(second.success());
        assert_eq!(runner.shell_commands(), vec!["false", "true"]);
    }
}
