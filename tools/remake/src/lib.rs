pub mod config;
pub mod errors;
pub mod hook;
pub mod logging;
pub mod replay;
pub mod runtime;

use clap::{error::ErrorKind, Parser};
use config::{load_config, CliOverrides, EnvMap};
use errors::RemakeError;
use replay::replayer::{ReplayLog, Replayer};
use runtime::ProductionRuntime;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "remake")]
#[command(about = "Re-run recorded build commands whose dependencies exist")]
pub struct Cli {
    /// Replay log written while the build was recorded.
    pub log: PathBuf,
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Prefix removed from targets in progress output.
    #[arg(long)]
    pub strip_prefix: Option<String>,
    /// Append structured replay events to this JSONL file.
    #[arg(long)]
    pub run_log: Option<PathBuf>,
    /// Fail on log lines in the legacy shape instead of upgrading them.
    #[arg(long, default_value_t = false)]
    pub reject_legacy: bool,
}

pub fn run() -> Result<i32, RemakeError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let env = std::env::vars_os().collect::<Vec<_>>();
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &env, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    env: &[(std::ffi::OsString, std::ffi::OsString)],
    runtime: &ProductionRuntime,
) -> Result<i32, RemakeError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(RemakeError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        strip_prefix: cli.strip_prefix.clone(),
        run_log: cli.run_log.clone(),
        reject_legacy: cli.reject_legacy,
    };
    let cfg = load_config(&overrides, &env_to_map(env), runtime.file_system.as_ref())?;

    let log = ReplayLog::load(
        runtime.file_system.as_ref(),
        &cli.log,
        cfg.replay.legacy_records,
    )?;
    if log.upgraded > 0 {
        runtime.terminal.write_line(&format!(
            "upgraded {} legacy record(s) from {}",
            log.upgraded,
            log.path.display()
        ))?;
    }

    let summary = Replayer::from_config(runtime, &cfg).run(&log)?;
    runtime.terminal.write_line(&format!(
        "replay complete: total={} executed={} skipped={} ignored_failures={} recursive={}",
        summary.total,
        summary.executed,
        summary.skipped,
        summary.tolerated_failures,
        summary.filtered_recursive
    ))?;
    Ok(0)
}

fn env_to_map(env: &[(std::ffi::OsString, std::ffi::OsString)]) -> EnvMap {
    let mut map = EnvMap::new();
    for (key, value) in env {
        if let (Some(key), Some(value)) = (key.to_str(), value.to_str()) {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::recording::{BuildStepRecord, DependencyRef};
    use crate::runtime::{FakeFileSystem, FakeProcessRunner, FakeTerminal};
    use std::ffi::OsString;
    use std::sync::Arc;

    struct Fakes {
        fs: FakeFileSystem,
        runner: FakeProcessRunner,
        terminal: FakeTerminal,
        runtime: ProductionRuntime,
    }

    fn fakes() -> Fakes {
        let fs = FakeFileSystem::default();
        let runner = FakeProcessRunner::default();
        let terminal = FakeTerminal::default();
        let runtime = ProductionRuntime {
            file_system: Arc::new(fs.clone()),
            process_runner: Arc::new(runner.clone()),
            terminal: Arc::new(terminal.clone()),
        };
        Fakes {
            fs,
            runner,
            terminal,
            runtime,
        }
    }

    fn args(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    fn line(target: &str, cmd: &str, deps: Vec<DependencyRef>) -> String {
        BuildStepRecord {
            target: target.to_string(),
            command: cmd.to_string(),
            working_directory: PathBuf::from("/proj"),
            dependencies: deps,
            continue_on_error: false,
            is_recursive_invocation: false,
        }
        .to_line()
        .expect("line")
    }

    #[test]
    fn replays_log_and_prints_summary() {
        let f = fakes();
        f.fs.add_file("/proj/a.c", "");
        f.fs.add_file(
            "/proj/replay.log",
            format!(
                "{}\n{}\n",
                line("/proj/a.o", "cc a", vec![DependencyRef::file("a.c")]),
                line("/proj/b.o", "cc b", vec![DependencyRef::file("b.c")]),
            ),
        );

        let code = run_with_runtime(
            &args(&["remake", "/proj/replay.log", "--strip-prefix", "/proj/"]),
            &[],
            &f.runtime,
        )
        .expect("run");
        assert_eq!(code, 0);
        assert_eq!(f.runner.shell_commands(), vec!["cc a"]);
        assert_eq!(
            f.terminal.written_lines(),
            vec![
                "[0/2] making a.o",
                "[1/2] making b.o",
                "SKIP: missing: b.c",
                "replay complete: total=2 executed=1 skipped=1 ignored_failures=0 recursive=0",
            ]
        );
    }

    #[test]
    fn build_root_env_strips_progress_prefix() {
        let f = fakes();
        f.fs.add_file("/proj/replay.log", line("/proj/sub/x.o", "cc x", vec![]));
        let env = vec![(OsString::from("REMAKE_BUILD_ROOT"), OsString::from("/proj/"))];
        run_with_runtime(&args(&["remake", "/proj/replay.log"]), &env, &f.runtime).expect("run");
        assert_eq!(f.terminal.written_lines()[0], "[0/1] making sub/x.o");
    }

    #[test]
    fn missing_log_fails_before_running_anything() {
        let f = fakes();
        let err = run_with_runtime(&args(&["remake", "/proj/none.log"]), &[], &f.runtime)
            .expect_err("missing log");
        assert!(matches!(err, RemakeError::NotFound(_)));
        assert!(f.runner.spawned().is_empty());
    }

    #[test]
    fn parse_error_fails_before_running_anything() {
        let f = fakes();
        f.fs.add_file(
            "/proj/replay.log",
            format!("{}\n{{broken\n", line("/proj/a.o", "cc a", vec![])),
        );
        let err = run_with_runtime(&args(&["remake", "/proj/replay.log"]), &[], &f.runtime)
            .expect_err("parse");
        assert!(matches!(err, RemakeError::Parse { line: 2, .. }));
        assert!(f.runner.spawned().is_empty());
    }

    #[test]
    fn legacy_lines_are_reported_or_rejected() {
        let f = fakes();
        f.fs.add_file(
            "/proj/replay.log",
            r#"{"file":"/proj/a.o","cmd":"cc a","cwd":"/proj","deps":[],"recmake":false}"#,
        );
        run_with_runtime(&args(&["remake", "/proj/replay.log"]), &[], &f.runtime).expect("run");
        assert_eq!(
            f.terminal.written_lines()[0],
            "upgraded 1 legacy record(s) from /proj/replay.log"
        );

        let err = run_with_runtime(
            &args(&["remake", "/proj/replay.log", "--reject-legacy"]),
            &[],
            &f.runtime,
        )
        .expect_err("reject");
        assert!(matches!(err, RemakeError::Parse { line: 1, .. }));
    }

    #[test]
    fn missing_positional_is_cli_error_and_help_is_success() {
        let f = fakes();
        let err = run_with_runtime(&args(&["remake"]), &[], &f.runtime).expect_err("no log");
        assert!(matches!(err, RemakeError::Cli(_)));
        assert_eq!(
            run_with_runtime(&args(&["remake", "--help"]), &[], &f.runtime).expect("help"),
            0
        );
    }
}
