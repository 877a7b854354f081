use assert_cmd::cargo::cargo_bin_cmd;
use remake::replay::recording::{BuildStepRecord, DependencyRef};

fn write_log(dir: &std::path::Path, records: &[BuildStepRecord]) -> std::path::PathBuf {
    let path = dir.join("replay.log");
    let text = records
        .iter()
        .map(|r| r.to_line().expect("line"))
        .collect::<Vec<_>>()
        .join("\n");
    std::fs::write(&path, text).expect("write log");
    path
}

fn record(dir: &std::path::Path, target: &str, cmd: &str) -> BuildStepRecord {
    BuildStepRecord {
        target: dir.join(target).display().to_string(),
        command: cmd.to_string(),
        working_directory: dir.to_path_buf(),
        dependencies: vec![],
        continue_on_error: false,
        is_recursive_invocation: false,
    }
}

#[test]
fn help_lists_replay_flags() {
    let mut cmd = cargo_bin_cmd!("remake");
    cmd.arg("--help");
    let out = cmd.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");

    assert!(stdout.contains("<LOG>"));
    assert!(stdout.contains("--strip-prefix"));
    assert!(stdout.contains("--reject-legacy"));
}

#[test]
fn replay_runs_commands_and_exits_zero() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut skipped = record(temp.path(), "y.o", "touch y.o");
    skipped.dependencies = vec![DependencyRef::file("y.c")];
    let log = write_log(temp.path(), &[record(temp.path(), "x.o", "touch x.o"), skipped]);

    let mut cmd = cargo_bin_cmd!("remake");
    cmd.arg(&log)
        .arg("--strip-prefix")
        .arg(format!("{}/", temp.path().display()))
        .env_remove("REMAKE_CONFIG");
    let out = cmd.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");

    assert!(stdout.contains("[0/2] making x.o"));
    assert!(stdout.contains("SKIP: missing: y.c"));
    assert!(temp.path().join("x.o").exists());
    assert!(!temp.path().join("y.o").exists());
}

#[test]
fn missing_log_exits_nonzero() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("remake");
    cmd.arg(temp.path().join("absent.log"));
    let out = cmd.assert().failure();
    let stderr = String::from_utf8(out.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("not found"));
}

#[test]
fn fatal_command_failure_exits_nonzero() {
    let temp = tempfile::tempdir().expect("tempdir");
    let log = write_log(
        temp.path(),
        &[record(temp.path(), "bad", "exit 9"), record(temp.path(), "z", "touch z")],
    );
    let mut cmd = cargo_bin_cmd!("remake");
    cmd.arg(&log);
    let out = cmd.assert().failure();
    let stderr = String::from_utf8(out.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("exit status 9"));
    assert!(!temp.path().join("z").exists());
}

#[test]
fn run_log_captures_replay_events() {
    let temp = tempfile::tempdir().expect("tempdir");
    let log = write_log(temp.path(), &[record(temp.path(), "x.o", "touch x.o")]);
    let run_log = temp.path().join("events/run.jsonl");

    let mut cmd = cargo_bin_cmd!("remake");
    cmd.arg(&log).arg("--run-log").arg(&run_log);
    cmd.assert().success();

    let text = std::fs::read_to_string(&run_log).expect("run log");
    assert!(text.contains("\"event_type\":\"replay_started\""));
    assert!(text.contains("\"event_type\":\"replay_finished\""));
}
