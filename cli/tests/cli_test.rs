//! Integration tests for the `lunar` driver
//!
//! Each test writes a script to a temporary file, runs the built binary on it
//! with piped standard streams and inspects what it printed.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use indoc::indoc;
use serde_json::json;
use tempfile::{NamedTempFile, TempDir};

fn write_file(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("write test file");
    path
}

/// Runs `lunar` with `args`, feeding `stdin` to it.
fn run_lunar(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_lunar"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start lunar");

    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(stdin.as_bytes())
        .expect("failed to write stdin");

    let output = child.wait_with_output().expect("failed to wait for lunar");
    eprintln!(
        "--- stdout ---\n{}\n--- stderr ---\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}

const COUNTER: &str = indoc! {r#"
    return function()
      for i = 1, 3 do
        print("tick", i)
        coroutine.yield()
      end
    end
"#};

#[test]
fn runs_a_script_until_it_finishes() {
    let dir = TempDir::new().unwrap();
    let script = write_file(&dir, "counter.lua", COUNTER);

    let output = run_lunar(&[path_arg(&script)], "");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("tick\t1"));
    assert!(stdout.contains("tick\t3"));
}

#[test]
fn tick_limit_stops_early() {
    let dir = TempDir::new().unwrap();
    let script = write_file(&dir, "counter.lua", COUNTER);

    let output = run_lunar(&["--ticks", "2", path_arg(&script)], "");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("tick\t2"));
    assert!(!stdout.contains("tick\t3"));
}

#[test]
fn load_failures_exit_with_an_error() {
    let dir = TempDir::new().unwrap();
    let script = write_file(&dir, "number.lua", "return 42\n");

    let output = run_lunar(&[path_arg(&script)], "");
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("expected a function or a coroutine"));
}

#[test]
fn script_faults_exit_with_an_error() {
    let dir = TempDir::new().unwrap();
    let script = write_file(
        &dir,
        "fault.lua",
        indoc! {r#"
            return function()
              coroutine.yield()
              error("engine overheated")
            end
        "#},
    );

    let output = run_lunar(&[path_arg(&script)], "");
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Uncaught"));
    assert!(stderr.contains("engine overheated"));
}

#[test]
fn config_is_exposed_as_a_global_table() {
    let dir = TempDir::new().unwrap();
    let config = write_file(
        &dir,
        "config.json",
        &json!({ "name": "scout", "speed": 3, "armed": "TRUE" }).to_string(),
    );
    let script = write_file(
        &dir,
        "config.lua",
        indoc! {r#"
            return function()
              print(config.name, config.speed * 2, config.armed)
            end
        "#},
    );

    let output = run_lunar(&["--config", path_arg(&config), path_arg(&script)], "");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("scout\t6\ttrue"));
}

#[test]
fn host_library_is_available() {
    let dir = TempDir::new().unwrap();
    let script = write_file(
        &dir,
        "host.lua",
        indoc! {r#"
            return function()
              host.log("starting")
              print(type(host.time()))
              print(host.configure({ b = 1, a = "x", list = { true, 2.5 } }))
            end
        "#},
    );

    let output = run_lunar(&["--verbose", path_arg(&script)], "");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success());
    assert!(stdout.contains("number"));
    assert!(stdout.contains(r#"{"a":"x","b":1,"list":[true,2.5]}"#));
    assert!(stderr.contains("starting"));
}

#[test]
fn line_breakpoint_opens_the_interactive_loop() {
    let dir = TempDir::new().unwrap();
    let script = write_file(&dir, "counter.lua", COUNTER);
    let site = format!("{}:3", path_arg(&script));

    let output = run_lunar(
        &["--break-line", &site, path_arg(&script)],
        "p i * 10\nc\np i * 10\nc\np i * 10\nc\n",
    );
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("->    3"));
    assert!(stdout.contains(">>> 10"));
    assert!(stdout.contains(">>> 30"));
    assert_eq!(stdout.matches("continue").count(), 3);
}

#[test]
fn function_breakpoints_from_a_file() {
    let dir = TempDir::new().unwrap();
    let script = write_file(
        &dir,
        "helper.lua",
        indoc! {r#"
            local function helper(x)
              return x + 1
            end
            return function()
              coroutine.yield(helper(1))
            end
        "#},
    );
    let mut breakpoints = NamedTempFile::new_in(dir.path()).unwrap();
    write!(
        breakpoints,
        "{}",
        json!([{ "function": { "name": "helper" } }])
    )
    .unwrap();

    let output = run_lunar(
        &[
            "--breakpoints",
            path_arg(breakpoints.path()),
            path_arg(&script),
        ],
        "bt\nc\n",
    );
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("(0) helper at "));
}

#[test]
fn exhausted_stdin_lets_the_script_finish() {
    let dir = TempDir::new().unwrap();
    let script = write_file(&dir, "counter.lua", COUNTER);

    let output = run_lunar(&["--step", path_arg(&script)], "");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("tick\t3"));
}

#[test]
fn invalid_break_line_is_rejected() {
    let dir = TempDir::new().unwrap();
    let script = write_file(&dir, "counter.lua", COUNTER);

    let output = run_lunar(&["--break-line", "nowhere", path_arg(&script)], "");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("FILE:LINE"));
}
