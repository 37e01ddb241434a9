use std::io::Write;
use std::process::{Command, Output, Stdio};

fn stackvm() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_stackvm"));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn run_with_stdin(args: &[&str], stdin: &str) -> Output {
    let mut child = stackvm()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run stackvm");
    child
        .stdin
        .take()
        .expect("stdin piped")
        .write_all(stdin.as_bytes())
        .expect("failed to write stdin");
    child.wait_with_output().expect("failed to wait on stackvm")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

// --- REPL ---

#[test]
fn repl_quiet_evaluates_lines() {
    let out = run_with_stdin(
        &["repl", "--quiet", "--prompt", ""],
        "2 3 + 4 * println\n12 dup * println\n\"Hello, world!\" dup println println\n",
    );
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "20\n144\nHello, world!\nHello, world!\n");
}

#[test]
fn repl_is_the_default_command() {
    let out = run_with_stdin(&[], "2 3 + 4 * println\n");
    assert!(out.status.success());
    let s = stdout(&out);
    assert!(s.starts_with("Type \"exit\" to quit.\n"), "got: {}", s);
    assert!(s.contains("Constant-folded (2 + 3) to 5\n"), "got: {}", s);
    assert!(s.contains("Constant-folded (5 * 4) to 20\n20\n"), "got: {}", s);
}

#[test]
fn repl_reports_errors_and_continues() {
    let out = run_with_stdin(&["repl", "-q", "--prompt", "", "--no-color"], "foo\n1 0 /\n7 println\n");
    assert!(out.status.success());
    let s = stdout(&out);
    assert!(s.contains("error[SVM-R002]: unknown opcode: 'foo'"), "got: {}", s);
    assert!(s.contains("error[SVM-R003]: division by zero"), "got: {}", s);
    assert!(s.ends_with("7\n"), "got: {}", s);
}

#[test]
fn repl_exit_stops_reading() {
    let out = run_with_stdin(&["repl", "-q", "--prompt", ""], "\"a\" println\nexit\n\"b\" println\n");
    assert!(out.status.success());
    assert_eq!(stdout(&out), "a\n");
}

#[test]
fn repl_json_diagnostics() {
    let out = run_with_stdin(&["repl", "-q", "--prompt", "", "--json"], "\"never closed\n");
    let line = stdout(&out);
    let v: serde_json::Value = serde_json::from_str(line.trim()).expect("valid JSON");
    assert_eq!(v["code"], "SVM-S001");
    assert_eq!(v["severity"], "error");
}

// --- run ---

fn script(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write script");
    file
}

#[test]
fn run_script_with_loop_and_input() {
    let file = script(
        "\"Enter a number: \" print read cast_int\n\
         \"The number \" print dup print \" is \" print\n\
         2 % 0 == \"even.\" \"odd.\" if println\n\
         0 jmp\n",
    );
    let out = run_with_stdin(&["run", file.path().to_str().unwrap()], "4\n9\n");
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(
        stdout(&out),
        "Enter a number: The number 4 is even.\nEnter a number: The number 9 is odd.\nEnter a number: "
    );
}

#[test]
fn run_script_runtime_error_fails() {
    let file = script("1 println\n2 bogus\n");
    let out = run_with_stdin(&["run", "--no-color", file.path().to_str().unwrap()], "");
    assert!(!out.status.success());
    assert_eq!(stdout(&out), "1\n");
    let err = stderr(&out);
    assert!(err.contains("unknown opcode: 'bogus'"), "got: {}", err);
    assert!(err.contains("--> 2:3"), "got: {}", err);
}

#[test]
fn run_script_syntax_error_fails() {
    let file = script("1 2x +\n");
    let out = run_with_stdin(&["run", "--no-color", file.path().to_str().unwrap()], "");
    assert!(!out.status.success());
    assert!(stderr(&out).contains("malformed integer '2x'"));
}

#[test]
fn run_missing_file() {
    let out = run_with_stdin(&["run", "/definitely/not/here.svm"], "");
    assert!(!out.status.success());
    assert!(stderr(&out).contains("Error reading"));
}

#[test]
fn run_fold_warns_about_jumps() {
    let file = script("6 jmp 2 3 + println \"end\" println\n");
    let path = file.path().to_str().unwrap();

    let plain = run_with_stdin(&["run", path], "");
    assert!(plain.status.success());
    assert_eq!(stdout(&plain), "end\n");

    let folded = run_with_stdin(&["run", "--fold", "--no-color", path], "");
    assert!(!folded.status.success());
    let err = stderr(&folded);
    assert!(err.contains("warning[SVM-W001]"), "got: {}", err);
    assert!(err.contains("invalid jump target"), "got: {}", err);
}

#[cfg(unix)]
#[test]
fn run_sigint_interrupts_blocked_read() {
    use std::time::{Duration, Instant};

    let file = script("\"x\" println read println \"after\" println\n");
    let mut child = stackvm()
        .args(["run", file.path().to_str().unwrap()])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run stackvm");
    // Held open so `read` blocks instead of seeing end of input
    let stdin = child.stdin.take();

    std::thread::sleep(Duration::from_millis(500));
    // SAFETY: signals our own child process.
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGINT);
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while child.try_wait().expect("failed to poll stackvm").is_none() {
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("run blocked in read was not interrupted");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    drop(stdin);

    let out = child.wait_with_output().expect("failed to wait on stackvm");
    assert_eq!(out.status.code(), Some(130), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "x\n");
    assert!(stderr(&out).contains("interrupted"));
}

// --- demo / check / parse ---

#[test]
fn demo_runs_all_programs() {
    let out = run_with_stdin(&["demo"], "6\n7\n5\n");
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let s = stdout(&out);
    assert!(s.contains("** Program 1"), "got: {}", s);
    assert!(s.contains("Their product is: 42\n"), "got: {}", s);
    assert!(s.contains("The number 5 is odd.\n"), "got: {}", s);
}

#[test]
fn check_default_program_ok() {
    let out = stackvm().arg("check").output().expect("failed to run stackvm");
    assert!(out.status.success());
    let s = stdout(&out);
    assert!(s.contains("Code after optimization: [25, println]"), "got: {}", s);
    assert!(s.ends_with("Result: OK\n"), "got: {}", s);
}

#[test]
fn parse_emits_json() {
    let out = stackvm()
        .args(["parse", "--fold", "2 3 + \"x\" dup"])
        .output()
        .expect("failed to run stackvm");
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("valid JSON");
    assert_eq!(
        v,
        serde_json::json!([
            {"kind": "int", "value": 5},
            {"kind": "text", "value": "x"},
            {"kind": "op", "value": "dup"},
        ])
    );
}
