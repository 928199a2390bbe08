//! End-to-end tests for the installed signal handler.
//!
//! Signal handlers and the exit-action environment override are process
//! global, so each scenario runs in a child process: the parent re-executes
//! this test binary filtered down to `child_entry` with a mode in the
//! environment, then asserts on the child's stderr and exit status.

use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};

use sigtrace::{ExitAction, SignalError};

const MODE_ENV: &str = "SIGTRACE_TEST_CHILD_MODE";

static CALLBACK_COUNT: AtomicUsize = AtomicUsize::new(0);

fn count_signal(_sig: libc::c_int) {
    CALLBACK_COUNT.fetch_add(1, Ordering::SeqCst);
}

/// Entry point for the child side of every scenario. Does nothing unless
/// the parent set the mode variable.
#[test]
fn child_entry() {
    let mode = match std::env::var(MODE_ENV) {
        Ok(mode) => mode,
        Err(_) => return,
    };
    match mode.as_str() {
        "return" => child_return(),
        "segv" => child_segv(),
        "override-return" => child_override_return(),
        "override-reraise" => child_override_reraise(),
        "override-bad" => child_override_bad(),
        other => panic!("unknown child mode {other:?}"),
    }
}

fn child_return() {
    sigtrace::register(libc::SIGUSR1, ExitAction::Return, Some(count_signal)).unwrap();
    unsafe { libc::raise(libc::SIGUSR1) };
    // Only reached when the handler returned and resumed us.
    assert_eq!(CALLBACK_COUNT.load(Ordering::SeqCst), 1);
    eprintln!("resumed after raise");
}

fn child_segv() {
    sigtrace::register_fatal_defaults().unwrap();
    let target = std::hint::black_box(std::ptr::null_mut::<u8>());
    unsafe { target.write_volatile(1) };
    unreachable!("store through the null pointer did not fault");
}

fn child_override_return() {
    // Caller asks for Exit; the environment forces Return.
    sigtrace::register(libc::SIGUSR2, ExitAction::Exit, None).unwrap();
    unsafe { libc::raise(libc::SIGUSR2) };
    eprintln!("resumed under override");
}

fn child_override_reraise() {
    // Caller asks for Return; the environment forces a re-raise with the
    // default disposition, which terminates on SIGUSR2.
    sigtrace::register(libc::SIGUSR2, ExitAction::Return, None).unwrap();
    unsafe { libc::raise(libc::SIGUSR2) };
    unreachable!("re-raised signal did not terminate the process");
}

fn child_override_bad() {
    let err = sigtrace::register(libc::SIGUSR2, ExitAction::Return, None).unwrap_err();
    assert!(matches!(err, SignalError::InvalidOverride(_)));
    eprintln!("override rejected");
}

fn run_child(mode: &str, env: &[(&str, &str)]) -> Output {
    let exe = std::env::current_exe().unwrap();
    let mut cmd = Command::new(exe);
    cmd.args(["child_entry", "--exact", "--nocapture", "--test-threads=1"])
        .env_remove(sigtrace::EXIT_ACTION_ENV)
        .env(MODE_ENV, mode);
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.output().expect("failed to spawn child test process")
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_return_action_reports_and_resumes() {
    let output = run_child("return", &[]);
    let stderr = stderr_of(&output);
    assert!(output.status.success(), "child failed:\n{stderr}");
    assert!(stderr.contains("Received signal"), "stderr:\n{stderr}");
    assert!(stderr.contains("USR1 - User-defined signal 1"));
    assert!(stderr.contains("Backtrace:"));
    // The counting callback ran exactly once and execution resumed.
    assert!(stderr.contains("resumed after raise"));
}

#[test]
fn test_fatal_defaults_report_segfault() {
    let output = run_child("segv", &[]);
    let stderr = stderr_of(&output);
    assert!(!output.status.success());
    assert!(
        stderr.contains("SEGV - Invalid memory reference"),
        "stderr:\n{stderr}"
    );
    assert!(stderr.contains("Fault occurred at address 0x000000000000"));
    assert!(stderr.contains("Backtrace:"));
}

#[test]
fn test_env_override_forces_exit() {
    let output = run_child("return", &[(sigtrace::EXIT_ACTION_ENV, "EXIT")]);
    let stderr = stderr_of(&output);
    assert!(!output.status.success());
    assert!(stderr.contains("Received signal"));
    assert!(!stderr.contains("resumed after raise"));
}

#[test]
fn test_env_override_forces_return() {
    let output = run_child("override-return", &[(sigtrace::EXIT_ACTION_ENV, "RETURN")]);
    let stderr = stderr_of(&output);
    assert!(output.status.success(), "child failed:\n{stderr}");
    assert!(stderr.contains("USR2 - User-defined signal 2"));
    assert!(stderr.contains("resumed under override"));
}

#[test]
fn test_env_override_forces_reraise() {
    let output = run_child(
        "override-reraise",
        &[(sigtrace::EXIT_ACTION_ENV, "RERAISE")],
    );
    assert_eq!(output.status.signal(), Some(libc::SIGUSR2));
    assert!(stderr_of(&output).contains("USR2"));
}

#[test]
fn test_env_override_rejects_unknown_value() {
    let output = run_child("override-bad", &[(sigtrace::EXIT_ACTION_ENV, "BOGUS")]);
    let stderr = stderr_of(&output);
    assert!(output.status.success(), "child failed:\n{stderr}");
    assert!(stderr.contains("override rejected"));
}

#[test]
fn test_unknown_signal_is_rejected_in_process() {
    // Fails before anything is installed, so this is safe in the parent.
    assert!(matches!(
        sigtrace::register(4096, ExitAction::Exit, None),
        Err(SignalError::UnknownSignal(4096))
    ));
}
