//! `Mutex::unlock` ownership violations terminate the process. Each test
//! re-runs itself in a child process with `FOOTHREAD_FATAL_CHILD` set; the
//! child commits the violation and the parent checks how it died.

use std::env;
use std::process::{Command, Output};
use std::sync::Arc;
use std::thread;

use foothread_core::Mutex;

const CHILD_ENV: &str = "FOOTHREAD_FATAL_CHILD";

fn in_child() -> bool {
    env::var_os(CHILD_ENV).is_some()
}

fn rerun(test_name: &str) -> Output {
    let exe = env::current_exe().unwrap();
    Command::new(exe)
        .args([test_name, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, "1")
        .env("FOOTHREAD_LOG", "off")
        .output()
        .unwrap_or_else(|err| panic!("failed to re-run {test_name}: {err}"))
}

fn assert_fatal_unlock(out: &Output, label: &str) {
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert_eq!(
        out.status.code(),
        Some(1),
        "[{label}] expected exit status 1, stderr:\n{stderr}"
    );
    let line = stderr
        .lines()
        .find(|line| line.contains("invariant_violation"))
        .unwrap_or_else(|| panic!("[{label}] no diagnostic, stderr:\n{stderr}"));
    let entry: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(entry["op"], "mutex_unlock", "[{label}]");
    assert_eq!(entry["level"], "fatal", "[{label}]");
    assert_eq!(entry["errno"], libc::EPERM, "[{label}]");
}

#[test]
fn unlock_by_non_owner_is_fatal() {
    if in_child() {
        let mutex = Arc::new(Mutex::new());
        mutex.init().unwrap();
        mutex.lock().unwrap();
        let m = Arc::clone(&mutex);
        let _ = thread::spawn(move || m.unlock()).join();
        return;
    }
    let out = rerun("unlock_by_non_owner_is_fatal");
    assert_fatal_unlock(&out, "non-owner");
}

#[test]
fn double_unlock_is_fatal() {
    if in_child() {
        let mutex = Mutex::new();
        mutex.init().unwrap();
        mutex.lock().unwrap();
        mutex.unlock().unwrap();
        let _ = mutex.unlock();
        return;
    }
    let out = rerun("double_unlock_is_fatal");
    assert_fatal_unlock(&out, "double");
}

#[test]
fn unlock_of_never_locked_mutex_is_fatal() {
    if in_child() {
        let mutex = Mutex::new();
        mutex.init().unwrap();
        let _ = mutex.unlock();
        return;
    }
    let out = rerun("unlock_of_never_locked_mutex_is_fatal");
    assert_fatal_unlock(&out, "never-locked");
}
