//! SIGINT/SIGTERM handling for the driver.
//!
//! The signals are blocked in the calling thread, so every thread created
//! afterwards inherits the mask, and a dedicated thread collects them with
//! `sigwait`. On delivery it shuts the runtime down, prints
//! `Exiting Gracefully` and exits with status 0.

use std::io::{self, Write};
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::thread;

use foothread_core::Runtime;
use foothread_core::log::{self, LogEntry, LogLevel};

/// Install the handler. Call before creating any other thread.
pub fn install_shutdown_handler(runtime: Arc<Runtime>) -> io::Result<()> {
    let set = termination_set();
    // SAFETY: `set` is a fully initialized signal set.
    let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut()) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }

    thread::Builder::new()
        .name("foothread-signals".to_string())
        .spawn(move || {
            let signal = wait_for(&set);
            // Hold stdout so nothing else is printed after the farewell.
            let mut stdout = io::stdout().lock();
            log::emit(
                &LogEntry::new(LogLevel::Info, "signal_shutdown")
                    .with_details(serde_json::json!({ "signal": signal })),
            );
            runtime.shutdown();
            let _ = writeln!(stdout, "Exiting Gracefully");
            let _ = stdout.flush();
            std::process::exit(0);
        })?;
    Ok(())
}

fn termination_set() -> libc::sigset_t {
    let mut set = MaybeUninit::<libc::sigset_t>::uninit();
    // SAFETY: sigemptyset initializes the set; sigaddset only touches an
    // initialized set and cannot fail for these valid signal numbers.
    unsafe {
        libc::sigemptyset(set.as_mut_ptr());
        libc::sigaddset(set.as_mut_ptr(), libc::SIGINT);
        libc::sigaddset(set.as_mut_ptr(), libc::SIGTERM);
        set.assume_init()
    }
}

fn wait_for(set: &libc::sigset_t) -> i32 {
    loop {
        let mut signal = 0;
        // SAFETY: `set` is initialized and `signal` is a valid out-pointer.
        if unsafe { libc::sigwait(set, &mut signal) } == 0 {
            return signal;
        }
    }
}
