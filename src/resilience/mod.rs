//! Crash recovery and self-healing for the daemon process.
//!
//! The process is meant to stay up under an external supervisor (systemd,
//! a container restart policy). When it can't, a panic should still land a
//! readable crash report rather than a silent exit.

pub mod crash_log;
pub mod checkpoint;
pub mod supervisor;

use std::panic;

/// Install panic hooks for crash reporting.
///
/// Installs color_eyre for formatted panic reports, then wraps its hook
/// with crash logging so an on-call engineer has a JSON report to read
/// after the process restarts.
pub fn install_panic_hooks() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        if let Err(e) = crash_log::log_panic(panic_info) {
            eprintln!("failed to log crash: {e}");
        }
        default_hook(panic_info);
    }));

    Ok(())
}
