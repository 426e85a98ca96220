use crate::PackageError;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// First Ctrl-C asks the pipeline to stop at the next stage boundary; a
/// second one exits immediately.
pub fn install_signal_handler() {
    let installed = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(130);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\ninterrupt received, cleaning up...");
    });
    if let Err(e) = installed {
        warn!("failed to install Ctrl-C handler: {e}");
    }
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

pub(crate) fn check_interrupted() -> Result<(), PackageError> {
    if shutdown_requested() {
        return Err(PackageError::Interrupted);
    }
    Ok(())
}
