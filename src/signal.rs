//! Signal handling for graceful shutdown.
//!
//! Centralized Ctrl+C handling for long cache operations (preload,
//! repair, batch prefetch). An `AtomicBool` flag is shared across
//! threads; workers poll it between items and stop cooperatively, so an
//! interrupted repair leaves the previous index intact instead of a
//! half-applied one.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Centralized shutdown handler for graceful termination.
///
/// Wraps an `AtomicBool` flag that is set when Ctrl+C is received. Clone
/// freely; all clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with the flag initially unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Manually request a shutdown.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// The shared flag, for passing to preload/repair/prefetch workers.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// Install the Ctrl+C handler and return the shared [`ShutdownHandler`].
///
/// # Errors
///
/// Returns the `ctrlc` error when a handler is already installed for
/// this process.
pub fn install_handler() -> Result<ShutdownHandler, ctrlc::Error> {
    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();

    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let mut stderr = std::io::stderr();
        let _ = writeln!(stderr, "\nInterrupted. Cleaning up...");
        let _ = stderr.flush();
    })?;

    Ok(handler)
}
