//! Graceful shutdown on termination signals
//!
//! Signal handlers only flip a shared flag. The event loop polls it once per
//! iteration and hands the editor to [`crate::editor::Host::shutdown`]
//! itself, so no editor state is touched from signal context.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::SigId;

/// Signals that request a graceful exit
pub const SHUTDOWN_SIGNALS: [libc::c_int; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Flag set once any shutdown signal arrives
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the flag for every signal in [`SHUTDOWN_SIGNALS`]
    pub fn install(&self) -> io::Result<Vec<SigId>> {
        let ids = SHUTDOWN_SIGNALS
            .iter()
            .map(|sig| signal_hook::flag::register(*sig, Arc::clone(&self.0)))
            .collect::<io::Result<Vec<_>>>()?;
        tracing::debug!("Shutdown handlers installed for {} signals", ids.len());
        Ok(ids)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Request shutdown without a signal
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Undo [`ShutdownFlag::install`]
pub fn uninstall(ids: Vec<SigId>) {
    for id in ids {
        signal_hook::low_level::unregister(id);
    }
}
