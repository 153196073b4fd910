// src/exec/signals.rs

//! External kill/cancel requests.
//!
//! Listeners only flip atomics. The executor's wait loop reads them once per
//! poll tick and does all state changes itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::ExecError;

/// An interruption observed by the wait loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Kill,
    Cancel,
}

/// Shared kill and cancel flags.
#[derive(Debug, Clone, Default)]
pub struct SignalFlags {
    kill: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
}

impl SignalFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_kill(&self) {
        self.kill.store(true, Ordering::SeqCst);
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Kill wins over cancel when both are set at the same tick.
    pub fn pending(&self) -> Option<Interrupt> {
        if self.kill.load(Ordering::SeqCst) {
            Some(Interrupt::Kill)
        } else if self.cancel.load(Ordering::SeqCst) {
            Some(Interrupt::Cancel)
        } else {
            None
        }
    }
}

/// Route SIGTERM and SIGINT to kill, SIGUSR1 to cancel.
///
/// Must be called inside a tokio runtime. The listener tasks live until
/// aborted or the runtime shuts down.
#[cfg(unix)]
pub fn install_handlers(flags: &SignalFlags) -> Result<Vec<JoinHandle<()>>, ExecError> {
    use tokio::signal::unix::{SignalKind, signal};

    let routes = [
        (SignalKind::terminate(), Interrupt::Kill, "SIGTERM"),
        (SignalKind::interrupt(), Interrupt::Kill, "SIGINT"),
        (SignalKind::user_defined1(), Interrupt::Cancel, "SIGUSR1"),
    ];

    let mut handles = Vec::with_capacity(routes.len());
    for (kind, interrupt, label) in routes {
        let mut stream = signal(kind).map_err(ExecError::Signal)?;
        let flags = flags.clone();
        handles.push(tokio::spawn(async move {
            while stream.recv().await.is_some() {
                info!(signal = label, ?interrupt, "signal received");
                match interrupt {
                    Interrupt::Kill => flags.request_kill(),
                    Interrupt::Cancel => flags.request_cancel(),
                }
            }
        }));
    }

    debug!("signal handlers installed");
    Ok(handles)
}

#[cfg(not(unix))]
pub fn install_handlers(flags: &SignalFlags) -> Result<Vec<JoinHandle<()>>, ExecError> {
    let flags = flags.clone();
    Ok(vec![tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            flags.request_kill();
        }
    })])
}
