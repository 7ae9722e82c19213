//! Graceful Shutdown Handler
//!
//! Cancellation is cooperative: long-running loops check the handle at
//! generation/epoch/cycle boundaries and stop there, so the last committed
//! state is never torn.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM, SIGINT or an explicit request
    Graceful,
    /// SIGQUIT; same boundaries, but callers may skip optional final work
    Urgent,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Urgent => write!(f, "urgent"),
        }
    }
}

/// Cloneable shutdown flag shared by every task
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<Option<ShutdownSignal>>>,
    rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request shutdown. The first signal wins.
    pub fn trigger(&self, signal: ShutdownSignal) {
        let changed = self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(signal);
                true
            } else {
                false
            }
        });
        if changed {
            info!(%signal, "Shutdown requested");
        }
    }

    pub fn is_requested(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn signal(&self) -> Option<ShutdownSignal> {
        *self.rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ShutdownSignal>> {
        self.tx.subscribe()
    }

    /// Resolve once shutdown has been requested
    pub async fn wait(&self) -> ShutdownSignal {
        let mut rx = self.subscribe();
        loop {
            if let Some(signal) = *rx.borrow_and_update() {
                return signal;
            }
            if rx.changed().await.is_err() {
                return ShutdownSignal::Graceful;
            }
        }
    }
}

/// Helper to install OS signal handlers
pub fn install_signal_handlers(shutdown: ShutdownHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        for (kind, name, sig) in [
            (SignalKind::terminate(), "SIGTERM", ShutdownSignal::Graceful),
            (SignalKind::interrupt(), "SIGINT", ShutdownSignal::Graceful),
            (SignalKind::quit(), "SIGQUIT", ShutdownSignal::Urgent),
        ] {
            let shutdown = shutdown.clone();
            match signal(kind) {
                Ok(mut stream) => {
                    tokio::spawn(async move {
                        stream.recv().await;
                        info!("Received {}", name);
                        shutdown.trigger(sig);
                    });
                }
                Err(e) => warn!(error = %e, "Failed to install {} handler", name),
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C");
                    shutdown.trigger(ShutdownSignal::Graceful);
                }
                Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
            }
        });
    }
}
