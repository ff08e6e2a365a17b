//! Graceful shutdown coordination.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

use crate::logger::{self, LogTag};

/// Process-wide shutdown flag plus wakeup for async waiters.
pub struct ShutdownManager {
    requested: AtomicBool,
    notify: Notify,
}

pub static SHUTDOWN: Lazy<ShutdownManager> = Lazy::new(|| ShutdownManager {
    requested: AtomicBool::new(false),
    notify: Notify::new(),
});

impl ShutdownManager {
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested. The flag is re-checked after
    /// registering so a request racing the registration is never missed.
    pub async fn wait(&self) {
        if self.is_requested() {
            return;
        }
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_requested() {
            return;
        }
        notified.await;
    }
}

/// Route Ctrl+C into the shutdown flag.
pub fn install_shutdown_handlers() -> Result<()> {
    ctrlc::set_handler(|| {
        logger::info(LogTag::System, "Interrupt received, shutting down");
        SHUTDOWN.request();
    })
    .context("failed to install interrupt handler")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_resolves_after_request() {
        let manager = ShutdownManager {
            requested: AtomicBool::new(false),
            notify: Notify::new(),
        };
        assert!(!manager.is_requested());

        manager.request();
        assert!(manager.is_requested());
        // Must not hang when the request came first.
        manager.wait().await;
    }
}
