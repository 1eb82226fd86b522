//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

/// Granularity at which sleeps notice a raised stop signal.
pub const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Shared stop flag, raised by Ctrl-C or by the owner.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    raised: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Raise this signal on SIGINT/SIGTERM. Only one handler per process.
    pub fn install_ctrlc(&self) -> Result<()> {
        let signal = self.clone();
        ctrlc::set_handler(move || {
            if signal.is_raised() {
                log::warn!("second interrupt received, still shutting down");
            } else {
                log::info!("shutdown signal received");
            }
            signal.raise();
        })
        .context("error setting Ctrl-C handler")
    }

    /// Sleep for `duration` in slices. Returns `false` if interrupted.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_raised() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}
