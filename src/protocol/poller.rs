//! Pull-mode worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::PollingConfig;
use crate::zone::Zone;

/// Counters kept by the pull worker.
#[derive(Debug, Default)]
pub struct PollStats {
    attempts: AtomicU64,
    messages: AtomicU64,
    sleeps: AtomicU64,
    failures: AtomicU64,
}

impl PollStats {
    /// Calls made to the dispatcher.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Polls that returned a message.
    pub fn messages(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    /// Error-delay sleeps (zone sleeping or not connected).
    pub fn sleeps(&self) -> u64 {
        self.sleeps.load(Ordering::Relaxed)
    }

    /// Polls that failed and were logged.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Poll `zone` until stopped, the zone shuts down, or the zone demands push.
pub(crate) async fn run(
    zone: Arc<Zone>,
    polling: PollingConfig,
    stats: Arc<PollStats>,
    mut stop: watch::Receiver<bool>,
) {
    let zone_id = zone.id().to_string();
    tracing::info!(zone_id = %zone_id, "Pull worker started");

    loop {
        if *stop.borrow() {
            break;
        }
        if zone.is_shut_down() {
            tracing::info!(zone_id = %zone_id, "Zone shut down, pull worker exiting");
            break;
        }

        let delay = if zone.is_connected() {
            stats.attempts.fetch_add(1, Ordering::Relaxed);
            let pulled = tokio::select! {
                pulled = zone.dispatcher().pull() => pulled,
                _ = stop.changed() => break,
            };

            match pulled {
                Ok(n) if n < 0 => {
                    tracing::debug!(zone_id = %zone_id, "Zone sleeping");
                    stats.sleeps.fetch_add(1, Ordering::Relaxed);
                    polling.error_delay()
                },
                Ok(_) => {
                    stats.messages.fetch_add(1, Ordering::Relaxed);
                    polling.frequency()
                },
                Err(e) if e.is_push_mode_expected() => {
                    tracing::error!(zone_id = %zone_id, "Zone expects push delivery, pull worker stopped: {}", e);
                    break;
                },
                Err(e) => {
                    stats.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(zone_id = %zone_id, "Pull failed: {}", e);
                    polling.frequency()
                },
            }
        } else {
            tracing::debug!(zone_id = %zone_id, "Not connected, waiting");
            stats.sleeps.fetch_add(1, Ordering::Relaxed);
            polling.error_delay()
        };

        if !pause(delay, &mut stop).await {
            break;
        }
    }

    tracing::info!(zone_id = %zone_id, "Pull worker stopped");
}

/// Sleep for `delay`; false if stopped first.
async fn pause(delay: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => true,
        _ = stop.changed() => false,
    }
}
