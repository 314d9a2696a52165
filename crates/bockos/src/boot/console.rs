//! Waiting for the console container.

use std::path::Path;
use std::time::Duration;

/// Poll interval for the console-ready sentinel.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Block until `sentinel` exists. There is no timeout.
pub async fn wait_for_console(sentinel: &Path, interval: Duration) {
    let mut polls: u64 = 0;
    while !sentinel.exists() {
        if polls == 0 {
            tracing::info!(sentinel = %sentinel.display(), "Waiting for console");
        }
        polls += 1;
        tokio::time::sleep(interval).await;
    }
    tracing::debug!(polls, "Console ready");
}
