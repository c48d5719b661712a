//! Cancellable delay used between retry attempts.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleeps for `duration` unless `token` fires first.
///
/// Returns `true` if the full delay elapsed and `false` if it was cut short.
pub async fn sleep(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
