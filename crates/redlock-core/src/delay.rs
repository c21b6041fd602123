use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Sleeps for `duration` unless `cancel` fires first.
///
/// Returns `false` when cancelled. Cancellation is the normal shutdown path,
/// not an error.
pub(crate) async fn silently_cancelled_delay(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
