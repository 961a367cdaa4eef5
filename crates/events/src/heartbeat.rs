use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::broadcaster::Broadcaster;
use crate::event::ProgressEvent;

/// Interval between heartbeat events.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Spawn a background task that publishes a heartbeat event to every
/// subscriber on a fixed interval, independent of job activity.
///
/// The task exits when `cancel` is triggered.
pub fn start_heartbeat(
    broadcaster: Arc<Broadcaster>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Heartbeat task cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let delivered = broadcaster.publish(ProgressEvent::heartbeat()).await;
                    tracing::trace!(delivered, "Heartbeat published");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[tokio::test(start_paused = true)]
    async fn publishes_until_cancelled() {
        let broadcaster = Arc::new(Broadcaster::new());
        let mut sub = broadcaster.subscribe().await;
        let cancel = CancellationToken::new();

        let handle = start_heartbeat(Arc::clone(&broadcaster), Duration::from_secs(5), cancel.clone());

        // First tick fires immediately, the second after one interval.
        for _ in 0..2 {
            let event = sub.recv().await.unwrap();
            assert!(matches!(event.kind, EventKind::Heartbeat));
            assert!(event.project.is_none());
        }

        cancel.cancel();
        handle.await.unwrap();
        assert!(sub.try_recv().is_err());
    }
}
