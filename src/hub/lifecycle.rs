//! Background task startup and graceful shutdown

use super::StickerHub;

impl StickerHub {
    /// Spawn the retention janitor if it is enabled and not already running
    ///
    /// Returns whether a janitor is running after the call.
    pub fn start_janitor(&self) -> bool {
        if !self.config.retention.enabled {
            tracing::info!("retention janitor disabled");
            return false;
        }

        let mut task = self.janitor_task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return true;
        }
        *task = Some(tokio::spawn(self.janitor().run()));
        true
    }

    /// Stop background tasks and wait for the janitor to finish its current sweep
    ///
    /// In-flight builds are not interrupted; they hold their own locks and
    /// finish or roll back on their own.
    pub async fn shutdown(&self) {
        tracing::info!("initiating graceful shutdown");
        self.cancel.cancel();

        let handle = self
            .janitor_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "janitor task ended abnormally");
        }
        tracing::info!("shutdown complete");
    }

    /// Whether shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use crate::StickerHub;
    use crate::hub::test_helpers::{FakeOrigin, test_config};
    use crate::types::Event;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    async fn hub(dir: &Path, enabled: bool) -> StickerHub {
        let mut config = test_config(dir);
        config.retention.enabled = enabled;
        config.retention.retention = Duration::ZERO;
        config.retention.sweep_interval = Duration::from_millis(20);
        StickerHub::new(config, Arc::new(FakeOrigin::default()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_janitor_evicts_then_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let hub = hub(dir.path(), true).await;
        std::fs::create_dir_all(dir.path().join("Old")).unwrap();
        let mut events = hub.subscribe();

        assert!(hub.start_janitor());
        assert!(hub.start_janitor(), "second start reuses the running task");

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, Event::Evicted { .. }));
        assert!(!dir.path().join("Old").exists());

        tokio::time::timeout(Duration::from_secs(2), hub.shutdown())
            .await
            .unwrap();
        assert!(hub.is_shutting_down());
    }

    #[tokio::test]
    async fn test_disabled_janitor_does_not_start() {
        let dir = tempfile::tempdir().unwrap();
        let hub = hub(dir.path(), false).await;
        assert!(!hub.start_janitor());
        hub.shutdown().await;
    }
}
