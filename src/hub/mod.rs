//! The collection hub: cache, per-collection locking and build orchestration
//!
//! `StickerHub` is organized by concern:
//! - [`build`] - request handling and the fetch, normalize, pack pipeline
//! - [`lifecycle`] - janitor startup and shutdown

mod build;
mod lifecycle;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::janitor::Janitor;
use crate::layout::CollectionLayout;
use crate::locks::CollectionLocks;
use crate::manifest::Manifest;
use crate::normalizer::Normalizer;
use crate::origin::{BotApiOrigin, Origin};
use crate::packer::Packer;
use crate::types::{ArchivePart, BuildReport, CollectionName, CollectionState, ConversionStatus, Event};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Pipeline stages shared by every build
#[derive(Clone)]
pub(crate) struct Pipeline {
    pub(crate) fetcher: Arc<Fetcher>,
    pub(crate) normalizer: Arc<Normalizer>,
    pub(crate) packer: Packer,
}

/// Main hub instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct StickerHub {
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// Source of collection metadata and item bytes
    pub(crate) origin: Arc<dyn Origin>,
    /// Per-collection named mutexes shared with the janitor
    pub(crate) locks: CollectionLocks,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Fetch, normalize and pack stages
    pub(crate) pipeline: Pipeline,
    /// Cancels background tasks on shutdown
    pub(crate) cancel: CancellationToken,
    /// Running janitor task, if started
    pub(crate) janitor_task: Arc<std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl StickerHub {
    /// Create a hub over an arbitrary origin
    ///
    /// Validates the configuration and creates the hub directory.
    pub async fn new(config: Config, origin: Arc<dyn Origin>) -> Result<Self> {
        config.validate()?;
        tokio::fs::create_dir_all(config.hub_dir()).await?;

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let workers = config.pipeline.workers;
        let pipeline = Pipeline {
            fetcher: Arc::new(Fetcher::new(origin.clone(), workers, config.retry.clone())),
            normalizer: Arc::new(Normalizer::new(config.converter.clone(), workers)),
            packer: Packer::new(config.pipeline.archive_ceiling_bytes),
        };

        tracing::info!(
            hub_dir = ?config.hub_dir(),
            workers,
            origin = origin.name(),
            "sticker hub ready"
        );

        Ok(Self {
            config: Arc::new(config),
            origin,
            locks: CollectionLocks::new(),
            event_tx,
            pipeline,
            cancel: CancellationToken::new(),
            janitor_task: Arc::new(std::sync::Mutex::new(None)),
        })
    }

    /// Create a hub backed by the Telegram Bot API origin from `config.origin`
    pub async fn with_bot_api(config: Config) -> Result<Self> {
        let origin = BotApiOrigin::new(&config.origin)?;
        Self::new(config, Arc::new(origin)).await
    }

    /// Subscribe to hub events
    ///
    /// Slow subscribers may observe `RecvError::Lagged` and skip events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Per-collection lock registry
    pub fn locks(&self) -> &CollectionLocks {
        &self.locks
    }

    /// On-disk layout of a collection
    pub fn layout(&self, name: &CollectionName) -> CollectionLayout {
        CollectionLayout::new(self.config.hub_dir(), name)
    }

    /// Janitor bound to this hub's directory, locks and event channel
    pub fn janitor(&self) -> Janitor {
        Janitor::new(
            self.config.hub_dir().clone(),
            self.config.retention.retention,
            self.config.retention.sweep_interval,
            self.locks.clone(),
            self.event_tx.clone(),
            self.cancel.child_token(),
        )
    }

    /// Lifecycle state of a collection
    ///
    /// A held lock reads as `Building`, whether a build or an eviction holds it.
    pub async fn state(&self, name: &CollectionName) -> CollectionState {
        if self.locks.is_locked(name) {
            return CollectionState::Building;
        }
        let layout = self.layout(name);
        if !layout.exists().await {
            return CollectionState::Absent;
        }
        match layout.age().await {
            Ok(age) if age >= self.config.retention.retention => CollectionState::Stale,
            Ok(_) => CollectionState::Ready,
            Err(e) => {
                tracing::debug!(collection = %name, error = %e, "cannot read collection age");
                CollectionState::Absent
            }
        }
    }

    /// Report for the collection as currently published on disk, without locking
    ///
    /// Falls back to scanning the parts area when no manifest is present.
    pub async fn published(&self, name: &CollectionName) -> Result<Option<BuildReport>> {
        let layout = self.layout(name);
        if !layout.exists().await {
            return Ok(None);
        }

        if let Some(manifest) = Manifest::read(&layout).await? {
            let converted = manifest
                .items
                .iter()
                .filter(|i| i.conversion == ConversionStatus::Converted)
                .count();
            return Ok(Some(BuildReport {
                collection: manifest.collection,
                title: manifest.title,
                cached: true,
                total_items: manifest.items.len(),
                converted,
                parts: manifest.parts,
                failures: manifest.failures,
            }));
        }

        let mut parts = Vec::new();
        for (index, file_name) in layout.list_parts().await?.into_iter().enumerate() {
            let size_bytes = tokio::fs::metadata(layout.part_path(&file_name))
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            parts.push(ArchivePart {
                index,
                file_name,
                files: Vec::new(),
                size_bytes,
            });
        }
        Ok(Some(BuildReport {
            collection: name.clone(),
            title: None,
            cached: true,
            total_items: 0,
            converted: 0,
            parts,
            failures: Vec::new(),
        }))
    }
}
