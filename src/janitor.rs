//! Retention janitor: evicts published collections older than the retention window
//!
//! Each candidate directory is inspected and removed while holding the same
//! per-collection lock a build holds, so a directory that is being built is
//! never touched.

use crate::error::Result;
use crate::layout::CollectionLayout;
use crate::locks::CollectionLocks;
use crate::types::{CollectionName, Event};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Outcome of one sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Collections removed
    pub evicted: Vec<CollectionName>,
    /// Collections that were due but could not be removed
    pub failed: Vec<CollectionName>,
    /// Collections inspected
    pub inspected: usize,
}

/// Background retention sweep
pub struct Janitor {
    hub_dir: PathBuf,
    retention: Duration,
    interval: Duration,
    locks: CollectionLocks,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl Janitor {
    /// Create a janitor over `hub_dir`
    pub fn new(
        hub_dir: PathBuf,
        retention: Duration,
        interval: Duration,
        locks: CollectionLocks,
        event_tx: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            hub_dir,
            retention,
            interval,
            locks,
            event_tx,
            cancel,
        }
    }

    /// Sweep on every interval tick until cancelled
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            hub_dir = ?self.hub_dir,
            retention = ?self.retention,
            interval = ?self.interval,
            "retention janitor started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if !report.evicted.is_empty() || !report.failed.is_empty() => {
                            tracing::info!(
                                evicted = report.evicted.len(),
                                failed = report.failed.len(),
                                inspected = report.inspected,
                                "retention sweep finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "retention sweep failed"),
                    }
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("retention janitor shutting down");
                    break;
                }
            }
        }
    }

    /// Inspect every collection directory once
    ///
    /// Hidden entries, plain files and names that are not valid collection
    /// names are ignored. A failure on one collection does not stop the sweep.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        let mut entries = match tokio::fs::read_dir(&self.hub_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };

        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with('.') {
                continue;
            }
            if !entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            match CollectionName::parse(&file_name) {
                Ok(name) => candidates.push(name),
                Err(_) => tracing::debug!(entry = %file_name, "ignoring foreign hub entry"),
            }
        }
        candidates.sort();

        for name in candidates {
            report.inspected += 1;
            let _guard = self.locks.lock(&name).await;
            let layout = CollectionLayout::new(&self.hub_dir, &name);

            // A build may have removed it while we waited
            if !layout.exists().await {
                continue;
            }

            let age = match layout.age().await {
                Ok(age) => age,
                Err(e) => {
                    tracing::warn!(collection = %name, error = %e, "cannot read collection age");
                    report.failed.push(name);
                    continue;
                }
            };
            if age < self.retention {
                continue;
            }

            match layout.remove().await {
                Ok(()) => {
                    tracing::info!(collection = %name, age = ?age, "evicted expired collection");
                    self.event_tx
                        .send(Event::Evicted {
                            collection: name.clone(),
                        })
                        .ok();
                    report.evicted.push(name);
                }
                Err(e) => {
                    tracing::warn!(collection = %name, error = %e, "failed to evict collection");
                    report.failed.push(name);
                }
            }
        }

        Ok(report)
    }
}
