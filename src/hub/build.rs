//! Request handling: cache check, build pipeline and rollback

use super::StickerHub;
use crate::error::{Error, Result};
use crate::layout::CollectionLayout;
use crate::manifest::Manifest;
use crate::progress::{ProgressCounter, ProgressSink, ProgressUpdate};
use crate::types::{
    BuildReport, CollectionMeta, CollectionName, ConversionStatus, Event, FetchStatus, ItemId,
    ItemRecord, Outcome,
};
use std::collections::HashMap;
use std::sync::Arc;

impl StickerHub {
    /// Serve a collection, building it when it is not cached
    ///
    /// The collection lock is taken without waiting: when another build or an
    /// eviction holds it, the result is [`Outcome::Busy`]. With the lock held:
    /// - an existing directory is served as is unless `rebuild` is set
    /// - otherwise the origin metadata is fetched (`NotFound` when unknown),
    ///   the old directory is removed and the whole pipeline runs
    ///
    /// Per-item failures end up in the report. Any other failure during the
    /// build removes the partial directory and surfaces as [`Error::Build`].
    pub async fn request(&self, name: &CollectionName, rebuild: bool) -> Result<Outcome> {
        let Some(_guard) = self.locks.try_lock(name) else {
            tracing::info!(collection = %name, "collection is busy");
            return Ok(Outcome::Busy {
                collection: name.clone(),
            });
        };

        let layout = self.layout(name);

        if !rebuild
            && layout.exists().await
            && let Some(report) = self.published(name).await?
        {
            tracing::info!(collection = %name, parts = report.parts.len(), "serving collection from cache");
            self.event_tx
                .send(Event::CacheHit {
                    collection: name.clone(),
                })
                .ok();
            return Ok(Outcome::Ready(report));
        }

        let Some(meta) = self.origin.collection(name).await? else {
            tracing::info!(collection = %name, "collection not found at origin");
            return Ok(Outcome::NotFound {
                collection: name.clone(),
            });
        };

        match self.build(&layout, meta).await {
            Ok(report) => {
                tracing::info!(
                    collection = %name,
                    parts = report.parts.len(),
                    converted = report.converted,
                    total = report.total_items,
                    failures = report.failures.len(),
                    "collection published"
                );
                self.event_tx
                    .send(Event::Ready {
                        collection: name.clone(),
                        parts: report.parts.len(),
                        failures: report.failures.len(),
                    })
                    .ok();
                Ok(Outcome::Ready(report))
            }
            Err(e) => {
                tracing::error!(collection = %name, error = %e, "build failed, rolling back");
                if let Err(rm) = layout.remove().await {
                    tracing::error!(collection = %name, error = %rm, "failed to remove partial collection");
                }
                self.event_tx
                    .send(Event::BuildFailed {
                        collection: name.clone(),
                        error: e.to_string(),
                    })
                    .ok();
                Err(Error::Build {
                    collection: name.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Run fetch, normalize and pack into a fresh directory; the caller holds the lock
    async fn build(&self, layout: &CollectionLayout, mut meta: CollectionMeta) -> Result<BuildReport> {
        let name = layout.name().clone();
        for duplicate in meta.dedup_items() {
            tracing::warn!(collection = %name, item = %duplicate.id, "duplicate item id, keeping the first");
        }
        let total = meta.items.len();

        self.event_tx
            .send(Event::BuildStarted {
                collection: name.clone(),
                total,
            })
            .ok();
        tracing::info!(collection = %name, total, "building collection");

        layout.prepare().await?;

        let mut records = ItemRecords::new(&meta);

        // Fetch
        let progress = ProgressCounter::new(total, self.fetch_progress_sink(&name));
        let fetched = self
            .pipeline
            .fetcher
            .fetch_all(&meta.items, layout, &progress)
            .await;
        for item in &fetched.fetched {
            records.update(&item.item.id, |r| r.fetch = FetchStatus::Fetched);
        }
        for failure in &fetched.failed {
            records.update(&failure.item, |r| {
                r.fetch = FetchStatus::Failed;
                r.conversion = ConversionStatus::Failed;
            });
        }

        // Normalize
        self.event_tx
            .send(Event::Converting {
                collection: name.clone(),
                items: fetched.fetched.len(),
            })
            .ok();
        let progress = ProgressCounter::new(fetched.fetched.len(), conversion_progress_sink(&name));
        let normalized = self
            .pipeline
            .normalizer
            .normalize_all(&fetched.fetched, layout, &progress)
            .await;
        let mut outputs = Vec::with_capacity(normalized.converted.len());
        for converted in &normalized.converted {
            let file_name = converted.item.output_file_name();
            records.update(&converted.item.id, |r| {
                r.conversion = ConversionStatus::Converted;
                r.output = Some(file_name.clone());
            });
            outputs.push(file_name);
        }
        for failure in &normalized.failed {
            records.update(&failure.item, |r| r.conversion = ConversionStatus::Failed);
        }

        // Pack
        self.event_tx
            .send(Event::Packing {
                collection: name.clone(),
                files: outputs.len(),
            })
            .ok();
        let packed = self.pipeline.packer.pack(layout, &outputs).await?;
        for failure in &packed.failed {
            records.update(&failure.item, |r| {
                r.conversion = ConversionStatus::Failed;
                r.output = None;
            });
        }

        let failures: Vec<_> = fetched
            .failed
            .into_iter()
            .chain(normalized.failed)
            .chain(packed.failed)
            .collect();
        let records = records.into_inner();
        let converted = records
            .iter()
            .filter(|r| r.conversion == ConversionStatus::Converted)
            .count();

        let manifest = Manifest {
            collection: name.clone(),
            title: meta.title.clone(),
            built_at: chrono::Utc::now(),
            items: records,
            parts: packed.parts,
            failures,
        };
        manifest.write(layout).await?;

        Ok(BuildReport {
            collection: name,
            title: manifest.title,
            cached: false,
            total_items: total,
            converted,
            parts: manifest.parts,
            failures: manifest.failures,
        })
    }

    fn fetch_progress_sink(&self, name: &CollectionName) -> ProgressSink {
        let event_tx = self.event_tx.clone();
        let name = name.clone();
        Arc::new(move |update: ProgressUpdate| {
            if update.milestone {
                tracing::info!(collection = %name, done = update.done, total = update.total, "fetch progress");
            }
            event_tx
                .send(Event::FetchProgress {
                    collection: name.clone(),
                    done: update.done,
                    total: update.total,
                    milestone: update.milestone,
                })
                .ok();
        })
    }
}

/// Final per-item statuses, addressed by item id
struct ItemRecords {
    records: Vec<ItemRecord>,
    positions: HashMap<ItemId, usize>,
}

impl ItemRecords {
    fn new(meta: &CollectionMeta) -> Self {
        Self {
            records: meta.items.iter().map(ItemRecord::pending).collect(),
            positions: meta
                .items
                .iter()
                .enumerate()
                .map(|(i, item)| (item.id.clone(), i))
                .collect(),
        }
    }

    fn update(&mut self, id: &ItemId, apply: impl FnOnce(&mut ItemRecord)) {
        if let Some(&i) = self.positions.get(id) {
            apply(&mut self.records[i]);
        }
    }

    fn into_inner(self) -> Vec<ItemRecord> {
        self.records
    }
}

fn conversion_progress_sink(name: &CollectionName) -> ProgressSink {
    let name = name.clone();
    Arc::new(move |update: ProgressUpdate| {
        if update.milestone {
            tracing::info!(collection = %name, done = update.done, total = update.total, "conversion progress");
        }
    })
}
