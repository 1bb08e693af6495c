//! Concurrent asset fetch into a collection's raw-source area

use crate::config::RetryConfig;
use crate::error::FetchError;
use crate::layout::CollectionLayout;
use crate::origin::Origin;
use crate::progress::ProgressCounter;
use crate::retry::with_retry;
use crate::types::{ItemFailure, ItemMeta, Stage};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;

/// An item whose source bytes are on disk
#[derive(Clone, Debug)]
pub struct FetchedItem {
    /// Item metadata
    pub item: ItemMeta,
    /// Deterministic source path `raw/<id>.<ext>`
    pub path: PathBuf,
    /// Bytes transferred (0 when the file was already present)
    pub bytes: u64,
    /// Whether the transfer was skipped because the file already existed
    pub skipped: bool,
}

/// Result of fetching a whole collection
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Items whose bytes are on disk, in origin order
    pub fetched: Vec<FetchedItem>,
    /// Items that could not be fetched, in origin order
    pub failed: Vec<ItemFailure>,
}

/// Fetches items through a bounded worker pool
pub struct Fetcher {
    origin: Arc<dyn Origin>,
    workers: usize,
    retry: RetryConfig,
}

impl Fetcher {
    /// Create a fetcher running at most `workers` transfers at once
    pub fn new(origin: Arc<dyn Origin>, workers: usize, retry: RetryConfig) -> Self {
        Self {
            origin,
            workers: workers.max(1),
            retry,
        }
    }

    /// Fetch every item into `layout`'s raw area
    ///
    /// A failing item is recorded and never aborts its siblings. Every finished
    /// item, success or failure, is reported to `progress` exactly once.
    pub async fn fetch_all(
        &self,
        items: &[ItemMeta],
        layout: &CollectionLayout,
        progress: &ProgressCounter,
    ) -> FetchReport {
        let mut results: Vec<(usize, Result<FetchedItem, ItemFailure>)> =
            stream::iter(items.iter().cloned().enumerate())
                .map(|(index, item)| async move {
                    let result = self.fetch_one(&item, layout).await.map_err(|e| {
                        tracing::warn!(
                            collection = %layout.name(),
                            item = %item.id,
                            error = %e,
                            "item fetch failed"
                        );
                        ItemFailure::new(item.id.clone(), Stage::Fetch, e)
                    });
                    progress.record(result.is_ok());
                    (index, result)
                })
                .buffer_unordered(self.workers)
                .collect()
                .await;

        results.sort_by_key(|(index, _)| *index);

        let mut report = FetchReport::default();
        for (_, result) in results {
            match result {
                Ok(fetched) => report.fetched.push(fetched),
                Err(failure) => report.failed.push(failure),
            }
        }

        tracing::info!(
            collection = %layout.name(),
            origin = self.origin.name(),
            fetched = report.fetched.len(),
            failed = report.failed.len(),
            "fetch finished"
        );
        report
    }

    /// Fetch one item, retrying transient failures
    ///
    /// The transfer is skipped when the deterministic source path already exists.
    pub async fn fetch_one(
        &self,
        item: &ItemMeta,
        layout: &CollectionLayout,
    ) -> Result<FetchedItem, FetchError> {
        with_retry(&self.retry, move || async move {
            let locator = self.origin.resolve(item).await?;
            let path = layout.source_path(&item.id, &locator.extension);

            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                tracing::debug!(item = %item.id, path = ?path, "source already present");
                return Ok(FetchedItem {
                    item: item.clone(),
                    path,
                    bytes: 0,
                    skipped: true,
                });
            }

            let bytes = self.origin.download(&locator, &path).await?;
            tracing::debug!(item = %item.id, bytes, "item fetched");
            Ok(FetchedItem {
                item: item.clone(),
                path,
                bytes,
                skipped: false,
            })
        })
        .await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::Locator;
    use crate::progress::ProgressUpdate;
    use crate::types::{CollectionMeta, CollectionName, ItemId, SourceFormat};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Origin serving fixed bytes; items whose id starts with "bad" fail with HTTP 404
    #[derive(Default)]
    struct MemoryOrigin {
        downloads: AtomicUsize,
        flaky_remaining: AtomicUsize,
    }

    #[async_trait]
    impl Origin for MemoryOrigin {
        async fn collection(
            &self,
            _name: &CollectionName,
        ) -> crate::error::Result<Option<CollectionMeta>> {
            Ok(None)
        }

        async fn resolve(&self, item: &ItemMeta) -> Result<Locator, FetchError> {
            Ok(Locator {
                url: format!("mem://{}", item.id),
                extension: item.format.default_extension().to_string(),
            })
        }

        async fn download(&self, locator: &Locator, dest: &Path) -> Result<u64, FetchError> {
            if locator.url.starts_with("mem://bad") {
                return Err(FetchError::Http {
                    status: 404,
                    url: locator.url.clone(),
                });
            }
            if self
                .flaky_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(FetchError::Transfer {
                    reason: "connection reset".into(),
                    timeout: false,
                });
            }
            self.downloads.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(dest, b"bytes").await.unwrap();
            Ok(5)
        }

        fn name(&self) -> &'static str {
            "memory"
        }
    }

    fn items(ids: &[&str]) -> Vec<ItemMeta> {
        ids.iter()
            .map(|id| ItemMeta {
                id: ItemId::from(*id),
                origin_ref: format!("ref-{id}"),
                format: SourceFormat::StaticImage,
            })
            .collect()
    }

    fn retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    async fn prepared_layout(dir: &Path) -> CollectionLayout {
        let layout = CollectionLayout::new(dir, &CollectionName::parse("Cats").unwrap());
        layout.prepare().await.unwrap();
        layout
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let layout = prepared_layout(dir.path()).await;
        let origin = Arc::new(MemoryOrigin::default());
        let fetcher = Fetcher::new(origin.clone(), 3, retry());

        let items = items(&["a", "b", "bad1", "c", "d"]);
        let report = fetcher
            .fetch_all(&items, &layout, &ProgressCounter::silent(items.len()))
            .await;

        let ids: Vec<_> = report.fetched.iter().map(|f| f.item.id.0.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].item, ItemId::from("bad1"));
        assert_eq!(report.failed[0].stage, Stage::Fetch);
        assert!(layout.raw_dir().join("a.webp").exists());
    }

    #[tokio::test]
    async fn test_existing_source_is_not_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        let layout = prepared_layout(dir.path()).await;
        let origin = Arc::new(MemoryOrigin::default());
        let fetcher = Fetcher::new(origin.clone(), 2, retry());
        let items = items(&["a", "b"]);

        std::fs::write(layout.raw_dir().join("a.webp"), b"cached").unwrap();

        let report = fetcher
            .fetch_all(&items, &layout, &ProgressCounter::silent(2))
            .await;

        assert_eq!(origin.downloads.load(Ordering::SeqCst), 1);
        assert!(report.fetched[0].skipped);
        assert!(!report.fetched[1].skipped);
        assert_eq!(
            std::fs::read(layout.raw_dir().join("a.webp")).unwrap(),
            b"cached"
        );
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let layout = prepared_layout(dir.path()).await;
        let origin = Arc::new(MemoryOrigin {
            flaky_remaining: AtomicUsize::new(2),
            ..Default::default()
        });
        let fetcher = Fetcher::new(origin.clone(), 1, retry());

        let fetched = fetcher.fetch_one(&items(&["a"])[0], &layout).await.unwrap();
        assert_eq!(fetched.bytes, 5);
        assert_eq!(origin.downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_progress_reported_once_per_item_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let layout = prepared_layout(dir.path()).await;
        let fetcher = Fetcher::new(Arc::new(MemoryOrigin::default()), 4, retry());

        let seen = Arc::new(Mutex::new(Vec::<ProgressUpdate>::new()));
        let sink_seen = seen.clone();
        let items = items(&["a", "b", "c", "bad", "e", "f", "g", "h", "i", "j"]);
        let progress = ProgressCounter::new(
            items.len(),
            Arc::new(move |u| sink_seen.lock().unwrap().push(u)),
        );

        fetcher.fetch_all(&items, &layout, &progress).await;

        let seen = seen.lock().unwrap();
        let done: Vec<_> = seen.iter().map(|u| u.done).collect();
        assert_eq!(done, (1..=10).collect::<Vec<_>>());
        assert_eq!(seen.iter().filter(|u| !u.succeeded).count(), 1);
        let milestones: Vec<_> = seen.iter().filter(|u| u.milestone).map(|u| u.done).collect();
        assert_eq!(milestones, vec![2, 4, 6, 8, 10]);
    }
}
