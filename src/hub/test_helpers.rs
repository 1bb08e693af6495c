//! Shared test fixtures: an in-memory origin and a hub over a temp directory

use crate::config::{Config, INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER, RetryConfig, VectorStrategy};
use crate::error::{FetchError, Result};
use crate::origin::{Locator, Origin};
use crate::types::{CollectionMeta, CollectionName, ItemId, ItemMeta, SourceFormat};
use crate::StickerHub;
use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Encoded PNG of a solid square
pub(crate) fn png_bytes(size: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbaImage::from_pixel(size, size, Rgba([30, 120, 200, 255]))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Hook run after every successful download with the destination path
pub(crate) type DownloadHook = Arc<dyn Fn(&Path) + Send + Sync>;

/// Origin serving collections from memory; items without a payload answer 404
#[derive(Default)]
pub(crate) struct FakeOrigin {
    collections: HashMap<String, CollectionMeta>,
    payloads: HashMap<String, Vec<u8>>,
    pub(crate) downloads: AtomicUsize,
    pub(crate) on_download: Option<DownloadHook>,
}

impl FakeOrigin {
    pub(crate) fn with_collection(mut self, name: &str, items: &[(&str, SourceFormat, Vec<u8>)]) -> Self {
        let metas = items
            .iter()
            .map(|(id, format, bytes)| {
                let origin_ref = format!("ref-{id}");
                self.payloads.insert(origin_ref.clone(), bytes.clone());
                ItemMeta {
                    id: ItemId::from(*id),
                    origin_ref,
                    format: *format,
                }
            })
            .collect();
        self.collections.insert(
            name.to_string(),
            CollectionMeta {
                name: CollectionName::parse(name).unwrap(),
                title: Some(format!("{name} title")),
                items: metas,
            },
        );
        self
    }

    /// Drop the payload of `id` so its download fails with 404
    pub(crate) fn without_payload(mut self, id: &str) -> Self {
        self.payloads.remove(&format!("ref-{id}"));
        self
    }

    pub(crate) fn on_download(mut self, hook: DownloadHook) -> Self {
        self.on_download = Some(hook);
        self
    }
}

#[async_trait]
impl Origin for FakeOrigin {
    async fn collection(&self, name: &CollectionName) -> Result<Option<CollectionMeta>> {
        Ok(self.collections.get(name.as_str()).cloned())
    }

    async fn resolve(&self, item: &ItemMeta) -> std::result::Result<Locator, FetchError> {
        Ok(Locator {
            url: item.origin_ref.clone(),
            extension: item.format.default_extension().to_string(),
        })
    }

    async fn download(&self, locator: &Locator, dest: &Path) -> std::result::Result<u64, FetchError> {
        let Some(bytes) = self.payloads.get(&locator.url) else {
            return Err(FetchError::Http {
                status: 404,
                url: locator.url.clone(),
            });
        };
        self.downloads.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(dest, bytes).await.unwrap();
        if let Some(hook) = &self.on_download {
            hook(dest);
        }
        Ok(bytes.len() as u64)
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Fast, janitor-less config over `hub_dir`; vector items are "converted" by `cp`
pub(crate) fn test_config(hub_dir: &Path) -> Config {
    let mut config = Config::default();
    config.pipeline.hub_dir = hub_dir.to_path_buf();
    config.pipeline.workers = 3;
    config.retention.enabled = false;
    config.retry = RetryConfig {
        max_attempts: 0,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
        backoff_multiplier: 1.0,
        jitter: false,
    };
    config.converter.vector = VectorStrategy::PerItem {
        program: PathBuf::from("cp"),
        args: vec![INPUT_PLACEHOLDER.into(), OUTPUT_PLACEHOLDER.into()],
    };
    config
}

/// Hub over a fresh temp directory, plus a handle on its origin
pub(crate) async fn create_test_hub(origin: FakeOrigin) -> (StickerHub, Arc<FakeOrigin>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let origin = Arc::new(origin);
    let hub = StickerHub::new(test_config(dir.path()), origin.clone())
        .await
        .unwrap();
    (hub, origin, dir)
}
