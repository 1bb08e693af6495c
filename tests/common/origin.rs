//! In-memory origin

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use stickerhub::{
    CollectionMeta, CollectionName, FetchError, ItemId, ItemMeta, Locator, Origin, Result,
    SourceFormat,
};

/// Origin serving collections from memory
///
/// Items registered without a payload answer HTTP 404 on download.
#[derive(Default)]
pub struct MemoryOrigin {
    collections: HashMap<String, CollectionMeta>,
    payloads: HashMap<String, Vec<u8>>,
    delay: Duration,
    metadata_calls: AtomicUsize,
    downloads: AtomicUsize,
}

impl MemoryOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection; `None` payloads make that item's download fail
    pub fn with_collection(mut self, name: &str, items: Vec<(&str, SourceFormat, Option<Vec<u8>>)>) -> Self {
        let metas = items
            .into_iter()
            .map(|(id, format, payload)| {
                let origin_ref = format!("ref-{id}");
                if let Some(bytes) = payload {
                    self.payloads.insert(origin_ref.clone(), bytes);
                }
                ItemMeta {
                    id: ItemId::from(id),
                    origin_ref,
                    format,
                }
            })
            .collect();
        self.collections.insert(
            name.to_string(),
            CollectionMeta {
                name: CollectionName::parse(name).unwrap(),
                title: None,
                items: metas,
            },
        );
        self
    }

    /// Sleep this long in every download
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Origin for MemoryOrigin {
    async fn collection(&self, name: &CollectionName) -> Result<Option<CollectionMeta>> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.collections.get(name.as_str()).cloned())
    }

    async fn resolve(&self, item: &ItemMeta) -> std::result::Result<Locator, FetchError> {
        Ok(Locator {
            url: format!("memory://{}", item.origin_ref),
            extension: item.format.default_extension().to_string(),
        })
    }

    async fn download(&self, locator: &Locator, dest: &Path) -> std::result::Result<u64, FetchError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let key = locator.url.trim_start_matches("memory://");
        let Some(bytes) = self.payloads.get(key) else {
            return Err(FetchError::Http {
                status: 404,
                url: locator.url.clone(),
            });
        };
        tokio::fs::write(dest, bytes)
            .await
            .map_err(|source| FetchError::Write {
                path: dest.to_path_buf(),
                source,
            })?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(bytes.len() as u64)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
