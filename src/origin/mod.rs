//! Remote origin of collection metadata and item bytes
//!
//! The pipeline only talks to the [`Origin`] trait; [`BotApiOrigin`] is the
//! HTTP implementation against the Telegram Bot API.

mod bot_api;

pub use bot_api::BotApiOrigin;

use crate::error::{FetchError, Result};
use crate::types::{CollectionMeta, CollectionName, ItemMeta};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Transient download locator for one item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Locator {
    /// Where the bytes can be fetched
    pub url: String,
    /// File extension reported by the origin (without the dot)
    pub extension: String,
}

/// Source of collection metadata and item bytes
#[async_trait]
pub trait Origin: Send + Sync {
    /// Ordered item list of a collection, or `None` when the origin does not know it
    async fn collection(&self, name: &CollectionName) -> Result<Option<CollectionMeta>>;

    /// Turn an item's origin reference into a download locator
    async fn resolve(&self, item: &ItemMeta) -> std::result::Result<Locator, FetchError>;

    /// Stream the located bytes to `dest`, returning the number of bytes written
    ///
    /// `dest` must only appear once the transfer is complete.
    async fn download(&self, locator: &Locator, dest: &Path)
    -> std::result::Result<u64, FetchError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Stream an HTTP response body into `dest` via a `.part` sibling
///
/// The temporary file is renamed into place only after the last chunk has been
/// written, so an existing `dest` always holds a complete transfer.
pub(crate) async fn stream_to_file(
    mut response: reqwest::Response,
    dest: &Path,
) -> std::result::Result<u64, FetchError> {
    let tmp = partial_path(dest);
    let write_err = |path: &Path, source: std::io::Error| FetchError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| write_err(&tmp, e))?;

    let mut written = 0u64;
    let copy = async {
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)
                .await
                .map_err(|e| write_err(&tmp, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| write_err(&tmp, e))?;
        Ok::<_, FetchError>(())
    };

    if let Err(e) = copy.await {
        drop(file);
        tokio::fs::remove_file(&tmp).await.ok();
        return Err(e);
    }
    drop(file);

    tokio::fs::rename(&tmp, dest)
        .await
        .map_err(|e| write_err(dest, e))?;
    Ok(written)
}

/// `<dest>.part`, where a file is written before being renamed into place
pub(crate) fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
