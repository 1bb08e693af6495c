//! On-disk layout of a collection
//!
//! ```text
//! <hub>/<collection>/
//!     raw/            fetched sources, <id>.<ext>
//!     gif/            normalized outputs, <id>.gif
//!     parts/          archive parts, <collection>_<index>.zip
//!     manifest.json   build manifest
//!     index.html      listing of the normalized outputs
//! ```
//!
//! The directory's existence is the cache signal: a build that fails removes
//! the whole tree before releasing the collection lock.

use crate::error::Result;
use crate::types::{CollectionName, ItemId, NORMALIZED_EXTENSION};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const RAW_DIR: &str = "raw";
const GIF_DIR: &str = "gif";
const PARTS_DIR: &str = "parts";
const MANIFEST_FILE: &str = "manifest.json";
const INDEX_FILE: &str = "index.html";
const ARCHIVE_EXTENSION: &str = "zip";

/// Paths of one collection inside the hub directory
#[derive(Clone, Debug)]
pub struct CollectionLayout {
    name: CollectionName,
    root: PathBuf,
}

impl CollectionLayout {
    /// Layout of `name` under `hub_dir`
    pub fn new(hub_dir: &Path, name: &CollectionName) -> Self {
        Self {
            name: name.clone(),
            root: hub_dir.join(name.as_str()),
        }
    }

    /// Collection name
    pub fn name(&self) -> &CollectionName {
        &self.name
    }

    /// Collection root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw sources area
    pub fn raw_dir(&self) -> PathBuf {
        self.root.join(RAW_DIR)
    }

    /// Normalized outputs area
    pub fn gif_dir(&self) -> PathBuf {
        self.root.join(GIF_DIR)
    }

    /// Archive parts area
    pub fn parts_dir(&self) -> PathBuf {
        self.root.join(PARTS_DIR)
    }

    /// Build manifest
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Generated listing
    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    /// Deterministic source path for an item
    pub fn source_path(&self, id: &ItemId, extension: &str) -> PathBuf {
        self.raw_dir().join(format!("{id}.{extension}"))
    }

    /// Deterministic normalized output path for an item
    pub fn output_path(&self, id: &ItemId) -> PathBuf {
        self.gif_dir().join(format!("{id}.{NORMALIZED_EXTENSION}"))
    }

    /// File name of archive part `index`
    pub fn part_file_name(&self, index: usize) -> String {
        format!("{}_{index}.{ARCHIVE_EXTENSION}", self.name)
    }

    /// Path of archive part `file_name`
    pub fn part_path(&self, file_name: &str) -> PathBuf {
        self.parts_dir().join(file_name)
    }

    /// Whether the collection directory exists
    pub async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Time since the collection directory was last modified
    pub async fn age(&self) -> Result<Duration> {
        let modified = tokio::fs::metadata(&self.root).await?.modified()?;
        Ok(SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO))
    }

    /// Delete any previous instance and recreate the three working areas
    pub async fn prepare(&self) -> Result<()> {
        self.remove().await?;
        for dir in [self.raw_dir(), self.gif_dir(), self.parts_dir()] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    /// Delete the collection directory; a missing directory is not an error
    pub async fn remove(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Archive part file names currently on disk, ordered by part index
    pub async fn list_parts(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(self.parts_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut parts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if let Some(index) = self.part_index(&file_name) {
                parts.push((index, file_name));
            }
        }
        parts.sort();
        Ok(parts.into_iter().map(|(_, name)| name).collect())
    }

    fn part_index(&self, file_name: &str) -> Option<usize> {
        file_name
            .strip_prefix(self.name.as_str())?
            .strip_prefix('_')?
            .strip_suffix(ARCHIVE_EXTENSION)?
            .strip_suffix('.')?
            .parse()
            .ok()
    }
}
