//! Size-bounded archive packing
//!
//! Normalized outputs are sorted by file name and partitioned greedily into
//! contiguous groups whose total size stays within the ceiling. A single file
//! larger than the ceiling is placed alone in its own part, which then exceeds
//! the ceiling; nothing is split or rejected.

use crate::error::{Error, PackError, Result};
use crate::layout::CollectionLayout;
use crate::types::{ArchivePart, ItemFailure, ItemId, Stage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

/// One planned archive part
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartPlan {
    /// File names in archive order
    pub files: Vec<String>,
    /// Sum of the files' sizes
    pub size_bytes: u64,
}

/// Greedy, order-preserving partition of `(name, size)` pairs under `ceiling`
///
/// A new part starts whenever the current part is non-empty and the next file
/// would push it over the ceiling. An empty input yields one empty part.
///
/// ```
/// use stickerhub::packer::plan_parts;
///
/// let parts = plan_parts([("a".to_string(), 30), ("b".to_string(), 20), ("c".to_string(), 70)], 50);
/// let names: Vec<Vec<String>> = parts.into_iter().map(|p| p.files).collect();
/// assert_eq!(names, vec![vec!["a", "b"], vec!["c"]]);
/// ```
pub fn plan_parts(files: impl IntoIterator<Item = (String, u64)>, ceiling: u64) -> Vec<PartPlan> {
    let mut parts = Vec::new();
    let mut current = PartPlan::default();

    for (name, size) in files {
        if !current.files.is_empty() && current.size_bytes.saturating_add(size) > ceiling {
            parts.push(std::mem::take(&mut current));
        }
        current.files.push(name);
        current.size_bytes = current.size_bytes.saturating_add(size);
    }

    if !current.files.is_empty() || parts.is_empty() {
        parts.push(current);
    }
    parts
}

/// Result of packing a collection
#[derive(Debug, Default)]
pub struct PackReport {
    /// Written archive parts in index order
    pub parts: Vec<ArchivePart>,
    /// Files that vanished between conversion and packing
    pub failed: Vec<ItemFailure>,
}

/// Packs normalized outputs into zip parts
#[derive(Clone, Debug)]
pub struct Packer {
    ceiling: u64,
}

impl Packer {
    /// Create a packer with the given per-part ceiling in bytes
    pub fn new(ceiling: u64) -> Self {
        Self { ceiling }
    }

    /// Pack `file_names` from the gif area into `<collection>_<index>.zip` parts
    ///
    /// Missing files are recorded as failures and skipped. Failing to write an
    /// archive is fatal for the whole build.
    pub async fn pack(&self, layout: &CollectionLayout, file_names: &[String]) -> Result<PackReport> {
        let mut names = file_names.to_vec();
        names.sort();

        let gif_dir = layout.gif_dir();
        let mut report = PackReport::default();
        let mut sized = Vec::with_capacity(names.len());

        for name in names {
            let path = gif_dir.join(&name);
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => sized.push((name, meta.len())),
                _ => {
                    tracing::warn!(collection = %layout.name(), file = %name, "file missing at pack time");
                    report.failed.push(ItemFailure::new(
                        ItemId(stem(&name).to_string()),
                        Stage::Pack,
                        PackError::MissingFile { path },
                    ));
                }
            }
        }

        let plans = plan_parts(sized, self.ceiling);
        for (index, plan) in plans.into_iter().enumerate() {
            if plan.size_bytes > self.ceiling {
                tracing::warn!(
                    collection = %layout.name(),
                    part = index,
                    size_bytes = plan.size_bytes,
                    ceiling = self.ceiling,
                    "single file exceeds the archive ceiling"
                );
            }

            let file_name = layout.part_file_name(index);
            let archive = layout.part_path(&file_name);
            let dir = gif_dir.clone();
            let files = plan.files.clone();

            tokio::task::spawn_blocking(move || write_archive(&archive, &dir, &files))
                .await
                .map_err(|e| Error::Other(format!("archive task failed: {e}")))??;

            tracing::debug!(collection = %layout.name(), part = %file_name, files = plan.files.len(), "archive part written");
            report.parts.push(ArchivePart {
                index,
                file_name,
                files: plan.files,
                size_bytes: plan.size_bytes,
            });
        }

        Ok(report)
    }
}

fn stem(file_name: &str) -> &str {
    file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name)
}

fn write_archive(archive: &Path, dir: &Path, files: &[String]) -> std::result::Result<(), PackError> {
    let archive_err = |reason: String| PackError::Archive {
        path: archive.to_path_buf(),
        reason,
    };

    let file = File::create(archive).map_err(|e| archive_err(e.to_string()))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for name in files {
        zip.start_file(name.as_str(), options)
            .map_err(|e| archive_err(e.to_string()))?;
        let mut src = File::open(dir.join(name)).map_err(|e| archive_err(format!("{name}: {e}")))?;
        std::io::copy(&mut src, &mut zip).map_err(|e| archive_err(format!("{name}: {e}")))?;
    }

    zip.finish().map_err(|e| archive_err(e.to_string()))?;
    Ok(())
}
