//! Core types for stickerhub

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{Error, Result};

/// Maximum collection name length accepted by the origin
const MAX_NAME_LEN: usize = 64;

/// Validated collection name
///
/// The name doubles as the collection's directory name and lock key, so it is
/// restricted to ASCII letters, digits, `_` and `-`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionName(String);

impl CollectionName {
    /// Parse user input into a collection name
    ///
    /// Accepts a bare name or a share link whose last path segment is the name
    /// (e.g. `https://t.me/addstickers/Cats`).
    ///
    /// ```
    /// use stickerhub::CollectionName;
    ///
    /// let name = CollectionName::parse("https://t.me/addstickers/Cats").unwrap();
    /// assert_eq!(name.as_str(), "Cats");
    /// assert!(CollectionName::parse("../etc").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim().trim_end_matches('/');
        let candidate = match trimmed.rsplit_once('/') {
            Some((_, last)) => last,
            None => trimmed,
        };
        let candidate = candidate.split(['?', '#']).next().unwrap_or_default();

        if candidate.is_empty() || candidate.len() > MAX_NAME_LEN {
            return Err(Error::InvalidName(input.to_string()));
        }
        if !candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::InvalidName(input.to_string()));
        }
        Ok(Self(candidate.to_string()))
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for CollectionName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Content id assigned by the origin; unique within the origin
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Source format of an item as reported by the origin
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Still image (webp/png/jpeg)
    StaticImage,
    /// Vector animation (tgs/lottie) that needs an external renderer
    AnimatedVector,
    /// Video clip (webm/mp4)
    Video,
}

impl SourceFormat {
    /// Extension to assume when the origin does not report one
    pub fn default_extension(&self) -> &'static str {
        match self {
            SourceFormat::StaticImage => "webp",
            SourceFormat::AnimatedVector => "tgs",
            SourceFormat::Video => "webm",
        }
    }
}

/// Extension of every normalized output
pub const NORMALIZED_EXTENSION: &str = "gif";

/// One item as listed by the origin's metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Content id (used for every local file name)
    pub id: ItemId,
    /// Opaque handle the origin resolves into a download locator
    pub origin_ref: String,
    /// Source format tag
    pub format: SourceFormat,
}

impl ItemMeta {
    /// File name of this item's normalized output
    pub fn output_file_name(&self) -> String {
        format!("{}.{}", self.id, NORMALIZED_EXTENSION)
    }
}

/// Collection metadata returned by the origin
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMeta {
    /// Canonical collection name
    pub name: CollectionName,
    /// Display title, if the origin has one
    pub title: Option<String>,
    /// Items in origin order
    ///
    /// Ids are unique within a collection: every local file and per-item
    /// record is keyed by id. Origins call [`CollectionMeta::dedup_items`]
    /// before handing metadata to the pipeline.
    pub items: Vec<ItemMeta>,
}

impl CollectionMeta {
    /// Drop every item whose id already appeared earlier, returning the dropped ones
    pub fn dedup_items(&mut self) -> Vec<ItemMeta> {
        let mut seen = HashSet::with_capacity(self.items.len());
        let mut dropped = Vec::new();
        self.items.retain(|item| {
            if seen.insert(item.id.clone()) {
                true
            } else {
                dropped.push(item.clone());
                false
            }
        });
        dropped
    }
}

/// Fetch status of an item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    /// Not attempted yet
    Pending,
    /// Source bytes are on disk
    Fetched,
    /// Fetch failed
    Failed,
}

/// Conversion status of an item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStatus {
    /// Not attempted yet
    Pending,
    /// Normalized output is on disk
    Converted,
    /// Conversion failed or was impossible because the fetch failed
    Failed,
}

/// Lifecycle state of a collection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionState {
    /// No directory on disk
    Absent,
    /// A build (or eviction) holds the collection lock
    Building,
    /// Published and within the retention window
    Ready,
    /// Published but older than the retention window
    Stale,
}

/// Pipeline stage an item failed in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Asset fetch
    Fetch,
    /// Format normalization
    Convert,
    /// Archive packing
    Pack,
}

/// A per-item failure recorded in a report
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Failed item (or file stem for pack failures)
    pub item: ItemId,
    /// Stage that failed
    pub stage: Stage,
    /// Human-readable reason
    pub reason: String,
}

impl ItemFailure {
    /// Create a failure record
    pub fn new(item: ItemId, stage: Stage, reason: impl fmt::Display) -> Self {
        Self {
            item,
            stage,
            reason: reason.to_string(),
        }
    }
}

/// Final status of one item after a build
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Content id
    pub id: ItemId,
    /// Source format
    pub format: SourceFormat,
    /// Fetch status
    pub fetch: FetchStatus,
    /// Conversion status
    pub conversion: ConversionStatus,
    /// Normalized output file name when converted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ItemRecord {
    /// Fresh record with both statuses pending
    pub fn pending(meta: &ItemMeta) -> Self {
        Self {
            id: meta.id.clone(),
            format: meta.format,
            fetch: FetchStatus::Pending,
            conversion: ConversionStatus::Pending,
            output: None,
        }
    }
}

/// One size-bounded archive covering a contiguous slice of normalized outputs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivePart {
    /// Sequence index (0-based)
    pub index: usize,
    /// Archive file name inside the collection's parts directory
    pub file_name: String,
    /// Normalized output file names in archive order
    pub files: Vec<String>,
    /// Sum of the packed files' sizes in bytes
    pub size_bytes: u64,
}

/// Result of a successful (possibly partial) build or cache hit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Collection name
    pub collection: CollectionName,
    /// Display title
    pub title: Option<String>,
    /// Whether the result was served from the on-disk cache
    pub cached: bool,
    /// Number of items listed by the origin
    pub total_items: usize,
    /// Number of items whose normalized output made it into an archive
    pub converted: usize,
    /// Archive parts in order
    pub parts: Vec<ArchivePart>,
    /// Per-item failures from every stage
    pub failures: Vec<ItemFailure>,
}

impl BuildReport {
    /// Whether any item failed
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Failures of a single stage
    pub fn failures_in(&self, stage: Stage) -> impl Iterator<Item = &ItemFailure> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }

    /// One-line message for the requester
    pub fn summary(&self) -> String {
        let parts = self.parts.len();
        if self.is_partial() {
            format!(
                "partial failures, {} of {} items ok, packed into {} archive part(s)",
                self.converted, self.total_items, parts
            )
        } else if self.cached {
            format!("{} served from cache in {} archive part(s)", self.collection, parts)
        } else {
            format!(
                "{} items converted, packed into {} archive part(s)",
                self.converted, parts
            )
        }
    }
}

/// Outcome of a collection request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Collection is published (fresh build or cache hit)
    Ready(BuildReport),
    /// Another run holds the collection lock; retry later
    Busy {
        /// Requested collection
        collection: CollectionName,
    },
    /// The origin does not know this collection
    NotFound {
        /// Requested collection
        collection: CollectionName,
    },
}

impl Outcome {
    /// One-line message for the requester
    pub fn summary(&self) -> String {
        match self {
            Outcome::Ready(report) => report.summary(),
            Outcome::Busy { collection } => {
                format!("{collection} is still being built, try again later")
            }
            Outcome::NotFound { collection } => format!("no such collection: {collection}"),
        }
    }
}

/// Events emitted by the hub
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A build passed the cache check and is starting
    BuildStarted {
        /// Collection name
        collection: CollectionName,
        /// Number of items listed by the origin
        total: usize,
    },
    /// Request served from disk
    CacheHit {
        /// Collection name
        collection: CollectionName,
    },
    /// One more item finished fetching
    FetchProgress {
        /// Collection name
        collection: CollectionName,
        /// Items finished so far (success or failure)
        done: usize,
        /// Total items
        total: usize,
        /// Whether this update crosses a 20% reporting step
        milestone: bool,
    },
    /// Fetching finished, conversion starts
    Converting {
        /// Collection name
        collection: CollectionName,
        /// Items handed to the normalizer
        items: usize,
    },
    /// Conversion finished, packing starts
    Packing {
        /// Collection name
        collection: CollectionName,
        /// Outputs handed to the packer
        files: usize,
    },
    /// Collection published
    Ready {
        /// Collection name
        collection: CollectionName,
        /// Number of archive parts
        parts: usize,
        /// Number of per-item failures
        failures: usize,
    },
    /// Build rolled back
    BuildFailed {
        /// Collection name
        collection: CollectionName,
        /// Failure description
        error: String,
    },
    /// Janitor removed an expired collection
    Evicted {
        /// Collection name
        collection: CollectionName,
    },
}
