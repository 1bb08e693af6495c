//! Format normalization: every fetched source becomes `gif/<id>.gif`
//!
//! Dispatch is a single match over [`SourceFormat`]:
//! - still images are re-encoded in process with the `image` crate
//! - video clips go through ffmpeg
//! - vector animations go through the configured [`VectorStrategy`]
//!
//! Conversions run through the same bounded worker pool as fetching. A failed
//! item is recorded and never aborts its siblings.

mod command;
mod still;

pub use command::{CommandOutput, run_with_timeout};
pub use still::convert_still;

use crate::config::{
    ConverterConfig, DIR_PLACEHOLDER, INPUT_PLACEHOLDER, JOB_PLACEHOLDER, OUTPUT_PLACEHOLDER,
    VectorStrategy,
};
use crate::error::ConversionError;
use crate::fetcher::FetchedItem;
use crate::layout::CollectionLayout;
use crate::progress::ProgressCounter;
use crate::types::{ItemFailure, ItemMeta, NORMALIZED_EXTENSION, SourceFormat, Stage};
use futures::stream::{self, StreamExt};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BATCH_CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Name the batch renderer runs under, e.g. `stickerhub-render-Cats`
///
/// Restricted to `[A-Za-z0-9_.-]` so it is valid as a container name.
fn render_job_name(layout: &CollectionLayout) -> String {
    let name: String = layout
        .name()
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') { c } else { '-' })
        .collect();
    format!("stickerhub-render-{name}")
}

/// An item with a normalized output on disk
#[derive(Clone, Debug)]
pub struct ConvertedItem {
    /// Item metadata
    pub item: ItemMeta,
    /// `gif/<id>.gif`
    pub output: PathBuf,
}

/// Result of normalizing a batch
#[derive(Debug, Default)]
pub struct NormalizeReport {
    /// Converted items, in input order
    pub converted: Vec<ConvertedItem>,
    /// Items that failed to convert, in input order
    pub failed: Vec<ItemFailure>,
}

/// What has to happen to one fetched source
#[derive(Debug)]
enum ConversionJob {
    Still {
        src: PathBuf,
    },
    Video {
        ffmpeg: PathBuf,
        src: PathBuf,
    },
    /// Output was produced by the batch renderer next to the source
    Rendered {
        rendered: PathBuf,
        batch_error: Option<String>,
    },
    /// Per-item converter; `{output}` is still unresolved in `args`
    VectorProcess {
        program: PathBuf,
        args: Vec<String>,
    },
    Unsupported(String),
}

/// Converts fetched sources into normalized GIFs
pub struct Normalizer {
    config: ConverterConfig,
    workers: usize,
    ffmpeg: Option<PathBuf>,
}

impl Normalizer {
    /// Create a normalizer; ffmpeg is taken from config or discovered in PATH
    pub fn new(config: ConverterConfig, workers: usize) -> Self {
        let ffmpeg = config
            .ffmpeg_path
            .clone()
            .or_else(|| which::which("ffmpeg").ok());
        if ffmpeg.is_none() {
            tracing::warn!("ffmpeg not found in PATH, video items will fail to convert");
        }
        Self {
            config,
            workers: workers.max(1),
            ffmpeg,
        }
    }

    /// Normalize every fetched item into `layout`'s gif area
    pub async fn normalize_all(
        &self,
        fetched: &[FetchedItem],
        layout: &CollectionLayout,
        progress: &ProgressCounter,
    ) -> NormalizeReport {
        let batch_error = match &self.config.vector {
            VectorStrategy::Batch { command }
                if fetched
                    .iter()
                    .any(|f| f.item.format == SourceFormat::AnimatedVector) =>
            {
                self.run_batch_renderer(command, layout).await.err()
            }
            _ => None,
        };

        let mut results: Vec<(usize, Result<ConvertedItem, ItemFailure>)> =
            stream::iter(fetched.iter().cloned().enumerate())
                .map(|(index, fetched)| {
                    let job = self.job_for(&fetched, batch_error.as_ref());
                    async move {
                        let output = layout.output_path(&fetched.item.id);
                        let result = self
                            .run_job(job, &output)
                            .await
                            .map(|()| ConvertedItem {
                                item: fetched.item.clone(),
                                output,
                            })
                            .map_err(|e| {
                                tracing::warn!(
                                    collection = %layout.name(),
                                    item = %fetched.item.id,
                                    format = ?fetched.item.format,
                                    error = %e,
                                    "item conversion failed"
                                );
                                ItemFailure::new(fetched.item.id.clone(), Stage::Convert, e)
                            });
                        progress.record(result.is_ok());
                        (index, result)
                    }
                })
                .buffer_unordered(self.workers)
                .collect()
                .await;

        results.sort_by_key(|(index, _)| *index);

        let mut report = NormalizeReport::default();
        for (_, result) in results {
            match result {
                Ok(converted) => report.converted.push(converted),
                Err(failure) => report.failed.push(failure),
            }
        }

        tracing::info!(
            collection = %layout.name(),
            converted = report.converted.len(),
            failed = report.failed.len(),
            "normalization finished"
        );
        report
    }

    /// Run the batch vector renderer once over the raw-source area
    async fn run_batch_renderer(
        &self,
        command: &[String],
        layout: &CollectionLayout,
    ) -> Result<(), String> {
        let raw_dir = tokio::fs::canonicalize(layout.raw_dir())
            .await
            .unwrap_or_else(|_| layout.raw_dir());
        let dir = raw_dir.to_string_lossy();
        let job = render_job_name(layout);

        let Some((program, args)) = command.split_first() else {
            return Err("batch renderer command is empty".to_string());
        };
        let args: Vec<String> = args
            .iter()
            .map(|a| a.replace(DIR_PLACEHOLDER, &dir).replace(JOB_PLACEHOLDER, &job))
            .collect();

        tracing::info!(collection = %layout.name(), program = %program, job = %job, "running batch vector renderer");
        match run_with_timeout(program, &args, self.config.batch_timeout).await {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(collection = %layout.name(), error = %e, "batch vector renderer failed");
                if matches!(e, ConversionError::Timeout { .. }) {
                    self.run_batch_cleanup(&job, layout).await;
                }
                Err(e.to_string())
            }
        }
    }

    /// Best-effort stop of whatever the timed-out renderer left running
    async fn run_batch_cleanup(&self, job: &str, layout: &CollectionLayout) {
        let Some((program, args)) = self.config.batch_cleanup.split_first() else {
            return;
        };
        let args: Vec<String> = args.iter().map(|a| a.replace(JOB_PLACEHOLDER, job)).collect();

        match run_with_timeout(program, &args, BATCH_CLEANUP_TIMEOUT).await {
            Ok(_) => tracing::info!(collection = %layout.name(), job = %job, "batch renderer cleaned up"),
            Err(e) => tracing::warn!(collection = %layout.name(), job = %job, error = %e, "batch renderer cleanup failed"),
        }
    }

    fn job_for(&self, fetched: &FetchedItem, batch_error: Option<&String>) -> ConversionJob {
        let src = fetched.path.clone();
        match fetched.item.format {
            SourceFormat::StaticImage => ConversionJob::Still { src },
            SourceFormat::Video => match &self.ffmpeg {
                Some(ffmpeg) => ConversionJob::Video {
                    ffmpeg: ffmpeg.clone(),
                    src,
                },
                None => ConversionJob::Unsupported("ffmpeg not found".to_string()),
            },
            SourceFormat::AnimatedVector => match &self.config.vector {
                VectorStrategy::Batch { .. } => ConversionJob::Rendered {
                    rendered: rendered_path(&src),
                    batch_error: batch_error.cloned(),
                },
                VectorStrategy::PerItem { program, args } => ConversionJob::VectorProcess {
                    program: program.clone(),
                    args: args
                        .iter()
                        .map(|a| a.replace(INPUT_PLACEHOLDER, &src.to_string_lossy()))
                        .collect(),
                },
            },
        }
    }

    async fn run_job(&self, job: ConversionJob, output: &Path) -> Result<(), ConversionError> {
        let timeout = self.config.item_timeout;
        match job {
            ConversionJob::Still { src } => {
                convert_still(src, output.to_path_buf(), self.config.frame_delay_ms, timeout)
                    .await?;
            }
            ConversionJob::Video { ffmpeg, src } => {
                let args: [&OsStr; 6] = [
                    OsStr::new("-y"),
                    OsStr::new("-loglevel"),
                    OsStr::new("error"),
                    OsStr::new("-i"),
                    src.as_os_str(),
                    output.as_os_str(),
                ];
                run_with_timeout(&ffmpeg, args, timeout).await?;
            }
            ConversionJob::Rendered {
                rendered,
                batch_error,
            } => {
                if !tokio::fs::try_exists(&rendered).await.unwrap_or(false) {
                    return Err(match batch_error {
                        Some(reason) => ConversionError::Unsupported(format!(
                            "batch renderer failed: {reason}"
                        )),
                        None => ConversionError::MissingOutput { path: rendered },
                    });
                }
                tokio::fs::rename(&rendered, output)
                    .await
                    .map_err(|e| ConversionError::Image(format!("cannot move rendered output: {e}")))?;
            }
            ConversionJob::VectorProcess { program, args } => {
                let target = output.to_string_lossy();
                let args = args
                    .iter()
                    .map(|a| a.replace(OUTPUT_PLACEHOLDER, &target));
                run_with_timeout(&program, args, timeout).await?;
            }
            ConversionJob::Unsupported(reason) => {
                return Err(ConversionError::Unsupported(reason));
            }
        }

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(ConversionError::MissingOutput {
                path: output.to_path_buf(),
            });
        }
        Ok(())
    }
}

/// Where the batch renderer leaves the output for `src`: `<src>.gif`
fn rendered_path(src: &Path) -> PathBuf {
    let mut name = src.as_os_str().to_owned();
    name.push(".");
    name.push(NORMALIZED_EXTENSION);
    PathBuf::from(name)
}
