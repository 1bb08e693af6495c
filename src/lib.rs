//! # stickerhub
//!
//! Sticker set pipeline: fetch every item of a named collection, normalize
//! still images, vector animations and video clips into GIFs, pack the GIFs
//! into size-bounded zip parts and publish the result in an on-disk cache.
//!
//! ## Design
//!
//! - **Library-first** - No CLI, the embedding process drives [`StickerHub`]
//! - **One build per collection** - Builds and evictions of the same collection
//!   are serialized by a named lock; a second request sees a cache hit or `Busy`
//! - **Partial-failure tolerant** - A failing item is reported, never fatal
//! - **Event-driven** - Progress and lifecycle are broadcast as [`Event`]s
//!
//! ## Quick Start
//!
//! ```no_run
//! use stickerhub::{CollectionName, Config, Outcome, StickerHub};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = StickerHub::with_bot_api(Config::from_env()?).await?;
//!     hub.start_janitor();
//!
//!     let mut events = hub.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let name = CollectionName::parse("https://t.me/addstickers/Cats")?;
//!     match hub.request(&name, false).await? {
//!         Outcome::Ready(report) => {
//!             for part in &report.parts {
//!                 println!("{}", hub.layout(&name).part_path(&part.file_name).display());
//!             }
//!         }
//!         other => println!("{}", other.summary()),
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Read-only HTTP publication surface
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Concurrent asset fetch
pub mod fetcher;
/// The collection hub (cache, locking, build orchestration)
pub mod hub;
/// Retention janitor
pub mod janitor;
/// On-disk collection layout
pub mod layout;
/// Per-collection named locks
pub mod locks;
/// Build manifest and listing
pub mod manifest;
/// Format normalization into GIF
pub mod normalizer;
/// Remote origin of metadata and bytes
pub mod origin;
/// Size-bounded archive packing
pub mod packer;
/// Shared progress counter
pub mod progress;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{
    ApiError, ConversionError, Error, ErrorDetail, FetchError, PackError, Result, ToHttpStatus,
};
pub use hub::StickerHub;
pub use origin::{BotApiOrigin, Locator, Origin};
pub use types::{
    ArchivePart, BuildReport, CollectionMeta, CollectionName, CollectionState, Event, ItemId,
    ItemMeta, Outcome, SourceFormat, Stage,
};

/// Run until SIGTERM or SIGINT (Ctrl+C elsewhere), then shut the hub down
///
/// Shutdown stops the janitor and any API server started with
/// [`api::start_api_server`].
///
/// ```no_run
/// use stickerhub::{Config, StickerHub, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let hub = StickerHub::with_bot_api(Config::from_env()?).await?;
///     hub.start_janitor();
///     tokio::spawn(stickerhub::api::start_api_server(hub.clone()));
///
///     run_with_shutdown(hub).await;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(hub: StickerHub) {
    wait_for_signal().await;
    hub.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments; fall back to ctrl_c
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "could not register SIGTERM handler, waiting for Ctrl+C only");
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("received SIGINT");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => tracing::info!("received SIGINT"),
            Err(e) => tracing::error!(error = %e, "failed to listen for SIGINT"),
        },
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C"),
        Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
    }
}
