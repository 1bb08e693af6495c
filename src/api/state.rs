//! Application state for the API server

use crate::StickerHub;

/// Shared state handed to every route handler (cheap clone)
#[derive(Clone)]
pub struct AppState {
    /// The hub whose directory is published
    pub hub: StickerHub,
}

impl AppState {
    /// Create a new AppState
    pub fn new(hub: StickerHub) -> Self {
        Self { hub }
    }
}
