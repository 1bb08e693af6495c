//! Collection availability and manifest handlers

use crate::api::AppState;
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::types::{CollectionName, CollectionState};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// One archive part as exposed over HTTP
#[derive(Debug, Serialize)]
pub struct PartLink {
    /// Archive file name
    pub file_name: String,
    /// Path of the archive under `/files`
    pub url: String,
    /// Total size of the packed files
    pub size_bytes: u64,
    /// Number of packed files
    pub files: usize,
}

/// Availability of a published collection
#[derive(Debug, Serialize)]
pub struct CollectionView {
    /// Collection name
    pub collection: CollectionName,
    /// Lifecycle state
    pub state: CollectionState,
    /// Display title
    pub title: Option<String>,
    /// Items listed by the origin at build time
    pub total_items: usize,
    /// Items that made it into an archive
    pub converted: usize,
    /// Number of per-item failures
    pub failures: usize,
    /// Archive parts in order
    pub parts: Vec<PartLink>,
    /// Listing page
    pub index_url: String,
}

fn building(name: &CollectionName) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "collection": name,
            "state": CollectionState::Building,
            "message": format!("{name} is still being built, try again later"),
        })),
    )
        .into_response()
}

/// GET /collections/:name - availability check on the archive parts
pub async fn get_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response> {
    let name = CollectionName::parse(&name)?;
    let hub = &state.hub;

    // Reads never wait for a build or an eviction
    if hub.locks().is_locked(&name) {
        return Ok(building(&name));
    }

    let report = hub
        .published(&name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("collection {name}")))?;

    let view = CollectionView {
        state: hub.state(&name).await,
        title: report.title,
        total_items: report.total_items,
        converted: report.converted,
        failures: report.failures.len(),
        parts: report
            .parts
            .into_iter()
            .map(|p| PartLink {
                url: format!("/files/{name}/parts/{}", p.file_name),
                file_name: p.file_name,
                size_bytes: p.size_bytes,
                files: p.files.len(),
            })
            .collect(),
        index_url: format!("/files/{name}/index.html"),
        collection: name,
    };
    Ok((StatusCode::OK, Json(view)).into_response())
}

/// GET /collections/:name/manifest - build manifest of a published collection
pub async fn get_manifest(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response> {
    let name = CollectionName::parse(&name)?;
    let hub = &state.hub;

    if hub.locks().is_locked(&name) {
        return Ok(building(&name));
    }

    let manifest = Manifest::read(&hub.layout(&name))
        .await?
        .ok_or_else(|| Error::NotFound(format!("manifest of {name}")))?;
    Ok(Json(manifest).into_response())
}
