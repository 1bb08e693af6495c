//! Read-only publication surface over the hub directory
//!
//! Exposes collection availability, manifests and the published files
//! themselves. Nothing here triggers a build.

use crate::{Result, StickerHub};
use axum::{Router, http::HeaderValue, routing::get};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod routes;
pub mod state;

pub use state::AppState;

/// Create the API router
///
/// # Routes
///
/// - `GET /health` - Health check
/// - `GET /collections/:name` - Availability: 200 with parts, 202 while a
///   build or eviction holds the collection lock, 404 when absent
/// - `GET /collections/:name/manifest` - Build manifest of a published collection
/// - `GET /files/<name>/...` - Static reads of the collection directory
///   (`parts/`, `gif/`, `raw/`, `index.html`, `manifest.json`)
pub fn create_router(hub: StickerHub) -> Router {
    let api = hub.config().api.clone();
    let files = ServeDir::new(hub.config().hub_dir());
    let state = AppState::new(hub);

    let router = Router::new()
        .route("/health", get(routes::health_check))
        .route("/collections/:name", get(routes::get_collection))
        .route("/collections/:name/manifest", get(routes::get_manifest))
        .nest_service("/files", files)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if api.cors_enabled {
        router.layer(build_cors_layer(&api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins ("*" allows any)
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Serve the API on the configured bind address until the hub shuts down
///
/// ```no_run
/// use stickerhub::{Config, StickerHub};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hub = StickerHub::with_bot_api(Config::from_env()?).await?;
/// stickerhub::api::start_api_server(hub).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(hub: StickerHub) -> Result<()> {
    let bind_address = hub.config().api.bind_address;
    let cancel = hub.cancel.clone();

    tracing::info!(address = %bind_address, "starting API server");
    let app = create_router(hub);

    let listener = TcpListener::bind(bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| crate::error::Error::Other(format!("API server error: {e}")))?;

    tracing::info!("API server stopped");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
