//! The single page: form rendering, button dispatch and image delivery.

use std::num::NonZeroU16;

use axum::Router;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use tower_sessions::{ExpiredDeletion, Expiry, SessionManagerLayer};
use tracing::{error, info};

use crate::constants::{SESSION_INACTIVITY_SECONDS, SESSION_MAX_COUNT, SESSION_SWEEP_INTERVAL};
use crate::generator::ImageGenerator;

mod csrf;
mod flash;
mod images;
mod prelude;
mod store;
mod views;

use images::{download_handler, image_handler};
use store::PageStore;
use views::{page_handler, submit_handler};

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    generator: ImageGenerator,
}

impl AppState {
    fn new(generator: ImageGenerator) -> Self {
        Self { generator }
    }
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            axum::routing::get(page_handler).post(submit_handler),
        )
        .route("/image.png", axum::routing::get(image_handler))
        .route("/download", axum::routing::get(download_handler))
        .route("/static/styles.css", axum::routing::get(styles_handler))
}

async fn styles_handler() -> impl IntoResponse {
    const STYLES: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/styles.css"));
    ([(CONTENT_TYPE, "text/css")], STYLES)
}

/// Builds the application with its session layer.
pub fn app(generator: ImageGenerator) -> Router {
    app_with_store(generator, PageStore::new(SESSION_MAX_COUNT))
}

fn app_with_store(generator: ImageGenerator, store: PageStore) -> Router {
    let session_layer = SessionManagerLayer::new(store)
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(
            SESSION_INACTIVITY_SECONDS,
        )));
    create_router()
        .with_state(AppState::new(generator))
        .layer(session_layer)
}

/// Serves the page until the listener fails.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    generator: ImageGenerator,
) -> Result<(), anyhow::Error> {
    let store = PageStore::new(SESSION_MAX_COUNT);
    let deletion_task = tokio::task::spawn(
        store
            .clone()
            .continuously_delete_expired(SESSION_SWEEP_INTERVAL),
    );
    let app = app_with_store(generator, store);

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    deletion_task.abort();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        return;
    }
    info!("Shutting down");
}
