//! HTTP front end.
//!
//! | Route                            | Purpose                               |
//! |----------------------------------|---------------------------------------|
//! | `GET /`                          | upload form                           |
//! | `POST /style`                    | stylize an upload, HTML result page   |
//! | `POST /api/style`                | stylize an upload, JSON result        |
//! | `GET /outputs/{request_id}/{file}` | fetch a stored variant              |
//!
//! Styling is CPU bound; it runs on the blocking pool. The two style routes
//! share one job semaphore whose permit travels with the blocking work, so a
//! client that disconnects mid-request keeps its slot until the job ends.

mod config;
mod error;
mod handlers;
mod page;
mod store;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, info};

pub use config::{
    ServerConfig, DEFAULT_BIND, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_OUTPUT_DIR,
    DEFAULT_RETAINED_REQUESTS,
};
pub use error::ServerError;
pub use handlers::StyleResponse;
pub use page::{render_index, PageContext};
pub use store::{OutputStore, StoredVariant, OUTPUTS_ROUTE};

use crate::styler::Styler;

#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    styler: Styler,
    store: OutputStore,
    jobs: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: ServerConfig, store: OutputStore) -> Self {
        Self {
            styler: config.styler(),
            jobs: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            config: Arc::new(config),
            store,
        }
    }

    /// Job slots currently free.
    pub fn available_jobs(&self) -> usize {
        self.jobs.available_permits()
    }

    /// Run `job` on the blocking pool once a job slot is free.
    ///
    /// The slot is released when `job` returns, not when the caller's future
    /// is dropped.
    pub async fn run_job<T, F>(&self, job: F) -> Result<T, ServerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.jobs).acquire_owned().await?;
        debug!(free = self.jobs.available_permits(), "style job admitted");
        let output = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await?;
        Ok(output)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/style", post(handlers::style_page))
        .route("/api/style", post(handlers::style_json))
        .route(
            &format!("{OUTPUTS_ROUTE}/{{request_id}}/{{file}}"),
            get(handlers::output),
        )
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .with_state(state)
}

/// Bind `config.bind` and serve until Ctrl-C.
pub async fn serve(config: ServerConfig) -> Result<(), ServerError> {
    let store = OutputStore::new(&config.output_dir, config.retained_requests);
    store.prepare().await?;

    let bind = config.bind;
    info!(
        output_dir = %store.root().display(),
        format = %config.output_format,
        color_space = %config.color_space,
        "Starting styler server on {bind}"
    );
    let app = router(AppState::new(config, store));

    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| ServerError::Bind(e, bind))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down styler server");
    }
}
