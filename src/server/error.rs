use std::net::SocketAddr;

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::error::StyleError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to {1}: {0}")]
    Bind(#[source] std::io::Error, SocketAddr),
    #[error("Server stopped unexpectedly: {0}")]
    Serve(#[source] std::io::Error),
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("No image file was uploaded")]
    MissingFile,
    #[error(transparent)]
    Style(#[from] StyleError),
    #[error("Output storage failed: {0}")]
    Storage(#[from] std::io::Error),
    #[error("Style worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("Style job queue is closed")]
    JobQueueClosed(#[from] tokio::sync::AcquireError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            // Oversized bodies surface here as 413.
            ServerError::Multipart(e) => e.status(),
            ServerError::MissingFile => StatusCode::BAD_REQUEST,
            ServerError::Style(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        (status, self.to_string()).into_response()
    }
}
