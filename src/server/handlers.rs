use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::page::{render_index, PageContext};
use super::store::StoredVariant;
use super::{AppState, ServerError};
use crate::codec::{decode_image, encode_image};
use crate::error::StyleError;
use crate::range::ClusterRange;
use crate::style_image;

#[derive(Debug, Clone, Serialize)]
pub struct StyleResponse {
    pub request_id: String,
    pub cluster_min: usize,
    pub cluster_max: usize,
    /// Route of the uploaded image, re-encoded in the output format.
    pub original: String,
    pub variants: Vec<StoredVariant>,
}

/// Fields of the upload form.
struct StyleForm {
    file: Bytes,
    cluster_min: i64,
    cluster_max: i64,
}

pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_index(&PageContext {
        cluster_min: state.config.default_cluster_min,
        cluster_max: state.config.default_cluster_max,
        cluster_ceiling: state.config.cluster_ceiling,
        original: None,
        variants: &[],
    }))
}

pub async fn style_page(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Html<String>, ServerError> {
    let form = read_form(&state, multipart).await?;
    let response = run_style(&state, form).await?;
    Ok(Html(render_index(&PageContext {
        cluster_min: response.cluster_min,
        cluster_max: response.cluster_max,
        cluster_ceiling: state.config.cluster_ceiling,
        original: Some(&response.original),
        variants: &response.variants,
    })))
}

pub async fn style_json(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<StyleResponse>, ServerError> {
    let form = read_form(&state, multipart).await?;
    Ok(Json(run_style(&state, form).await?))
}

pub async fn output(
    State(state): State<AppState>,
    Path((request_id, file)): Path<(String, String)>,
) -> Result<Response, ServerError> {
    match state.store.load(&request_id, &file).await? {
        Some((bytes, content_type)) => {
            Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
        }
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

async fn read_form(state: &AppState, mut multipart: Multipart) -> Result<StyleForm, ServerError> {
    let mut file = None;
    let mut cluster_min = state.config.default_cluster_min as i64;
    let mut cluster_max = state.config.default_cluster_max as i64;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    file = Some(bytes);
                }
            }
            "cluster_min" | "cluster_max" => {
                let text = field.text().await?;
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                let value = text.parse::<i64>().map_err(|_| {
                    StyleError::InvalidParameter(format!("{name} must be an integer, got '{text}'"))
                })?;
                if name == "cluster_min" {
                    cluster_min = value;
                } else {
                    cluster_max = value;
                }
            }
            other => debug!(field = other, "ignoring unknown form field"),
        }
    }

    Ok(StyleForm {
        file: file.ok_or(ServerError::MissingFile)?,
        cluster_min,
        cluster_max,
    })
}

async fn run_style(state: &AppState, form: StyleForm) -> Result<StyleResponse, ServerError> {
    let range = ClusterRange::normalize(
        form.cluster_min,
        form.cluster_max,
        state.config.cluster_ceiling,
    )?;
    let request_id = Uuid::new_v4();
    let format = state.config.output_format;
    let styler = state.styler.clone();
    let started = Instant::now();

    let upload = form.file;
    let (original, variants) = state
        .run_job(move || {
            let image = decode_image(&upload)?;
            let original = encode_image(&image, format)?;
            let variants = style_image(&image, range, &styler, format)?;
            Ok::<_, StyleError>((original, variants))
        })
        .await??;

    let original = state
        .store
        .persist_original(request_id, &original, format)
        .await?;
    let stored = state.store.persist(request_id, &variants, format).await?;
    if let Err(e) = state.store.prune().await {
        warn!("failed to prune old outputs: {e}");
    }

    info!(
        %request_id,
        %range,
        variants = stored.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "styled upload"
    );

    Ok(StyleResponse {
        request_id: request_id.to_string(),
        cluster_min: range.min(),
        cluster_max: range.max(),
        original,
        variants: stored,
    })
}
