#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::MutexGuard;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dataroom_contracts::image::{ImageId, DEFAULT_IMAGE_CONTENT_TYPE, MAX_IMAGE_BYTES};
use dataroom_contracts::revision::{MajorVersion, MinorVersion};
use dataroom_storage::StorageError;

use crate::{
    AdapterError, AdapterErrorKind, AdapterRuntime, ErrorResponse, HealthResponse, RevisionBody,
    SharedRuntime,
};

/// Room for multipart framing around a maximum-size file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router(runtime: SharedRuntime, api_prefix: &str) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/dataroom", get(published))
        .route("/revisions", get(list_revisions).post(create_draft))
        .route("/revisions/:version", get(get_revision).put(update_draft))
        .route("/publish/:version", post(publish))
        .route(
            "/images",
            post(upload_image)
                .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + MULTIPART_OVERHEAD_BYTES)),
        )
        .route("/images/:id", get(fetch_image))
        .with_state(runtime);
    if api_prefix.is_empty() {
        api
    } else {
        Router::new().nest(api_prefix, api)
    }
}

impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            AdapterErrorKind::NotFound => StatusCode::NOT_FOUND,
            AdapterErrorKind::Validation => StatusCode::BAD_REQUEST,
            AdapterErrorKind::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AdapterErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "data room request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "data room request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

fn lock(runtime: &SharedRuntime) -> Result<MutexGuard<'_, AdapterRuntime>, AdapterError> {
    runtime.lock().map_err(|_| AdapterError::LockPoisoned)
}

fn parse_version(raw: &str) -> Result<MajorVersion, AdapterError> {
    let n = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| AdapterError::InvalidRequest(format!("invalid version '{raw}'")))?;
    Ok(MajorVersion::new(n)?)
}

/// `?minor=` is optional; a value that is not a number counts as absent.
fn parse_minor(query: &HashMap<String, String>) -> Option<MinorVersion> {
    query
        .get("minor")
        .and_then(|v| v.trim().parse::<u32>().ok())
        .map(MinorVersion)
}

/// Liveness only; never touches the runtime lock or the store.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

async fn published(
    State(runtime): State<SharedRuntime>,
) -> Result<impl IntoResponse, AdapterError> {
    Ok(Json(lock(&runtime)?.published()?))
}

async fn list_revisions(
    State(runtime): State<SharedRuntime>,
) -> Result<impl IntoResponse, AdapterError> {
    Ok(Json(lock(&runtime)?.list_revisions()?))
}

async fn get_revision(
    State(runtime): State<SharedRuntime>,
    Path(version): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AdapterError> {
    let version = parse_version(&version)?;
    let minor = parse_minor(&query);
    Ok(Json(lock(&runtime)?.get_revision(version, minor)?))
}

async fn create_draft(
    State(runtime): State<SharedRuntime>,
    body: Bytes,
) -> Result<impl IntoResponse, AdapterError> {
    let body = RevisionBody::parse(&body)?;
    Ok(Json(lock(&runtime)?.create_draft(body)?))
}

async fn update_draft(
    State(runtime): State<SharedRuntime>,
    Path(version): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<impl IntoResponse, AdapterError> {
    let version = parse_version(&version)?;
    let minor = parse_minor(&query);
    let body = RevisionBody::parse(&body)?;
    Ok(Json(lock(&runtime)?.update_draft(version, minor, body)?))
}

async fn publish(
    State(runtime): State<SharedRuntime>,
    Path(version): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AdapterError> {
    let version = parse_version(&version)?;
    let minor = parse_minor(&query);
    Ok(Json(lock(&runtime)?.publish(version, minor)?))
}

async fn upload_image(
    State(runtime): State<SharedRuntime>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AdapterError> {
    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let original_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_error)?;
        if data.len() > MAX_IMAGE_BYTES {
            return Err(AdapterError::PayloadTooLarge {
                max_bytes: MAX_IMAGE_BYTES,
            });
        }
        file = Some((data.to_vec(), content_type, original_name));
        break;
    }
    let Some((data, content_type, original_name)) = file else {
        return Err(AdapterError::MissingFile);
    };
    if data.is_empty() {
        return Err(AdapterError::MissingFile);
    }
    Ok(Json(
        lock(&runtime)?.upload_image(data, content_type, original_name)?,
    ))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AdapterError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AdapterError::PayloadTooLarge {
            max_bytes: MAX_IMAGE_BYTES,
        }
    } else {
        AdapterError::InvalidRequest(err.body_text())
    }
}

async fn fetch_image(
    State(runtime): State<SharedRuntime>,
    Path(id): Path<String>,
) -> Result<Response, AdapterError> {
    let id = ImageId::new(id.as_str())
        .map_err(|_| AdapterError::Storage(StorageError::not_found("image", id.as_str())))?;
    let image = lock(&runtime)?.fetch_image(&id)?;
    let content_type = HeaderValue::from_str(&image.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_IMAGE_CONTENT_TYPE));
    Ok(([(header::CONTENT_TYPE, content_type)], image.data).into_response())
}
