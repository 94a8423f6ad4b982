use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::{FieldError, StoreError};
use crate::store::{
    FilterCriteria, ImageDraft, ImageId, ImagePayload, ImageStore, KeyValueStore, SortKey,
};

const PERSISTENCE_MESSAGE: &str = "Failed to save image. Storage might be full.";

/// Shared handle to the single image store.
pub struct AppState<S> {
    store: Arc<RwLock<ImageStore<S>>>,
}

impl<S> AppState<S> {
    pub fn new(store: ImageStore<S>) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

pub fn create_router<S: KeyValueStore + 'static>(
    state: AppState<S>,
    max_upload_bytes: usize,
) -> Router {
    Router::new()
        .route(
            "/api/images",
            get(list_images::<S>)
                .post(upload_image::<S>)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(
            "/api/images/{id}",
            get(get_image::<S>).delete(delete_image::<S>),
        )
        .route("/api/images/{id}/file", get(image_file::<S>))
        .route("/api/images/{id}/metadata", get(image_metadata::<S>))
        .route("/api/tags", get(list_tags::<S>))
        .route("/api/summary", get(summary::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldError>,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    let body = ErrorResponse {
        error: message.to_string(),
        fields: Vec::new(),
    };
    (status, Json(body)).into_response()
}

fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "Image not found")
}

fn store_error(err: StoreError) -> Response {
    match err {
        StoreError::Validation(errors) => {
            let body = ErrorResponse {
                error: "Invalid image metadata".to_string(),
                fields: errors.fields().to_vec(),
            };
            (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
        }
        err @ StoreError::Persistence { .. } => {
            error!(error = %err, "upload failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, PERSISTENCE_MESSAGE)
        }
    }
}

/// Unknown and malformed ids both read as absent.
fn parse_id(raw: &str) -> Option<ImageId> {
    raw.parse().ok()
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    search: Option<String>,
    /// Comma separated
    tags: Option<String>,
    sort: Option<String>,
}

impl ListQuery {
    fn into_criteria(self) -> Result<FilterCriteria, String> {
        let sort_by = match self.sort.as_deref() {
            Some(sort) if !sort.trim().is_empty() => sort.parse()?,
            _ => SortKey::default(),
        };
        let selected_tags = self
            .tags
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect();
        Ok(FilterCriteria {
            search_term: self.search.unwrap_or_default(),
            selected_tags,
            sort_by,
        })
    }
}

async fn list_images<S: KeyValueStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let criteria = match query.into_criteria() {
        Ok(criteria) => criteria,
        Err(message) => return json_error(StatusCode::BAD_REQUEST, &message),
    };
    let store = state.store.read().await;
    Json(store.filter(&criteria)).into_response()
}

async fn get_image<S: KeyValueStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Response {
    let store = state.store.read().await;
    match parse_id(&id).and_then(|id| store.get_by_id(id)) {
        Some(record) => Json(record).into_response(),
        None => not_found(),
    }
}

async fn delete_image<S: KeyValueStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Response {
    let Some(id) = parse_id(&id) else {
        return not_found();
    };
    let mut store = state.store.write().await;
    if store.delete(id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        not_found()
    }
}

async fn list_tags<S: KeyValueStore + 'static>(State(state): State<AppState<S>>) -> Response {
    Json(state.store.read().await.list_tags()).into_response()
}

async fn summary<S: KeyValueStore + 'static>(State(state): State<AppState<S>>) -> Response {
    Json(state.store.read().await.summary()).into_response()
}

async fn image_metadata<S: KeyValueStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Response {
    let store = state.store.read().await;
    match parse_id(&id).and_then(|id| store.get_by_id(id)) {
        Some(record) => record.metadata_text().into_response(),
        None => not_found(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileQuery {
    #[serde(default)]
    download: bool,
}

async fn image_file<S: KeyValueStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    Query(query): Query<FileQuery>,
) -> Response {
    let store = state.store.read().await;
    let Some(record) = parse_id(&id).and_then(|id| store.get_by_id(id)) else {
        return not_found();
    };
    let (bytes, mime_type) = match store.read_image(&record.image_data).await {
        Ok(Some(image)) => image,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "Image file is missing"),
        Err(err) => {
            error!(id = %record.id, error = %err, "failed to read image file");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read image file");
        }
    };
    let disposition = if query.download { "attachment" } else { "inline" };
    // header values must stay visible ASCII
    let file_name: String = record
        .file_name
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_ascii_graphic() || ch == ' ' => ch,
            _ => '_',
        })
        .collect();
    (
        [
            (header::CONTENT_TYPE, mime_type),
            (
                header::CONTENT_DISPOSITION,
                format!("{disposition}; filename=\"{file_name}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// `metadata` part of an upload. Numeric defaults match the upload form's.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UploadMetadata {
    /// `data:` URI used when the request carries no `file` part
    image_data: Option<String>,
    positive_prompt: String,
    negative_prompt: String,
    seed: Number,
    model: String,
    lora: Option<String>,
    cfg: f64,
    steps: Number,
    sampler: String,
    scheduler: String,
    image_dimensions: String,
    tags: Vec<String>,
    file_name: Option<String>,
}

impl Default for UploadMetadata {
    fn default() -> Self {
        Self {
            image_data: None,
            positive_prompt: String::new(),
            negative_prompt: String::new(),
            seed: Number::from(0u64),
            model: String::new(),
            lora: None,
            cfg: 7.0,
            steps: Number::from(20u64),
            sampler: String::new(),
            scheduler: String::new(),
            image_dimensions: String::new(),
            tags: Vec::new(),
            file_name: None,
        }
    }
}

struct UploadedFile {
    file_name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

async fn upload_image<S: KeyValueStore + 'static>(
    State(state): State<AppState<S>>,
    mut multipart: Multipart,
) -> Response {
    let mut file = None;
    let mut metadata = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => match field.name().map(str::to_string).as_deref() {
                Some("file") => {
                    let file_name = field.file_name().unwrap_or("").to_string();
                    let content_type = field.content_type().map(|value| value.to_string());
                    match field.bytes().await {
                        Ok(data) => {
                            file = Some(UploadedFile {
                                file_name,
                                content_type,
                                bytes: data.to_vec(),
                            });
                        }
                        Err(err) => {
                            return json_error(
                                StatusCode::BAD_REQUEST,
                                &format!("Failed to read file: {err}"),
                            );
                        }
                    }
                }
                Some("metadata") => {
                    let text = match field.text().await {
                        Ok(text) => text,
                        Err(err) => {
                            return json_error(
                                StatusCode::BAD_REQUEST,
                                &format!("Failed to read metadata: {err}"),
                            );
                        }
                    };
                    match serde_json::from_str::<UploadMetadata>(&text) {
                        Ok(parsed) => metadata = Some(parsed),
                        Err(err) => {
                            return json_error(
                                StatusCode::BAD_REQUEST,
                                &format!("Invalid metadata: {err}"),
                            );
                        }
                    }
                }
                _ => {}
            },
            Ok(None) => break,
            Err(err) => {
                return json_error(
                    StatusCode::BAD_REQUEST,
                    &format!("Failed to read form: {err}"),
                );
            }
        }
    }

    let Some(metadata) = metadata else {
        return json_error(StatusCode::BAD_REQUEST, "Missing metadata");
    };
    let payload = match (file, metadata.image_data.as_deref()) {
        (Some(file), _) => ImagePayload::from_upload(
            metadata.file_name.as_deref().unwrap_or(&file.file_name),
            file.content_type.as_deref(),
            file.bytes,
        ),
        (None, Some(uri)) => {
            ImagePayload::from_data_uri(metadata.file_name.as_deref().unwrap_or(""), uri)
        }
        (None, None) => return json_error(StatusCode::BAD_REQUEST, "Please select an image file"),
    };
    let payload = match payload {
        Ok(payload) => payload,
        Err(err) => return json_error(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let image_dimensions = if metadata.image_dimensions.trim().is_empty() {
        payload
            .dimensions()
            .map(|(width, height)| format!("{width}x{height}"))
            .unwrap_or_default()
    } else {
        metadata.image_dimensions
    };

    let mut store = state.store.write().await;
    let image = match store.attach_image(&payload).await {
        Ok(image) => image,
        Err(err) => return store_error(err),
    };
    let draft = ImageDraft {
        image_data: image.clone(),
        positive_prompt: metadata.positive_prompt,
        negative_prompt: metadata.negative_prompt,
        seed: metadata.seed,
        model: metadata.model,
        lora: metadata.lora,
        cfg: metadata.cfg,
        steps: metadata.steps,
        sampler: metadata.sampler,
        scheduler: metadata.scheduler,
        image_dimensions,
        tags: metadata.tags,
        file_name: payload.file_name,
    };
    match store.create(draft).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(err) => {
            store.release_image(&image).await;
            store_error(err)
        }
    }
}
