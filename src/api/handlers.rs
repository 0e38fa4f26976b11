//! Request handlers for the upload/generate/fetch lifecycle.

use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use serde_json::{Value, json};
use tracing::info;

use super::AppState;
use crate::error::ApiError;
use crate::item::{Item, NewItem};

const ALLOWED_MIME_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::Validation("Invalid ID".to_string()))
}

/// Health check and status endpoint
pub async fn status_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "generation_enabled": !state.providers.is_empty(),
        "providers": state.providers.provider_names(),
    }))
}

/// `POST /api/upload` - multipart form with a required `file` field (JPEG or
/// PNG) and optional `modelType` / `backgroundType` / `promptText` fields.
/// Returns the created item with status `pending`.
pub async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut model_type = None;
    let mut background_type = None;
    let mut prompt_text = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !ALLOWED_MIME_TYPES.contains(&content_type.as_str()) {
                    return Err(ApiError::Validation(
                        "Invalid file type. Only JPG and PNG are allowed.".to_string(),
                    ));
                }
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("Failed to read upload: {e}")))?;
                file = Some((file_name, bytes.to_vec()));
            }
            "modelType" => model_type = Some(text_field(field).await?),
            "backgroundType" => background_type = Some(text_field(field).await?),
            "promptText" => prompt_text = Some(text_field(field).await?),
            _ => {}
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| ApiError::Validation("No file uploaded".to_string()))?;

    let original_image = state
        .images
        .save_original(&file_name, &bytes)
        .await
        .map_err(ApiError::Internal)?;

    let item = state
        .store
        .create(NewItem {
            original_image,
            model_type,
            background_type,
            prompt_text,
        })
        .await;

    info!(
        "Uploaded item {}: {} ({} bytes)",
        item.id,
        item.original_image,
        bytes.len()
    );

    Ok((StatusCode::CREATED, Json(item)))
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid form field: {e}")))
}

/// `POST /api/generate/{id}` - run the generation pipeline for an item.
pub async fn generate_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Item>, ApiError> {
    let id = parse_id(&id)?;
    let item = state.orchestrator.generate(id).await?;
    Ok(Json(item))
}

/// `GET /api/clothing/{id}` - fetch an item by id.
pub async fn get_item_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Item>, ApiError> {
    let id = parse_id(&id)?;
    let item = state
        .store
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound("Clothing item not found".to_string()))?;
    Ok(Json(item))
}

/// `GET /api/uploads/{folder}/{filename}` - serve a stored file back.
pub async fn serve_upload_handler(
    State(state): State<AppState>,
    Path((folder, filename)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let path = state
        .images
        .resolve(&folder, &filename)
        .ok_or_else(|| ApiError::NotFound("File not found".to_string()))?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::NotFound("File not found".to_string()))?;

    let content_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .to_string();

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}
