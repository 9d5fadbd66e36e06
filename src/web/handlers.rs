// API handlers for the web server

use super::{
    SharedBackend,
    error::ApiError,
    models::{ImageMetadata, ProcessedImageResult},
    response::{image_metadata, processed_result},
    upload::receive_upload,
};
use crate::{
    imaging::{ImagingError, transform},
    settings::{Operation, OperationSettings, ValidateSettings, parse_settings},
};
use axum::{
    Json,
    extract::{Request, State},
};
use tracing::{debug, info};
use uuid::Uuid;

// Runs CPU-bound image work off the async runtime.
async fn run_blocking<T, F>(operation: Operation, f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ImagingError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            ApiError::InternalServerError(format!("{} task failed: {}", operation.as_str(), e))
        })?
        .map_err(|source| ApiError::Processing { operation, source })
}

// Shared flow of every image-producing endpoint: receive the upload,
// validate settings, transform on a blocking thread, encode the response.
async fn process<S: ValidateSettings>(
    backend: SharedBackend,
    request: Request,
    wrap: fn(S) -> OperationSettings,
) -> Result<Json<ProcessedImageResult>, ApiError> {
    let upload = receive_upload(request).await?;
    let settings = wrap(parse_settings::<S>(upload.settings.as_deref())?);
    let operation = settings.operation();

    let request_id = Uuid::new_v4();
    info!(
        "{} request: size={}, content_type={}, request_id={}",
        operation.as_str(),
        upload.image.size(),
        upload.image.content_type,
        request_id
    );
    debug!("Settings: {:?}, request_id={}", settings, request_id);

    let original_size = upload.image.size();
    let data = upload.image.bytes;
    let output = run_blocking(operation, move || {
        transform::apply(&*backend, &data, &settings)
    })
    .await?;

    debug!(
        "{} finished: {} -> {} bytes, request_id={}",
        operation.as_str(),
        original_size,
        output.bytes.len(),
        request_id
    );

    Ok(Json(processed_result(original_size, &output)))
}

// --- POST /api/compress ---
pub async fn compress(
    State(backend): State<SharedBackend>,
    request: Request,
) -> Result<Json<ProcessedImageResult>, ApiError> {
    process(backend, request, OperationSettings::Compress).await
}

// --- POST /api/convert ---
pub async fn convert(
    State(backend): State<SharedBackend>,
    request: Request,
) -> Result<Json<ProcessedImageResult>, ApiError> {
    process(backend, request, OperationSettings::Convert).await
}

// --- POST /api/resize ---
pub async fn resize(
    State(backend): State<SharedBackend>,
    request: Request,
) -> Result<Json<ProcessedImageResult>, ApiError> {
    process(backend, request, OperationSettings::Resize).await
}

// --- POST /api/rotate ---
pub async fn rotate(
    State(backend): State<SharedBackend>,
    request: Request,
) -> Result<Json<ProcessedImageResult>, ApiError> {
    process(backend, request, OperationSettings::Rotate).await
}

// --- POST /api/watermark ---
pub async fn watermark(
    State(backend): State<SharedBackend>,
    request: Request,
) -> Result<Json<ProcessedImageResult>, ApiError> {
    process(backend, request, OperationSettings::Watermark).await
}

// --- POST /api/info ---
// Reports metadata without transforming the image; any settings field is ignored
pub async fn info(
    State(backend): State<SharedBackend>,
    request: Request,
) -> Result<Json<ImageMetadata>, ApiError> {
    let upload = receive_upload(request).await?;

    let request_id = Uuid::new_v4();
    info!(
        "info request: size={}, content_type={}, request_id={}",
        upload.image.size(),
        upload.image.content_type,
        request_id
    );

    let image = upload.image;
    let (image, probe) = run_blocking(Operation::Info, move || {
        let probe = transform::inspect(&*backend, &image.bytes)?;
        Ok((image, probe))
    })
    .await?;

    Ok(Json(image_metadata(&image, &probe)))
}

// --- POST /api/remove-background ---
// Needs a segmentation model this server does not ship; the body is never read
pub async fn remove_background() -> ApiError {
    ApiError::NotImplemented(
        "Background removal requires an external AI service and is not available on this server"
            .to_string(),
    )
}
