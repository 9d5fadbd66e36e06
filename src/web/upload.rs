use axum::{
    extract::{
        FromRequest, Multipart, Request,
        multipart::MultipartError,
    },
    http::StatusCode,
};
use tracing::{debug, warn};

use super::{MAX_IMAGE_SIZE_BYTES, error::ApiError};

pub const IMAGE_FIELD: &str = "image";
pub const SETTINGS_FIELD: &str = "settings";

/// Ways an upload can be refused before any settings or image work happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadRejection {
    MissingFile,
    EmptyFile,
    NotAnImage,
    TooLarge,
    Malformed,
}

impl UploadRejection {
    pub fn message(self) -> &'static str {
        match self {
            Self::MissingFile => "No image file provided",
            Self::EmptyFile => "Uploaded image file is empty",
            Self::NotAnImage => "Only image files are allowed",
            Self::TooLarge => "Image file exceeds the 50 MB upload limit",
            Self::Malformed => "Invalid multipart/form-data request",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::MissingFile => "MISSING_FILE",
            Self::EmptyFile => "EMPTY_FILE",
            Self::NotAnImage => "NOT_AN_IMAGE",
            Self::TooLarge => "PAYLOAD_TOO_LARGE",
            Self::Malformed => "MALFORMED_UPLOAD",
        }
    }
}

/// The uploaded file. Lives only as long as the request that carried it.
#[derive(Debug)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filename: Option<String>,
}

impl UploadedImage {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug)]
pub struct ImageUpload {
    pub image: UploadedImage,
    /// Raw JSON text of the `settings` field, if one was sent.
    pub settings: Option<String>,
}

fn is_image_mime(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|s| s.parse::<mime::Mime>().ok())
        .is_some_and(|m| m.type_() == mime::IMAGE)
}

fn rejection_from_multipart(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadRejection::TooLarge.into()
    } else {
        debug!("Failed to process multipart field: {}", err);
        UploadRejection::Malformed.into()
    }
}

/// Reads the `image` and `settings` fields of a multipart request. The image
/// content type is checked before its data is read, and reading stops as soon
/// as the data exceeds the upload limit.
pub async fn receive_upload(request: Request) -> Result<ImageUpload, ApiError> {
    let mut multipart = Multipart::from_request(request, &()).await.map_err(|e| {
        debug!("Rejected non-multipart request: {}", e);
        ApiError::from(UploadRejection::Malformed)
    })?;

    let mut image: Option<UploadedImage> = None;
    let mut settings: Option<String> = None;
    let mut ignored_fields = 0;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(rejection_from_multipart)?
    {
        let name = field.name().map(str::to_string);

        match name.as_deref() {
            Some(IMAGE_FIELD) => {
                let content_type = field.content_type().map(str::to_string);
                if !is_image_mime(content_type.as_deref()) {
                    debug!("Rejected upload with content type {:?}", content_type);
                    return Err(UploadRejection::NotAnImage.into());
                }
                let filename = field.file_name().map(str::to_string);

                let mut bytes = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(rejection_from_multipart)? {
                    if bytes.len() + chunk.len() > MAX_IMAGE_SIZE_BYTES {
                        return Err(UploadRejection::TooLarge.into());
                    }
                    bytes.extend_from_slice(&chunk);
                }

                if image.is_some() {
                    warn!("Multiple 'image' fields found in multipart request, using the last one");
                }
                debug!(
                    "Received image {:?} ({}, {} bytes)",
                    filename,
                    content_type.as_deref().unwrap_or_default(),
                    bytes.len()
                );

                image = Some(UploadedImage {
                    bytes,
                    content_type: content_type.unwrap_or_default(),
                    filename,
                });
            }
            Some(SETTINGS_FIELD) => {
                settings = Some(field.text().await.map_err(rejection_from_multipart)?);
            }
            other => {
                debug!("Ignoring multipart field: {}", other.unwrap_or("unnamed"));
                ignored_fields += 1;
            }
        }
    }

    if ignored_fields > 0 {
        debug!(
            "Ignored {} unexpected fields in multipart request",
            ignored_fields
        );
    }

    let image = image.ok_or(UploadRejection::MissingFile)?;
    if image.bytes.is_empty() {
        return Err(UploadRejection::EmptyFile.into());
    }

    Ok(ImageUpload { image, settings })
}
