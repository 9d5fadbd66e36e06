// Web server module
// Handles the HTTP API endpoints for the image tools and serves the frontend

mod app;
mod error;
mod handlers;
mod listeners;
mod models;
mod response;
mod upload;

pub use app::{AppOptions, create_app};
pub use listeners::create_listener;

use crate::imaging::backend::ImageBackend;
use std::sync::Arc;

// Maximum allowed size of an uploaded image
pub const MAX_IMAGE_SIZE_BYTES: usize = 50 * 1024 * 1024; // 50MiB

// Request body limit: the image plus room for the settings field and multipart framing
pub const MAX_REQUEST_BODY_BYTES: usize = MAX_IMAGE_SIZE_BYTES + 1024 * 1024;

pub type SharedBackend = Arc<dyn ImageBackend>;
