// API-specific data models for the web server

use serde::{Deserialize, Serialize};

/// Response of every image-producing endpoint
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedImageResult {
    pub original_size: usize,
    pub processed_size: usize,
    pub original_format: String,
    pub processed_format: String,
    pub width: u32,
    pub height: u32,
    /// `data:image/<format>;base64,...`
    pub data_url: String,
}

/// Response of the info endpoint
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub filename: String,
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub size: usize,
    pub color_space: String,
    pub has_alpha: bool,
}
