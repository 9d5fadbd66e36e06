use base64::{Engine as _, engine::general_purpose};

use super::{
    models::{ImageMetadata, ProcessedImageResult},
    upload::UploadedImage,
};
use crate::imaging::{backend::ImageProbe, codec::format_name, transform::TransformOutput};

pub fn data_url(format: &str, bytes: &[u8]) -> String {
    format!(
        "data:image/{};base64,{}",
        format,
        general_purpose::STANDARD.encode(bytes)
    )
}

pub fn processed_result(original_size: usize, output: &TransformOutput) -> ProcessedImageResult {
    let format = format_name(output.format);
    let (width, height) = output.dimensions.unwrap_or((0, 0));

    ProcessedImageResult {
        original_size,
        processed_size: output.bytes.len(),
        original_format: format_name(output.original_format).to_string(),
        processed_format: format.to_string(),
        width,
        height,
        data_url: data_url(format, &output.bytes),
    }
}

pub fn image_metadata(image: &UploadedImage, probe: &ImageProbe) -> ImageMetadata {
    ImageMetadata {
        filename: image.filename.clone().unwrap_or_default(),
        format: format_name(probe.format).to_string(),
        width: probe.width,
        height: probe.height,
        size: image.size(),
        color_space: probe.color_space().to_string(),
        has_alpha: probe.has_alpha(),
    }
}
