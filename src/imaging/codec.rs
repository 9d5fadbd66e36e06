use image::{
    DynamicImage, ImageFormat,
    codecs::{
        bmp::BmpEncoder,
        gif::GifEncoder,
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType as PngFilterType, PngEncoder},
        tiff::TiffEncoder,
        webp::WebPEncoder,
    },
};
use std::{borrow::Cow, io::Cursor};
use tracing::debug;

use super::ImagingError;
use crate::settings::TargetFormat;

/// Quality used when an image is re-encoded as JPEG without an explicit request.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Quality used for explicit format conversion.
pub const CONVERT_QUALITY: u8 = 90;

/// Encoder choice together with its options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png { compression: PngCompression },
    Jpeg { quality: u8 },
    WebP,
    Gif,
    Bmp,
    Tiff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PngCompression {
    Default,
    Best,
}

impl OutputFormat {
    pub fn image_format(self) -> ImageFormat {
        match self {
            OutputFormat::Png { .. } => ImageFormat::Png,
            OutputFormat::Jpeg { .. } => ImageFormat::Jpeg,
            OutputFormat::WebP => ImageFormat::WebP,
            OutputFormat::Gif => ImageFormat::Gif,
            OutputFormat::Bmp => ImageFormat::Bmp,
            OutputFormat::Tiff => ImageFormat::Tiff,
        }
    }

    /// Encoder that writes the image back in its input format. Inputs we can
    /// decode but not encode are written as PNG.
    pub fn preserving(input: ImageFormat) -> Self {
        match input {
            ImageFormat::Jpeg => OutputFormat::Jpeg {
                quality: DEFAULT_JPEG_QUALITY,
            },
            ImageFormat::WebP => OutputFormat::WebP,
            ImageFormat::Gif => OutputFormat::Gif,
            ImageFormat::Bmp => OutputFormat::Bmp,
            ImageFormat::Tiff => OutputFormat::Tiff,
            _ => OutputFormat::Png {
                compression: PngCompression::Default,
            },
        }
    }

    /// Lossless re-encode at maximum effort. WebP stays WebP; everything else
    /// becomes PNG at best compression, since the BMP and TIFF encoders here
    /// write uncompressed data.
    pub fn lossless(input: ImageFormat) -> Self {
        match input {
            ImageFormat::WebP => OutputFormat::WebP,
            _ => OutputFormat::Png {
                compression: PngCompression::Best,
            },
        }
    }

    /// Lossy re-encode: PNG stays PNG with maximum compression, everything
    /// else becomes JPEG at the requested quality. PNG has no quality knob,
    /// so `quality` is ignored for PNG input.
    pub fn lossy(input: ImageFormat, quality: u8) -> Self {
        match input {
            ImageFormat::Png => OutputFormat::Png {
                compression: PngCompression::Best,
            },
            _ => OutputFormat::Jpeg { quality },
        }
    }
}

impl From<TargetFormat> for OutputFormat {
    fn from(target: TargetFormat) -> Self {
        match target {
            TargetFormat::Jpeg | TargetFormat::Jpg => OutputFormat::Jpeg {
                quality: CONVERT_QUALITY,
            },
            // The WebP encoder available here is lossless, so no quality applies.
            TargetFormat::Webp => OutputFormat::WebP,
            TargetFormat::Gif => OutputFormat::Gif,
            TargetFormat::Bmp => OutputFormat::Bmp,
            TargetFormat::Png | TargetFormat::Tiff | TargetFormat::Heic => OutputFormat::Png {
                compression: PngCompression::Default,
            },
        }
    }
}

/// Lowercase format name as reported to clients and used in data URLs.
pub fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Avif => "avif",
        ImageFormat::Ico => "ico",
        ImageFormat::Tga => "tga",
        ImageFormat::Qoi => "qoi",
        ImageFormat::Pnm => "pnm",
        ImageFormat::Dds => "dds",
        ImageFormat::Hdr => "hdr",
        ImageFormat::OpenExr => "exr",
        ImageFormat::Farbfeld => "farbfeld",
        _ => format.extensions_str().first().copied().unwrap_or("unknown"),
    }
}

// Most encoders only take 8-bit layouts.
fn to_8bit(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => Cow::Borrowed(image),
        _ if image.color().has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
        _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
    }
}

// PNG handles 16-bit but not float samples.
fn to_png_compatible(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image {
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
            Cow::Owned(DynamicImage::ImageRgba16(image.to_rgba16()))
        }
        _ => Cow::Borrowed(image),
    }
}

pub fn encode_image(image: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>, ImagingError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ImagingError::EmptyImage {
            width: image.width(),
            height: image.height(),
        });
    }

    let mut buffer = Cursor::new(Vec::new());

    match format {
        OutputFormat::Png { compression } => {
            debug!("Encoding output as PNG ({:?} compression).", compression);
            let compression = match compression {
                PngCompression::Default => CompressionType::Default,
                PngCompression::Best => CompressionType::Best,
            };
            let encoder =
                PngEncoder::new_with_quality(&mut buffer, compression, PngFilterType::Adaptive);
            to_png_compatible(image).write_with_encoder(encoder)?;
        }
        OutputFormat::Jpeg { quality } => {
            debug!("Encoding output as JPEG (quality {}).", quality);
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
            rgb.write_with_encoder(encoder)?;
        }
        OutputFormat::WebP => {
            debug!("Encoding output as lossless WebP.");
            to_8bit(image).write_with_encoder(WebPEncoder::new_lossless(&mut buffer))?;
        }
        OutputFormat::Gif => {
            debug!("Encoding output as GIF.");
            let mut encoder = GifEncoder::new(&mut buffer);
            encoder.encode_frame(image::Frame::new(image.to_rgba8()))?;
        }
        OutputFormat::Bmp => {
            debug!("Encoding output as BMP.");
            to_8bit(image).write_with_encoder(BmpEncoder::new(&mut buffer))?;
        }
        OutputFormat::Tiff => {
            debug!("Encoding output as TIFF.");
            to_8bit(image).write_with_encoder(TiffEncoder::new(&mut buffer))?;
        }
    }

    Ok(buffer.into_inner())
}
