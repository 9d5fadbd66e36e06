// One function per API operation. Each takes the uploaded bytes and validated
// settings and returns the encoded result plus the metadata the response needs.

use image::{DynamicImage, GenericImageView, ImageFormat};
use tracing::{debug, warn};

use super::{
    ImagingError,
    backend::{FlipAxis, ImageBackend, ImageProbe},
    codec::OutputFormat,
    watermark,
};
use crate::settings::{
    CompressSettings, CompressionMode, ConvertSettings, OperationSettings, ResizeSettings,
    RotateSettings, WatermarkSettings,
};

#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub bytes: Vec<u8>,
    pub original_format: ImageFormat,
    /// Format of `bytes`, re-read from the encoded output when possible.
    pub format: ImageFormat,
    /// Dimensions of `bytes`; `None` if the encoded output could not be probed.
    pub dimensions: Option<(u32, u32)>,
}

pub fn apply(
    backend: &dyn ImageBackend,
    data: &[u8],
    settings: &OperationSettings,
) -> Result<TransformOutput, ImagingError> {
    match settings {
        OperationSettings::Compress(s) => compress(backend, data, s),
        OperationSettings::Convert(s) => convert(backend, data, s),
        OperationSettings::Resize(s) => resize(backend, data, s),
        OperationSettings::Rotate(s) => rotate(backend, data, s),
        OperationSettings::Watermark(s) => add_watermark(backend, data, s),
    }
}

// Reads back what was actually produced instead of trusting the encoder choice.
fn finish(
    backend: &dyn ImageBackend,
    bytes: Vec<u8>,
    original_format: ImageFormat,
    encoded_as: OutputFormat,
) -> TransformOutput {
    match backend.probe(&bytes) {
        Ok(probe) => TransformOutput {
            bytes,
            original_format,
            format: probe.format,
            dimensions: Some((probe.width, probe.height)),
        },
        Err(e) => {
            warn!("Could not re-read encoded output: {}", e);
            TransformOutput {
                bytes,
                original_format,
                format: encoded_as.image_format(),
                dimensions: None,
            }
        }
    }
}

fn encode_and_finish(
    backend: &dyn ImageBackend,
    image: &DynamicImage,
    original_format: ImageFormat,
    output_format: OutputFormat,
) -> Result<TransformOutput, ImagingError> {
    let bytes = backend.encode(image, output_format)?;
    Ok(finish(backend, bytes, original_format, output_format))
}

pub fn compress(
    backend: &dyn ImageBackend,
    data: &[u8],
    settings: &CompressSettings,
) -> Result<TransformOutput, ImagingError> {
    let (format, image) = backend.decode(data)?;
    let output_format = match settings.mode {
        CompressionMode::Lossless => OutputFormat::lossless(format),
        CompressionMode::Lossy => OutputFormat::lossy(format, settings.quality_percent()),
    };
    debug!("Compressing {:?} input as {:?}", format, output_format);
    encode_and_finish(backend, &image, format, output_format)
}

pub fn convert(
    backend: &dyn ImageBackend,
    data: &[u8],
    settings: &ConvertSettings,
) -> Result<TransformOutput, ImagingError> {
    let (format, image) = backend.decode(data)?;
    encode_and_finish(
        backend,
        &image,
        format,
        OutputFormat::from(settings.target_format),
    )
}

/// Largest buffer a resize may allocate. Matches the default allocation
/// limit the decoder applies to uploads.
pub const MAX_RESIZE_ALLOC_BYTES: u64 = 512 * 1024 * 1024;

// Resampling first builds a `source_w` x `target_h` buffer of f32 RGBA.
const RESAMPLE_BYTES_PER_PIXEL: u64 = 16;

/// Rejects resize targets whose buffers would exceed `MAX_RESIZE_ALLOC_BYTES`.
pub fn check_resize_budget(
    source_w: u32,
    target_w: u32,
    target_h: u32,
    bytes_per_pixel: u8,
) -> Result<(), ImagingError> {
    let intermediate = u64::from(source_w)
        .saturating_mul(u64::from(target_h))
        .saturating_mul(RESAMPLE_BYTES_PER_PIXEL);
    let output = u64::from(target_w)
        .saturating_mul(u64::from(target_h))
        .saturating_mul(u64::from(bytes_per_pixel));
    let required = intermediate.max(output);

    if required > MAX_RESIZE_ALLOC_BYTES {
        return Err(ImagingError::TooLarge {
            width: target_w,
            height: target_h,
            required,
            limit: MAX_RESIZE_ALLOC_BYTES,
        });
    }
    Ok(())
}

fn round_dimension(value: f64) -> u32 {
    value.round().clamp(1.0, u32::MAX as f64) as u32
}

/// Target dimensions for a resize of a `width` x `height` source.
pub fn plan_resize(width: u32, height: u32, settings: &ResizeSettings) -> (u32, u32) {
    let (w, h) = (f64::from(width), f64::from(height));

    if let Some(scale) = settings.scale_percent {
        let factor = scale / 100.0;
        return (round_dimension(w * factor), round_dimension(h * factor));
    }

    match (settings.width, settings.height) {
        (Some(target_w), Some(target_h)) if settings.maintain_aspect_ratio => {
            // Fit inside the box without cropping.
            let factor = (target_w / w).min(target_h / h);
            (round_dimension(w * factor), round_dimension(h * factor))
        }
        (Some(target_w), Some(target_h)) => (round_dimension(target_w), round_dimension(target_h)),
        (Some(target_w), None) => (
            round_dimension(target_w),
            round_dimension(h * target_w / w),
        ),
        (None, Some(target_h)) => (
            round_dimension(w * target_h / h),
            round_dimension(target_h),
        ),
        (None, None) => (width, height),
    }
}

pub fn resize(
    backend: &dyn ImageBackend,
    data: &[u8],
    settings: &ResizeSettings,
) -> Result<TransformOutput, ImagingError> {
    let (format, image) = backend.decode(data)?;
    let (source_w, source_h) = image.dimensions();
    if source_w == 0 || source_h == 0 {
        return Err(ImagingError::EmptyImage {
            width: source_w,
            height: source_h,
        });
    }

    let (target_w, target_h) = plan_resize(source_w, source_h, settings);
    check_resize_budget(source_w, target_w, target_h, image.color().bytes_per_pixel())?;
    debug!(
        "Resizing {}x{} to {}x{}",
        source_w, source_h, target_w, target_h
    );

    let resized = backend.resize(&image, target_w, target_h);
    encode_and_finish(backend, &resized, format, OutputFormat::preserving(format))
}

pub fn rotate(
    backend: &dyn ImageBackend,
    data: &[u8],
    settings: &RotateSettings,
) -> Result<TransformOutput, ImagingError> {
    let (format, image) = backend.decode(data)?;

    let mut image = backend.rotate(&image, settings.degrees);
    if settings.flip_horizontal {
        image = backend.flip(&image, FlipAxis::Horizontal);
    }
    if settings.flip_vertical {
        image = backend.flip(&image, FlipAxis::Vertical);
    }

    encode_and_finish(backend, &image, format, OutputFormat::preserving(format))
}

pub fn add_watermark(
    backend: &dyn ImageBackend,
    data: &[u8],
    settings: &WatermarkSettings,
) -> Result<TransformOutput, ImagingError> {
    let (format, mut image) = backend.decode(data)?;
    let overlay = watermark::render_overlay(image.width(), image.height(), settings);
    backend.composite(&mut image, &overlay);
    encode_and_finish(backend, &image, format, OutputFormat::preserving(format))
}

/// Metadata for the info endpoint. Only the header is read.
pub fn inspect(backend: &dyn ImageBackend, data: &[u8]) -> Result<ImageProbe, ImagingError> {
    backend.probe(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{
        backend::{RasterBackend, Rotation},
        codec::{PngCompression, encode_image},
        watermark::WatermarkPosition,
    };
    use crate::settings::TargetFormat;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    fn encoded(image: &DynamicImage, format: OutputFormat) -> Vec<u8> {
        encode_image(image, format).unwrap()
    }

    fn png(image: &DynamicImage) -> Vec<u8> {
        encoded(
            image,
            OutputFormat::Png {
                compression: PngCompression::Default,
            },
        )
    }

    fn resize_settings(
        width: Option<f64>,
        height: Option<f64>,
        scale_percent: Option<f64>,
        maintain_aspect_ratio: bool,
    ) -> ResizeSettings {
        ResizeSettings {
            width,
            height,
            scale_percent,
            maintain_aspect_ratio,
        }
    }

    #[test]
    fn test_plan_resize_scale_percent() {
        let settings = resize_settings(None, None, Some(50.0), true);
        assert_eq!(plan_resize(800, 600, &settings), (400, 300));

        // Ties round away from zero.
        let settings = resize_settings(None, None, Some(50.0), true);
        assert_eq!(plan_resize(5, 3, &settings), (3, 2));

        // Scale wins over explicit dimensions.
        let settings = resize_settings(Some(10.0), Some(10.0), Some(200.0), false);
        assert_eq!(plan_resize(30, 20, &settings), (60, 40));
    }

    #[test]
    fn test_plan_resize_keeps_aspect_ratio() {
        let settings = resize_settings(Some(100.0), None, None, true);
        assert_eq!(plan_resize(400, 200, &settings), (100, 50));

        let settings = resize_settings(None, Some(50.0), None, true);
        assert_eq!(plan_resize(400, 200, &settings), (100, 50));

        // Fits inside the box.
        let settings = resize_settings(Some(100.0), Some(100.0), None, true);
        assert_eq!(plan_resize(400, 200, &settings), (100, 50));
        assert_eq!(plan_resize(200, 400, &settings), (50, 100));
    }

    #[test]
    fn test_plan_resize_without_lock_uses_exact_box() {
        let settings = resize_settings(Some(120.0), Some(30.0), None, false);
        assert_eq!(plan_resize(400, 200, &settings), (120, 30));
    }

    #[test]
    fn test_plan_resize_never_reaches_zero() {
        let settings = resize_settings(None, None, Some(0.01), true);
        assert_eq!(plan_resize(10, 10, &settings), (1, 1));
    }

    #[test]
    fn test_resize_reports_new_dimensions_and_keeps_format() {
        let backend = RasterBackend::default();
        let data = encoded(&gradient(800, 600), OutputFormat::Jpeg { quality: 85 });

        let output = resize(
            &backend,
            &data,
            &resize_settings(None, None, Some(50.0), true),
        )
        .unwrap();

        assert_eq!(output.dimensions, Some((400, 300)));
        assert_eq!(output.original_format, ImageFormat::Jpeg);
        assert_eq!(output.format, ImageFormat::Jpeg);
    }

    #[test]
    fn test_rotate_180_twice_restores_original() {
        let backend = RasterBackend::default();
        let original = gradient(7, 5);
        let settings = RotateSettings {
            degrees: Rotation::Clockwise180,
            flip_horizontal: false,
            flip_vertical: false,
        };

        let once = rotate(&backend, &png(&original), &settings).unwrap();
        assert_eq!(once.dimensions, Some((7, 5)));

        let once_image = image::load_from_memory(&once.bytes).unwrap();
        assert_eq!(once_image.get_pixel(0, 0), original.get_pixel(6, 4));

        let twice = rotate(&backend, &once.bytes, &settings).unwrap();
        let twice_image = image::load_from_memory(&twice.bytes).unwrap();
        assert_eq!(twice_image.to_rgb8(), original.to_rgb8());
    }

    #[test]
    fn test_rotate_then_flip_order() {
        let backend = RasterBackend::default();
        let mut source = RgbaImage::new(3, 2);
        source.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let data = png(&DynamicImage::ImageRgba8(source));

        // 90 clockwise moves (0,0) to (1,0) on the 2x3 result; the horizontal
        // flip then moves it to (0,0).
        let output = rotate(
            &backend,
            &data,
            &RotateSettings {
                degrees: Rotation::Clockwise90,
                flip_horizontal: true,
                flip_vertical: false,
            },
        )
        .unwrap();
        assert_eq!(output.dimensions, Some((2, 3)));
        let result = image::load_from_memory(&output.bytes).unwrap();
        assert_eq!(result.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_convert_targets() {
        let backend = RasterBackend::default();
        let data = encoded(&gradient(16, 9), OutputFormat::Jpeg { quality: 90 });

        let cases = [
            (TargetFormat::Png, ImageFormat::Png),
            (TargetFormat::Jpg, ImageFormat::Jpeg),
            (TargetFormat::Webp, ImageFormat::WebP),
            (TargetFormat::Gif, ImageFormat::Gif),
            (TargetFormat::Bmp, ImageFormat::Bmp),
            (TargetFormat::Heic, ImageFormat::Png),
        ];
        for (target, expected) in cases {
            let output = convert(
                &backend,
                &data,
                &ConvertSettings {
                    target_format: target,
                },
            )
            .unwrap();
            assert_eq!(output.format, expected, "{:?}", target);
            assert_eq!(output.original_format, ImageFormat::Jpeg);
            assert_eq!(output.dimensions, Some((16, 9)));
        }
    }

    #[test]
    fn test_resize_budget() {
        assert!(check_resize_budget(4000, 8000, 6000, 3).is_ok());
        // 4000x3000 at 1000% needs a 4000x30000 f32 pass.
        assert!(matches!(
            check_resize_budget(4000, 40000, 30000, 3),
            Err(ImagingError::TooLarge {
                width: 40000,
                height: 30000,
                ..
            })
        ));
        assert!(check_resize_budget(1, u32::MAX, u32::MAX, 4).is_err());
    }

    #[test]
    fn test_oversized_resize_is_rejected_before_resampling() {
        let backend = RasterBackend::default();
        let data = png(&gradient(1, 1));
        let settings = resize_settings(Some(1e9), Some(1e9), None, false);

        let result = resize(&backend, &data, &settings);
        assert!(
            matches!(result, Err(ImagingError::TooLarge { .. })),
            "{:?}",
            result.map(|output| output.dimensions)
        );

        // Small source, huge scale on one axis only.
        let data = png(&gradient(10, 10));
        let settings = resize_settings(None, Some(50_000_000.0), None, true);
        assert!(matches!(
            resize(&backend, &data, &settings),
            Err(ImagingError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_compress_modes() {
        let backend = RasterBackend::default();
        let jpeg = encoded(&gradient(32, 32), OutputFormat::Jpeg { quality: 95 });
        let png_data = png(&gradient(32, 32));

        let lossy = CompressSettings {
            quality: 30.0,
            mode: CompressionMode::Lossy,
        };
        assert_eq!(
            compress(&backend, &jpeg, &lossy).unwrap().format,
            ImageFormat::Jpeg
        );
        assert_eq!(
            compress(&backend, &png_data, &lossy).unwrap().format,
            ImageFormat::Png
        );

        let lossless = CompressSettings {
            quality: 80.0,
            mode: CompressionMode::Lossless,
        };
        let output = compress(&backend, &png_data, &lossless).unwrap();
        assert_eq!(output.format, ImageFormat::Png);
        let restored = image::load_from_memory(&output.bytes).unwrap();
        assert_eq!(restored.to_rgb8(), gradient(32, 32).to_rgb8());

        // No lossless JPEG encoder: falls back to PNG.
        assert_eq!(
            compress(&backend, &jpeg, &lossless).unwrap().format,
            ImageFormat::Png
        );
    }

    #[test]
    fn test_lossless_compression_shrinks_bmp() {
        let backend = RasterBackend::default();
        let bmp = encoded(&DynamicImage::new_rgb8(128, 128), OutputFormat::Bmp);
        let output = compress(
            &backend,
            &bmp,
            &CompressSettings {
                quality: 80.0,
                mode: CompressionMode::Lossless,
            },
        )
        .unwrap();

        assert_eq!(output.original_format, ImageFormat::Bmp);
        assert_eq!(output.format, ImageFormat::Png);
        assert!(output.bytes.len() < bmp.len() / 10);
        let restored = image::load_from_memory(&output.bytes).unwrap();
        assert_eq!(restored.to_rgb8(), DynamicImage::new_rgb8(128, 128).to_rgb8());
    }

    #[test]
    fn test_lossy_compression_shrinks_jpeg() {
        let backend = RasterBackend::default();
        let jpeg = encoded(&gradient(256, 256), OutputFormat::Jpeg { quality: 100 });
        let output = compress(
            &backend,
            &jpeg,
            &CompressSettings {
                quality: 20.0,
                mode: CompressionMode::Lossy,
            },
        )
        .unwrap();
        assert!(output.bytes.len() < jpeg.len());
    }

    #[test]
    fn test_watermark_keeps_dimensions_and_format() {
        let backend = RasterBackend::default();
        let data = png(&DynamicImage::new_rgb8(300, 200));

        let output = add_watermark(
            &backend,
            &data,
            &WatermarkSettings {
                text: "(c) 2024".to_string(),
                position: WatermarkPosition::BottomLeft,
                opacity: 1.0,
                font_size: 24.0,
            },
        )
        .unwrap();

        assert_eq!(output.format, ImageFormat::Png);
        assert_eq!(output.dimensions, Some((300, 200)));

        let result = image::load_from_memory(&output.bytes).unwrap().to_rgb8();
        assert!(result.pixels().any(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn test_inspect_reads_metadata() {
        let backend = RasterBackend::default();
        let probe = inspect(&backend, &png(&DynamicImage::new_rgba8(9, 4))).unwrap();
        assert_eq!(probe.format, ImageFormat::Png);
        assert_eq!((probe.width, probe.height), (9, 4));
        assert!(probe.has_alpha());
    }

    #[test]
    fn test_apply_dispatches_on_settings() {
        let backend = RasterBackend::default();
        let data = png(&gradient(10, 4));
        let settings = OperationSettings::Rotate(RotateSettings {
            degrees: Rotation::Clockwise270,
            flip_horizontal: false,
            flip_vertical: true,
        });

        let output = apply(&backend, &data, &settings).unwrap();
        assert_eq!(output.dimensions, Some((4, 10)));
    }

    #[test]
    fn test_undecodable_input_fails() {
        let backend = RasterBackend::default();
        let result = convert(
            &backend,
            b"GIF89a but not really",
            &ConvertSettings {
                target_format: TargetFormat::Png,
            },
        );
        assert!(result.is_err());
    }
}
