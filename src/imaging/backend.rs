use image::{
    ColorType, DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbaImage,
    imageops::{self, FilterType},
};
use std::io::Cursor;

use super::{
    ImagingError,
    codec::{OutputFormat, encode_image},
};

/// Clockwise rotation by a fixed angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipAxis {
    /// Mirror left-right.
    Horizontal,
    /// Mirror top-bottom.
    Vertical,
}

/// Header-level facts about an encoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageProbe {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub color_type: ColorType,
}

impl ImageProbe {
    pub fn has_alpha(&self) -> bool {
        self.color_type.has_alpha()
    }

    /// Color space label in the vocabulary browsers' image tools commonly use.
    pub fn color_space(&self) -> &'static str {
        match self.color_type {
            ColorType::L8 | ColorType::La8 => "b-w",
            ColorType::L16 | ColorType::La16 => "grey16",
            ColorType::Rgb16 | ColorType::Rgba16 => "rgb16",
            ColorType::Rgb32F | ColorType::Rgba32F => "scrgb",
            _ => "srgb",
        }
    }
}

/// Everything the API needs from an image library. Implementations must be
/// stateless; calls are CPU-bound and run on blocking threads.
pub trait ImageBackend: Send + Sync {
    /// Reads format, dimensions and color layout without decoding pixels.
    fn probe(&self, data: &[u8]) -> Result<ImageProbe, ImagingError>;

    fn decode(&self, data: &[u8]) -> Result<(ImageFormat, DynamicImage), ImagingError>;

    fn encode(&self, image: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>, ImagingError>;

    /// Resamples to exactly `width` x `height`.
    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage;

    fn rotate(&self, image: &DynamicImage, rotation: Rotation) -> DynamicImage;

    fn flip(&self, image: &DynamicImage, axis: FlipAxis) -> DynamicImage;

    /// Alpha-blends `overlay` onto `image` at the origin.
    fn composite(&self, image: &mut DynamicImage, overlay: &RgbaImage);
}

/// `ImageBackend` backed by the `image` crate.
#[derive(Debug, Clone, Copy)]
pub struct RasterBackend {
    pub filter: FilterType,
}

impl Default for RasterBackend {
    fn default() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }
}

fn reader(data: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, ImagingError> {
    Ok(ImageReader::new(Cursor::new(data)).with_guessed_format()?)
}

impl ImageBackend for RasterBackend {
    fn probe(&self, data: &[u8]) -> Result<ImageProbe, ImagingError> {
        let reader = reader(data)?;
        let format = reader.format().ok_or(ImagingError::UnknownFormat)?;
        let decoder = reader.into_decoder()?;
        let (width, height) = decoder.dimensions();

        Ok(ImageProbe {
            format,
            width,
            height,
            color_type: decoder.color_type(),
        })
    }

    fn decode(&self, data: &[u8]) -> Result<(ImageFormat, DynamicImage), ImagingError> {
        let reader = reader(data)?;
        let format = reader.format().ok_or(ImagingError::UnknownFormat)?;
        Ok((format, reader.decode()?))
    }

    fn encode(&self, image: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>, ImagingError> {
        encode_image(image, format)
    }

    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        image.resize_exact(width, height, self.filter)
    }

    fn rotate(&self, image: &DynamicImage, rotation: Rotation) -> DynamicImage {
        match rotation {
            Rotation::Clockwise90 => image.rotate90(),
            Rotation::Clockwise180 => image.rotate180(),
            Rotation::Clockwise270 => image.rotate270(),
        }
    }

    fn flip(&self, image: &DynamicImage, axis: FlipAxis) -> DynamicImage {
        match axis {
            FlipAxis::Horizontal => image.fliph(),
            FlipAxis::Vertical => image.flipv(),
        }
    }

    fn composite(&self, image: &mut DynamicImage, overlay: &RgbaImage) {
        let had_alpha = image.color().has_alpha();
        let mut base = image.to_rgba8();
        imageops::overlay(&mut base, overlay, 0, 0);

        let blended = DynamicImage::ImageRgba8(base);
        *image = if had_alpha {
            blended
        } else {
            DynamicImage::ImageRgb8(blended.to_rgb8())
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::codec::PngCompression;
    use image::{GenericImageView, Rgba};

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        encode_image(
            image,
            OutputFormat::Png {
                compression: PngCompression::Default,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_probe_reads_header() {
        let image = DynamicImage::new_rgba8(31, 17);
        let probe = RasterBackend::default().probe(&png_bytes(&image)).unwrap();

        assert_eq!(probe.format, ImageFormat::Png);
        assert_eq!((probe.width, probe.height), (31, 17));
        assert!(probe.has_alpha());
        assert_eq!(probe.color_space(), "srgb");
    }

    #[test]
    fn test_probe_grayscale() {
        let image = DynamicImage::new_luma8(3, 3);
        let probe = RasterBackend::default().probe(&png_bytes(&image)).unwrap();
        assert!(!probe.has_alpha());
        assert_eq!(probe.color_space(), "b-w");
    }

    #[test]
    fn test_probe_rejects_garbage() {
        assert!(RasterBackend::default().probe(b"definitely not an image").is_err());
        assert!(RasterBackend::default().decode(b"").is_err());
    }

    #[test]
    fn test_rotate_and_flip() {
        let backend = RasterBackend::default();
        let mut image = DynamicImage::new_rgba8(4, 2);
        image.as_mut_rgba8().unwrap().put_pixel(0, 0, Rgba([255, 0, 0, 255]));

        let rotated = backend.rotate(&image, Rotation::Clockwise90);
        assert_eq!(rotated.dimensions(), (2, 4));
        // Top-left moves to top-right under a clockwise quarter turn.
        assert_eq!(rotated.get_pixel(1, 0), Rgba([255, 0, 0, 255]));

        let flipped = backend.flip(&image, FlipAxis::Horizontal);
        assert_eq!(flipped.get_pixel(3, 0), Rgba([255, 0, 0, 255]));

        let flipped = backend.flip(&image, FlipAxis::Vertical);
        assert_eq!(flipped.get_pixel(0, 1), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_composite_keeps_color_layout() {
        let backend = RasterBackend::default();
        let mut image = DynamicImage::new_rgb8(2, 2);
        let mut overlay = RgbaImage::new(2, 2);
        overlay.put_pixel(1, 1, Rgba([255, 255, 255, 255]));

        backend.composite(&mut image, &overlay);

        assert!(matches!(image, DynamicImage::ImageRgb8(_)));
        assert_eq!(image.get_pixel(1, 1), Rgba([255, 255, 255, 255]));
        assert_eq!(image.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    }
}
