// Per-operation settings carried in the `settings` multipart field.
// Each variant deserializes with its own defaults and then validates its
// bounds before any image work starts.

use crate::imaging::{backend::Rotation, watermark::WatermarkPosition};
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("Invalid settings: {0}")]
    Malformed(String),

    #[error("{field} {constraint}")]
    Constraint {
        field: &'static str,
        constraint: &'static str,
    },

    #[error("Provide scalePercent, width or height to resize the image")]
    MissingResizeTarget,
}

/// Operations exposed by the API. `Info` carries no settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Compress,
    Convert,
    Resize,
    Rotate,
    Watermark,
    Info,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Compress => "compress",
            Operation::Convert => "convert",
            Operation::Resize => "resize",
            Operation::Rotate => "rotate",
            Operation::Watermark => "watermark",
            Operation::Info => "info",
        }
    }

    /// User-facing message for a failed operation. Details only go to the log.
    pub fn failure_message(self) -> &'static str {
        match self {
            Operation::Compress => "Failed to compress image",
            Operation::Convert => "Failed to convert image",
            Operation::Resize => "Failed to resize image",
            Operation::Rotate => "Failed to rotate image",
            Operation::Watermark => "Failed to add watermark",
            Operation::Info => "Failed to get image info",
        }
    }
}

pub trait ValidateSettings: DeserializeOwned {
    fn validate(&self) -> Result<(), SettingsError>;
}

/// Parses and validates the raw `settings` text. A missing or blank field is
/// read as `{}` so every default applies.
pub fn parse_settings<S: ValidateSettings>(raw: Option<&str>) -> Result<S, SettingsError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("{}");
    let settings: S =
        serde_json::from_str(raw).map_err(|e| SettingsError::Malformed(e.to_string()))?;
    settings.validate()?;
    Ok(settings)
}

/// Validated settings for one request, keyed by operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationSettings {
    Compress(CompressSettings),
    Convert(ConvertSettings),
    Resize(ResizeSettings),
    Rotate(RotateSettings),
    Watermark(WatermarkSettings),
}

impl OperationSettings {
    pub fn operation(&self) -> Operation {
        match self {
            OperationSettings::Compress(_) => Operation::Compress,
            OperationSettings::Convert(_) => Operation::Convert,
            OperationSettings::Resize(_) => Operation::Resize,
            OperationSettings::Rotate(_) => Operation::Rotate,
            OperationSettings::Watermark(_) => Operation::Watermark,
        }
    }
}

fn ensure_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
    constraint: &'static str,
) -> Result<(), SettingsError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::Constraint { field, constraint })
    }
}

fn ensure_positive(field: &'static str, value: f64) -> Result<(), SettingsError> {
    // Also rejects NaN.
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(SettingsError::Constraint {
            field,
            constraint: "must be greater than 0",
        })
    }
}

// --- compress ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    Lossless,
    #[default]
    Lossy,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompressSettings {
    pub quality: f64,
    pub mode: CompressionMode,
}

impl Default for CompressSettings {
    fn default() -> Self {
        Self {
            quality: 80.0,
            mode: CompressionMode::Lossy,
        }
    }
}

impl CompressSettings {
    pub fn quality_percent(&self) -> u8 {
        self.quality.round().clamp(1.0, 100.0) as u8
    }
}

impl ValidateSettings for CompressSettings {
    fn validate(&self) -> Result<(), SettingsError> {
        ensure_range(
            "quality",
            self.quality,
            1.0,
            100.0,
            "must be between 1 and 100",
        )
    }
}

// --- convert ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Jpeg,
    Jpg,
    Png,
    Webp,
    Gif,
    Bmp,
    Tiff,
    Heic,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertSettings {
    pub target_format: TargetFormat,
}

impl ValidateSettings for ConvertSettings {
    fn validate(&self) -> Result<(), SettingsError> {
        Ok(())
    }
}

// --- resize ---

pub const MAX_SCALE_PERCENT: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResizeSettings {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub scale_percent: Option<f64>,
    pub maintain_aspect_ratio: bool,
}

impl Default for ResizeSettings {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            scale_percent: None,
            maintain_aspect_ratio: true,
        }
    }
}

impl ValidateSettings for ResizeSettings {
    fn validate(&self) -> Result<(), SettingsError> {
        if let Some(width) = self.width {
            ensure_positive("width", width)?;
        }
        if let Some(height) = self.height {
            ensure_positive("height", height)?;
        }
        if let Some(scale) = self.scale_percent {
            ensure_positive("scalePercent", scale)?;
            if scale > MAX_SCALE_PERCENT {
                return Err(SettingsError::Constraint {
                    field: "scalePercent",
                    constraint: "must be at most 1000",
                });
            }
        }
        if self.scale_percent.is_none() && self.width.is_none() && self.height.is_none() {
            return Err(SettingsError::MissingResizeTarget);
        }
        Ok(())
    }
}

// --- rotate ---

// Clients send degrees as "90"/"180"/"270"; plain numbers are accepted too.
impl<'de> Deserialize<'de> for Rotation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawDegrees {
            Text(String),
            Number(f64),
        }

        let degrees = match RawDegrees::deserialize(deserializer)? {
            RawDegrees::Text(text) => text.trim().parse::<f64>().ok(),
            RawDegrees::Number(number) => Some(number),
        };

        match degrees {
            Some(d) if d == 90.0 => Ok(Rotation::Clockwise90),
            Some(d) if d == 180.0 => Ok(Rotation::Clockwise180),
            Some(d) if d == 270.0 => Ok(Rotation::Clockwise270),
            _ => Err(serde::de::Error::custom(
                "degrees must be one of 90, 180, 270",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateSettings {
    pub degrees: Rotation,
    #[serde(default)]
    pub flip_horizontal: bool,
    #[serde(default)]
    pub flip_vertical: bool,
}

impl ValidateSettings for RotateSettings {
    fn validate(&self) -> Result<(), SettingsError> {
        Ok(())
    }
}

// --- watermark ---

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkSettings {
    pub text: String,
    #[serde(default)]
    pub position: WatermarkPosition,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
}

fn default_opacity() -> f64 {
    0.5
}

fn default_font_size() -> f64 {
    24.0
}

impl ValidateSettings for WatermarkSettings {
    fn validate(&self) -> Result<(), SettingsError> {
        if self.text.is_empty() {
            return Err(SettingsError::Constraint {
                field: "text",
                constraint: "must contain at least 1 character",
            });
        }
        ensure_range(
            "opacity",
            self.opacity,
            0.0,
            1.0,
            "must be between 0 and 1",
        )?;
        ensure_positive("fontSize", self.font_size)
    }
}
