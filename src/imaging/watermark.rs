// Text watermark layer.
//
// Glyphs come from the 8x8 bitmap font in `font8x8` and are scaled with
// nearest-neighbour sampling so that one glyph cell is `font_size` pixels
// square. The layer is a transparent canvas with the exact size of the
// target image, ready to be composited at the origin.

use font8x8::{BASIC_FONTS, GREEK_FONTS, LATIN_FONTS, UnicodeFonts};
use image::{Rgba, RgbaImage};
use serde::Deserialize;

use crate::settings::WatermarkSettings;

/// Horizontal distance of left/right anchors from the image edge.
const EDGE_MARGIN: i64 = 30;
/// Baseline of top-anchored text.
const TOP_BASELINE: i64 = 50;
/// Distance of the bottom baseline from the bottom edge.
const BOTTOM_MARGIN: i64 = 30;
const SHADOW_OFFSET: i64 = 2;
const SHADOW_STRENGTH: f64 = 0.8;
// Keeps the glyph arithmetic far away from overflow.
const MAX_CELL_SIZE: f64 = 65_536.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Start,
    Middle,
    End,
}

impl WatermarkPosition {
    fn anchor(self) -> Anchor {
        match self {
            WatermarkPosition::TopLeft | WatermarkPosition::BottomLeft => Anchor::Start,
            WatermarkPosition::TopRight | WatermarkPosition::BottomRight => Anchor::End,
            WatermarkPosition::Center => Anchor::Middle,
        }
    }

    fn anchor_x(self, width: u32) -> i64 {
        match self.anchor() {
            Anchor::Start => EDGE_MARGIN,
            Anchor::End => i64::from(width) - EDGE_MARGIN,
            Anchor::Middle => i64::from(width) / 2,
        }
    }

    fn baseline_y(self, height: u32) -> i64 {
        match self {
            WatermarkPosition::TopLeft | WatermarkPosition::TopRight => TOP_BASELINE,
            WatermarkPosition::BottomLeft | WatermarkPosition::BottomRight => {
                i64::from(height) - BOTTOM_MARGIN
            }
            WatermarkPosition::Center => i64::from(height) / 2,
        }
    }
}

/// Placement of the text run on the canvas, in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLayout {
    pub left: i64,
    pub top: i64,
    pub cell: i64,
}

impl TextLayout {
    pub fn compute(
        position: WatermarkPosition,
        width: u32,
        height: u32,
        glyphs: usize,
        font_size: f64,
    ) -> Self {
        let cell = font_size.round().clamp(1.0, MAX_CELL_SIZE) as i64;
        let text_width = cell.saturating_mul(glyphs as i64);
        let anchor_x = position.anchor_x(width);

        let left = match position.anchor() {
            Anchor::Start => anchor_x,
            Anchor::Middle => anchor_x - text_width / 2,
            Anchor::End => anchor_x - text_width,
        };

        Self {
            left,
            // Glyph cells sit on the baseline.
            top: position.baseline_y(height) - cell,
            cell,
        }
    }
}

fn glyph(ch: char) -> [u8; 8] {
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| GREEK_FONTS.get(ch))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

fn alpha(opacity: f64) -> u8 {
    (opacity.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Renders the watermark text onto a transparent canvas of `width` x `height`.
pub fn render_overlay(width: u32, height: u32, settings: &WatermarkSettings) -> RgbaImage {
    let mut canvas = RgbaImage::new(width, height);
    let glyphs: Vec<[u8; 8]> = settings.text.chars().map(glyph).collect();
    let layout = TextLayout::compute(
        settings.position,
        width,
        height,
        glyphs.len(),
        settings.font_size,
    );

    let shadow = Rgba([0, 0, 0, alpha(settings.opacity * SHADOW_STRENGTH)]);
    let fill = Rgba([255, 255, 255, alpha(settings.opacity)]);

    draw_text(&mut canvas, &glyphs, &layout, SHADOW_OFFSET, shadow);
    draw_text(&mut canvas, &glyphs, &layout, 0, fill);
    canvas
}

fn draw_text(
    canvas: &mut RgbaImage,
    glyphs: &[[u8; 8]],
    layout: &TextLayout,
    offset: i64,
    color: Rgba<u8>,
) {
    let (width, height) = (i64::from(canvas.width()), i64::from(canvas.height()));
    let cell = layout.cell;
    let top = layout.top + offset;

    let y_start = top.max(0);
    let y_end = (top + cell).min(height);
    if y_start >= y_end {
        return;
    }

    for (index, rows) in glyphs.iter().enumerate() {
        let left = layout.left + offset + cell * index as i64;
        if left >= width {
            break;
        }
        let x_start = left.max(0);
        let x_end = (left + cell).min(width);
        if x_start >= x_end {
            continue;
        }

        for y in y_start..y_end {
            let row = rows[((y - top) * 8 / cell) as usize];
            if row == 0 {
                continue;
            }
            for x in x_start..x_end {
                // Bit 0 is the leftmost column.
                let column = (x - left) * 8 / cell;
                if row & (1 << column) != 0 {
                    canvas.put_pixel(x as u32, y as u32, color);
                }
            }
        }
    }
}
