//! Raster replay of stroke polylines.
//!
//! The renderer is an injected capability: the compactor holds it as an
//! `Option` and degrades to a permanent no-op when it is absent, so a
//! build without a usable raster backend still runs the rest of the
//! server. The shipped implementation rasterizes onto an RGBA buffer and
//! encodes PNG via the `image` crate.

use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};

use crate::domain::constants::drawing;
use crate::domain::{RenderError, StrokeRecord};

pub trait RasterRenderer: Send + Sync {
    /// Compose a canvas from an optional prior raster (PNG bytes) and a
    /// replayed sequence of strokes, returning encoded PNG bytes.
    ///
    /// An undecodable base layer is ignored; rendering continues from a
    /// blank canvas.
    fn render(
        &self,
        base_png: Option<&[u8]>,
        strokes: &[StrokeRecord],
    ) -> Result<Vec<u8>, RenderError>;
}

/// CPU rasterizer with round caps and joins (a stroke is a chain of
/// stamped discs) and per-stroke opacity applied once over the stroke's
/// whole coverage, so self-overlapping segments do not double-blend.
pub struct PixelRenderer {
    width: u32,
    height: u32,
}

impl PixelRenderer {
    pub fn new() -> Self {
        Self {
            width: drawing::CANVAS_WIDTH,
            height: drawing::CANVAS_HEIGHT,
        }
    }

    fn draw_stroke(&self, canvas: &mut RgbaImage, stroke: &StrokeRecord) {
        let Some([r, g, b]) = parse_hex_color(&stroke.color) else {
            tracing::warn!("Skipping stroke {} with unparseable color", stroke.id);
            return;
        };
        if stroke.points.is_empty() {
            return;
        }

        let radius = (stroke.size / 2.0).max(0.5);
        let mut coverage = vec![false; (self.width * self.height) as usize];

        let mut stamp = |cx: f64, cy: f64| {
            let x_min = ((cx - radius).floor().max(0.0)) as u32;
            let y_min = ((cy - radius).floor().max(0.0)) as u32;
            let x_max = ((cx + radius).ceil() as i64).min(self.width as i64 - 1).max(0) as u32;
            let y_max = ((cy + radius).ceil() as i64).min(self.height as i64 - 1).max(0) as u32;
            for y in y_min..=y_max {
                for x in x_min..=x_max {
                    let dx = x as f64 + 0.5 - cx;
                    let dy = y as f64 + 0.5 - cy;
                    if dx * dx + dy * dy <= radius * radius {
                        coverage[(y * self.width + x) as usize] = true;
                    }
                }
            }
        };

        stamp(stroke.points[0].x, stroke.points[0].y);
        for pair in stroke.points.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let dx = to.x - from.x;
            let dy = to.y - from.y;
            let length = (dx * dx + dy * dy).sqrt();
            let steps = length.ceil().max(1.0) as u32;
            for step in 1..=steps {
                let t = step as f64 / steps as f64;
                stamp(from.x + dx * t, from.y + dy * t);
            }
        }

        let alpha = stroke.opacity.clamp(0.0, 1.0);
        for (index, covered) in coverage.iter().enumerate() {
            if !covered {
                continue;
            }
            let (x, y) = (index as u32 % self.width, index as u32 / self.width);
            let Rgba([dr, dg, db, _]) = *canvas.get_pixel(x, y);
            let blend = |src: u8, dst: u8| -> u8 {
                (src as f64 * alpha + dst as f64 * (1.0 - alpha)).round() as u8
            };
            canvas.put_pixel(x, y, Rgba([blend(r, dr), blend(g, dg), blend(b, db), 255]));
        }
    }
}

impl Default for PixelRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterRenderer for PixelRenderer {
    fn render(
        &self,
        base_png: Option<&[u8]>,
        strokes: &[StrokeRecord],
    ) -> Result<Vec<u8>, RenderError> {
        let mut canvas =
            RgbaImage::from_pixel(self.width, self.height, Rgba([255, 255, 255, 255]));

        if let Some(bytes) = base_png {
            match image::load_from_memory(bytes) {
                Ok(base) => {
                    image::imageops::overlay(&mut canvas, &base.to_rgba8(), 0, 0);
                }
                Err(e) => {
                    tracing::warn!("Failed to decode prior snapshot, rendering from blank: {}", e);
                }
            }
        }

        for stroke in strokes {
            self.draw_stroke(&mut canvas, stroke);
        }

        let mut buffer = Cursor::new(Vec::new());
        canvas
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        Ok(buffer.into_inner())
    }
}

/// Parse `#rgb` or `#rrggbb` into channel bytes.
fn parse_hex_color(color: &str) -> Option<[u8; 3]> {
    let digits = color.strip_prefix('#')?;
    match digits.len() {
        3 => {
            let mut channels = [0u8; 3];
            for (i, c) in digits.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                channels[i] = v * 16 + v;
            }
            Some(channels)
        }
        6 => {
            let r = u8::from_str_radix(&digits[0..2], 16).ok()?;
            let g = u8::from_str_radix(&digits[2..4], 16).ok()?;
            let b = u8::from_str_radix(&digits[4..6], 16).ok()?;
            Some([r, g, b])
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Point;

    fn stroke(points: Vec<(f64, f64)>, color: &str, size: f64, opacity: f64) -> StrokeRecord {
        StrokeRecord {
            id: 1,
            user_id: "alice".to_string(),
            room_id: "r".to_string(),
            points: points
                .into_iter()
                .map(|(x, y)| Point {
                    x,
                    y,
                    timestamp: None,
                })
                .collect(),
            color: color.to_string(),
            size,
            opacity,
            created_at: 0,
        }
    }

    fn decode(png: &[u8]) -> RgbaImage {
        image::load_from_memory(png).unwrap().to_rgba8()
    }

    #[test]
    fn test_parse_hex_color_variants() {
        assert_eq!(parse_hex_color("#ff8800"), Some([0xff, 0x88, 0x00]));
        assert_eq!(parse_hex_color("#f80"), Some([0xff, 0x88, 0x00]));
        assert_eq!(parse_hex_color("ff8800"), None);
        assert_eq!(parse_hex_color("#ff88"), None);
        assert_eq!(parse_hex_color("#gg0000"), None);
    }

    #[test]
    fn test_blank_render_is_white_canvas() {
        // given / when:
        let png = PixelRenderer::new().render(None, &[]).unwrap();

        // then:
        let img = decode(&png);
        assert_eq!(img.dimensions(), (drawing::CANVAS_WIDTH, drawing::CANVAS_HEIGHT));
        assert_eq!(*img.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*img.get_pixel(800, 450), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_opaque_stroke_paints_its_color() {
        // given: a short horizontal black stroke
        let renderer = PixelRenderer::new();
        let strokes = [stroke(vec![(100.0, 100.0), (120.0, 100.0)], "#000000", 6.0, 1.0)];

        // when:
        let img = decode(&renderer.render(None, &strokes).unwrap());

        // then: a pixel on the stroke path is black, one far away is white
        assert_eq!(*img.get_pixel(110, 100), Rgba([0, 0, 0, 255]));
        assert_eq!(*img.get_pixel(500, 500), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_single_point_stroke_stamps_a_disc() {
        let renderer = PixelRenderer::new();
        let strokes = [stroke(vec![(200.0, 200.0)], "#ff0000", 10.0, 1.0)];

        let img = decode(&renderer.render(None, &strokes).unwrap());

        assert_eq!(*img.get_pixel(200, 200), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_half_opacity_blends_with_background() {
        // given: a 50% black stroke over white
        let renderer = PixelRenderer::new();
        let strokes = [stroke(vec![(300.0, 300.0)], "#000000", 8.0, 0.5)];

        // when:
        let img = decode(&renderer.render(None, &strokes).unwrap());

        // then: mid gray, applied once despite overlapping stamps
        let Rgba([r, g, b, _]) = *img.get_pixel(300, 300);
        assert_eq!((r, g, b), (128, 128, 128));
    }

    #[test]
    fn test_prior_raster_is_used_as_base_layer() {
        // given: a first render with a red stroke
        let renderer = PixelRenderer::new();
        let first = renderer
            .render(None, &[stroke(vec![(50.0, 50.0)], "#ff0000", 10.0, 1.0)])
            .unwrap();

        // when: a second render layers a blue stroke on top of it
        let second = renderer
            .render(
                Some(&first),
                &[stroke(vec![(400.0, 400.0)], "#0000ff", 10.0, 1.0)],
            )
            .unwrap();

        // then: both strokes are visible
        let img = decode(&second);
        assert_eq!(*img.get_pixel(50, 50), Rgba([255, 0, 0, 255]));
        assert_eq!(*img.get_pixel(400, 400), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_undecodable_base_is_ignored() {
        // given: garbage bytes as the prior raster
        let renderer = PixelRenderer::new();

        // when:
        let png = renderer.render(Some(b"not a png"), &[]).unwrap();

        // then: rendering continued from blank
        let img = decode(&png);
        assert_eq!(*img.get_pixel(10, 10), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_unparseable_stroke_color_is_skipped() {
        let renderer = PixelRenderer::new();
        let strokes = [stroke(vec![(100.0, 100.0)], "#not", 10.0, 1.0)];

        let img = decode(&renderer.render(None, &strokes).unwrap());

        assert_eq!(*img.get_pixel(100, 100), Rgba([255, 255, 255, 255]));
    }
}
