//! Draw regions of interest (labelled polygons) onto camera previews.
//!
//! Each region is filled on a translucent layer, outlined and labelled on an
//! opaque layer, and the two layers are blended with [RenderStyle::alpha].
//!
//! ```rust,no_run
//! use region_overlay::{Region, RegionRenderer, RenderStyle};
//!
//! # fn example(preview: image::RgbImage, regions: Vec<Region>) -> region_overlay::Result<()> {
//! let renderer = RegionRenderer::new(RenderStyle::default())?;
//! let annotated = renderer.draw_regions(&preview, &regions);
//! # Ok(())
//! # }
//! ```

// Copyright 2016-2025 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0
// <http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use image::{Rgb, RgbImage};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, warn};

use font_drawing::{LabelFont, TextStyle};

mod color;
mod draw;

pub use color::{BRIGHTEN_OFFSET, Bgr8, hex_to_bgr};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid color `{0}` (expected six hex digits)")]
    InvalidColor(String),
    #[error("region has no points")]
    EmptyPolygon,
    #[error("invalid render style: {0}")]
    InvalidStyle(String),
    #[error("font error: {0}")]
    Font(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A polygon vertex in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    #[serde(deserialize_with = "coordinate")]
    pub x: i32,
    #[serde(deserialize_with = "coordinate")]
    pub y: i32,
}

/// Accept integer or fractional numbers, truncating toward zero.
fn coordinate<'de, D>(deserializer: D) -> std::result::Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let v = f64::deserialize(deserializer)?;
    if !v.is_finite() || v < i32::MIN as f64 || v > i32::MAX as f64 {
        return Err(serde::de::Error::custom(format!(
            "coordinate {v} out of range"
        )));
    }
    Ok(v.trunc() as i32)
}

/// A labelled polygon as delivered by the camera server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub points: Vec<Point>,
    /// `#RRGGBB`
    pub display_color: String,
    /// Label text. A region without one is still filled and outlined.
    #[serde(default)]
    pub tag_name: String,
}

/// Parameters of the drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderStyle {
    /// Weight of the filled-polygon layer in the final blend.
    pub alpha: f64,
    /// Outline stroke width in pixels.
    pub contour_thickness: u32,
    /// Label size as a multiple of [font_drawing::BASE_EM_PX].
    pub font_scale: f32,
    /// Label stroke weight in pixels.
    pub font_thickness: u32,
    /// Distance in pixels of the label baseline above the first vertex.
    pub label_offset: i32,
    pub label_color: [u8; 3],
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            alpha: 0.4,
            contour_thickness: 3,
            font_scale: 0.7,
            font_thickness: 2,
            label_offset: 10,
            label_color: [255, 255, 255],
        }
    }
}

/// Draws regions with a fixed style. Holds the loaded label font.
#[derive(Debug, Clone)]
pub struct RegionRenderer {
    style: RenderStyle,
    font: LabelFont,
}

impl RegionRenderer {
    pub fn new(style: RenderStyle) -> Result<Self> {
        if !(0.0..=1.0).contains(&style.alpha) {
            return Err(Error::InvalidStyle(format!(
                "alpha must be within 0..=1, not {}",
                style.alpha
            )));
        }
        if !(style.font_scale.is_finite() && style.font_scale > 0.0) {
            return Err(Error::InvalidStyle(format!(
                "font_scale must be positive, not {}",
                style.font_scale
            )));
        }
        let font = LabelFont::fira_code().map_err(|e| Error::Font(format!("{e:#}")))?;
        Ok(Self { style, font })
    }

    pub fn style(&self) -> &RenderStyle {
        &self.style
    }

    /// Return a copy of `image` with `regions` drawn onto it.
    ///
    /// A region which cannot be drawn is logged and skipped; the others are
    /// still drawn. With no regions at all the result equals `image`.
    pub fn draw_regions(&self, image: &RgbImage, regions: &[Region]) -> RgbImage {
        if regions.is_empty() {
            warn!("No regions to draw.");
            return image.clone();
        }

        let mut overlay = image.clone();
        let mut output = image.clone();

        for (idx, region) in regions.iter().enumerate() {
            if let Err(e) = self.draw_region(&mut overlay, &mut output, region) {
                error!(
                    "Skipping region {idx} (\"{}\"): {e}",
                    region.tag_name
                );
            }
        }

        draw::add_weighted(&overlay, self.style.alpha, &output)
    }

    fn draw_region(
        &self,
        overlay: &mut RgbImage,
        output: &mut RgbImage,
        region: &Region,
    ) -> Result<()> {
        // Validate everything before touching any pixel.
        let pts: Vec<(i32, i32)> = region.points.iter().map(|p| (p.x, p.y)).collect();
        let first = *pts.first().ok_or(Error::EmptyPolygon)?;
        let color: Rgb<u8> = hex_to_bgr(&region.display_color)?.into();

        draw::fill_polygon(overlay, &pts, color);
        draw::draw_closed_polyline(output, &pts, self.style.contour_thickness, color);

        let text_style = TextStyle {
            scale: self.style.font_scale,
            thickness: self.style.font_thickness,
            color: Rgb(self.style.label_color),
        };
        let origin = (first.0, first.1.saturating_sub(self.style.label_offset));
        font_drawing::draw_text(output, &self.font, &region.tag_name, origin, &text_style);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Rgb<u8> = Rgb([100, 100, 100]);

    fn square(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<Point> {
        [(x0, y0), (x1, y0), (x1, y1), (x0, y1)]
            .into_iter()
            .map(|(x, y)| Point { x, y })
            .collect()
    }

    fn region(points: Vec<Point>, color: &str, tag: &str) -> Region {
        Region {
            points,
            display_color: color.into(),
            tag_name: tag.into(),
        }
    }

    fn renderer() -> RegionRenderer {
        RegionRenderer::new(RenderStyle::default()).unwrap()
    }

    fn blend(fill: u8, base: u8) -> u8 {
        (0.4 * fill as f64 + 0.6 * base as f64).round() as u8
    }

    /// Some pixel in the given window is much brighter than the base.
    fn has_label(im: &RgbImage, x: std::ops::Range<u32>, y: std::ops::Range<u32>) -> bool {
        y.clone()
            .any(|yy| x.clone().any(|xx| im.get_pixel(xx, yy).0.iter().all(|c| *c > 150)))
    }

    #[test]
    fn no_regions_is_identity() {
        let im = RgbImage::from_fn(64, 48, |x, y| Rgb([x as u8, y as u8, 7]));
        assert_eq!(renderer().draw_regions(&im, &[]), im);
    }

    #[test]
    fn idempotent() {
        let im = RgbImage::from_pixel(120, 100, BASE);
        let regions = vec![
            region(square(10, 30, 60, 90), "#336699", "Entry"),
            region(square(40, 20, 110, 70), "#ff8800", "Queue"),
        ];
        let r = renderer();
        let a = r.draw_regions(&im, &regions);
        let b = r.draw_regions(&im, &regions);
        assert_eq!(a, b);
        assert_ne!(a, im);
    }

    #[test]
    fn alpha_blend_inside_polygon() {
        let base = Rgb([100, 150, 200]);
        let im = RgbImage::from_pixel(100, 100, base);
        let regions = vec![region(square(20, 20, 80, 80), "#102030", "")];
        let out = renderer().draw_regions(&im, &regions);

        let fill = Rgb::from(hex_to_bgr("#102030").unwrap());
        let expected = Rgb([
            blend(fill.0[0], base.0[0]),
            blend(fill.0[1], base.0[1]),
            blend(fill.0[2], base.0[2]),
        ]);
        assert_eq!(expected, Rgb([82, 119, 155]));
        assert_eq!(*out.get_pixel(50, 50), expected);
        // outside stays untouched
        assert_eq!(*out.get_pixel(5, 5), base);
    }

    #[test]
    fn outline_is_full_color() {
        let im = RgbImage::from_pixel(100, 100, BASE);
        let regions = vec![region(square(20, 20, 80, 80), "#ff0000", "")];
        let out = renderer().draw_regions(&im, &regions);
        // On the outline both layers hold the region color.
        assert_eq!(*out.get_pixel(20, 50), Rgb([255, 40, 40]));
        assert_eq!(*out.get_pixel(21, 50), Rgb([255, 40, 40]));
        // Just outside the stroke the fill layer does not reach.
        assert_eq!(*out.get_pixel(17, 50), BASE);
    }

    #[test]
    fn bad_region_does_not_stop_others() {
        let im = RgbImage::from_pixel(200, 120, BASE);
        let regions = vec![
            region(square(20, 40, 80, 100), "#ff0000", "A"),
            region(square(90, 40, 110, 100), "#zzzzzz", "B"),
            region(square(120, 40, 180, 100), "#00ff00", "C"),
        ];
        let out = renderer().draw_regions(&im, &regions);

        assert_eq!(
            *out.get_pixel(50, 70),
            Rgb([blend(255, 100), blend(40, 100), blend(40, 100)])
        );
        assert_eq!(*out.get_pixel(20, 70), Rgb([255, 40, 40]));
        assert!(has_label(&out, 20..50, 10..33));

        assert_eq!(*out.get_pixel(100, 70), BASE);
        assert!(!has_label(&out, 90..118, 10..33));

        assert_eq!(
            *out.get_pixel(150, 70),
            Rgb([blend(40, 100), blend(255, 100), blend(40, 100)])
        );
        assert_eq!(*out.get_pixel(180, 70), Rgb([40, 255, 40]));
        assert!(has_label(&out, 120..150, 10..33));
    }

    #[test]
    fn empty_points_skipped() {
        let im = RgbImage::from_pixel(100, 100, BASE);
        let regions = vec![
            region(vec![], "#ff0000", "nothing"),
            region(square(20, 20, 80, 80), "#0000ff", ""),
        ];
        let out = renderer().draw_regions(&im, &regions);
        assert_eq!(
            *out.get_pixel(50, 50),
            Rgb([blend(40, 100), blend(40, 100), blend(255, 100)])
        );
        assert!(!has_label(&out, 0..100, 0..20));
    }

    #[test]
    fn regions_outside_image() {
        let im = RgbImage::from_pixel(30, 30, BASE);
        let regions = vec![
            region(square(-100, -100, -50, -50), "#ffffff", "gone"),
            region(square(25, 25, 500, 500), "#ffffff", "corner"),
        ];
        let out = renderer().draw_regions(&im, &regions);
        assert_eq!(*out.get_pixel(29, 29), Rgb([blend(255, 100); 3]));
        assert_eq!(*out.get_pixel(5, 5), BASE);
    }

    #[test]
    fn invalid_style() {
        let style = RenderStyle {
            alpha: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            RegionRenderer::new(style),
            Err(Error::InvalidStyle(_))
        ));
    }

    #[test]
    fn region_json() {
        let json = r##"[
            {"points": [{"x": 10, "y": 20}, {"x": 30.9, "y": -4.2}], "displayColor": "#aabbcc", "tagName": "door", "id": 7},
            {"points": [], "displayColor": "#000000", "tagName": ""}
        ]"##;
        let regions: Vec<Region> = serde_json::from_str(json).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].points[1], Point { x: 30, y: -4 });
        assert_eq!(regions[0].display_color, "#aabbcc");
        assert_eq!(regions[0].tag_name, "door");
        assert!(regions[1].points.is_empty());

        let bad = r##"{"points": [{"x": "a", "y": 1}], "displayColor": "#000000", "tagName": ""}"##;
        assert!(serde_json::from_str::<Region>(bad).is_err());
    }

    #[test]
    fn region_without_label_is_drawn() {
        let json = r##"{"points": [{"x": 20, "y": 20}, {"x": 80, "y": 20}, {"x": 80, "y": 80}, {"x": 20, "y": 80}], "displayColor": "#0000ff"}"##;
        let unlabelled: Region = serde_json::from_str(json).unwrap();
        assert_eq!(unlabelled.tag_name, "");

        let im = RgbImage::from_pixel(100, 100, BASE);
        let out = renderer().draw_regions(&im, &[unlabelled]);
        assert_eq!(
            *out.get_pixel(50, 50),
            Rgb([blend(40, 100), blend(40, 100), blend(255, 100)])
        );
        assert_eq!(*out.get_pixel(20, 50), Rgb([40, 40, 255]));
    }
}
