use eyre::Result;
use image::{Rgb, RgbImage};
use rusttype::{Font, Scale, point};

/// Em size, in pixels, of text drawn at scale 1.0.
pub const BASE_EM_PX: f32 = 30.0;

/// A TrueType font ready for drawing labels.
#[derive(Clone)]
pub struct LabelFont {
    font: Font<'static>,
}

impl LabelFont {
    /// The embedded Fira Code regular face.
    pub fn fira_code() -> Result<Self> {
        Self::from_bytes(ttf_firacode::REGULAR)
    }

    /// Load from TrueType data. This only succeeds if the data holds exactly
    /// one font.
    pub fn from_bytes(data: &'static [u8]) -> Result<Self> {
        let font = Font::try_from_bytes(data)
            .ok_or_else(|| eyre::eyre!("font data is not a single TrueType font"))?;
        Ok(Self { font })
    }
}

impl std::fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelFont").finish_non_exhaustive()
    }
}

/// How text is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    /// Multiple of [BASE_EM_PX].
    pub scale: f32,
    /// Stroke weight in pixels. The glyphs are smeared over a square of this
    /// size, so 1 draws them as-is.
    pub thickness: u32,
    pub color: Rgb<u8>,
}

/// Blend `color` into the pixel at `(x, y)` with opacity `alpha` in `0..=1`.
///
/// Pixels outside the image are ignored.
fn put_pixel(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>, alpha: f32) {
    if x < 0 || y < 0 || x >= image.width() as i64 || y >= image.height() as i64 {
        return;
    }
    let p = 1.0 - alpha;
    let q = alpha;

    let old = image.get_pixel_mut(x as u32, y as u32);
    for (dst, src) in old.0.iter_mut().zip(color.0.iter()) {
        *dst = (*dst as f32 * p + *src as f32 * q).round().clamp(0.0, 255.0) as u8;
    }
}

/// Draw `text` with the left end of its baseline at `origin`.
///
/// Parts of the text outside the image are clipped.
pub fn draw_text(
    image: &mut RgbImage,
    font: &LabelFont,
    text: &str,
    origin: (i32, i32),
    style: &TextStyle,
) {
    let scale = Scale::uniform(style.scale * BASE_EM_PX);
    let glyphs: Vec<_> = font
        .font
        .layout(text, scale, point(origin.0 as f32, origin.1 as f32))
        .collect();

    let boxes: Vec<_> = glyphs.iter().filter_map(|g| g.pixel_bounding_box()).collect();
    let (Some(x0), Some(y0), Some(x1), Some(y1)) = (
        boxes.iter().map(|b| b.min.x).min(),
        boxes.iter().map(|b| b.min.y).min(),
        boxes.iter().map(|b| b.max.x).max(),
        boxes.iter().map(|b| b.max.y).max(),
    ) else {
        // nothing visible (empty or whitespace-only text)
        return;
    };

    let thick = style.thickness.max(1) as usize;
    let width = (x1 - x0) as usize + thick - 1;
    let height = (y1 - y0) as usize + thick - 1;

    // Coverage of the smeared text. Taking the maximum keeps overlapping
    // strokes from getting darker than a single stroke.
    let mut coverage = vec![0.0f32; width * height];
    for glyph in glyphs.iter() {
        if let Some(bb) = glyph.pixel_bounding_box() {
            let gx = (bb.min.x - x0) as usize;
            let gy = (bb.min.y - y0) as usize;
            glyph.draw(|x, y, v| {
                for dy in 0..thick {
                    for dx in 0..thick {
                        let cx = gx + x as usize + dx;
                        let cy = gy + y as usize + dy;
                        let c = &mut coverage[cy * width + cx];
                        *c = c.max(v);
                    }
                }
            });
        }
    }

    for (idx, v) in coverage.iter().enumerate() {
        if *v > 0.0 {
            let x = x0 as i64 + (idx % width) as i64;
            let y = y0 as i64 + (idx / width) as i64;
            put_pixel(image, x, y, style.color, v.min(1.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    fn style(thickness: u32) -> TextStyle {
        TextStyle {
            scale: 0.7,
            thickness,
            color: WHITE,
        }
    }

    fn changed(a: &RgbImage, b: &RgbImage) -> usize {
        a.pixels().zip(b.pixels()).filter(|(p, q)| p != q).count()
    }

    #[test]
    fn draws_something() {
        let font = LabelFont::fira_code().unwrap();
        let orig = RgbImage::new(200, 60);
        let mut im = orig.clone();
        draw_text(&mut im, &font, "Zone A", (10, 40), &style(2));
        assert!(changed(&orig, &im) > 20);
        // Text sits above the baseline.
        assert!(im.enumerate_pixels().all(|(_, y, p)| y <= 45 || p.0 == [0, 0, 0]));
        assert!(im.pixels().any(|p| p.0[0] > 200));
    }

    #[test]
    fn empty_text_is_noop() {
        let font = LabelFont::fira_code().unwrap();
        let orig = RgbImage::from_pixel(50, 50, Rgb([10, 20, 30]));
        let mut im = orig.clone();
        draw_text(&mut im, &font, "", (10, 40), &style(2));
        draw_text(&mut im, &font, "   ", (10, 40), &style(2));
        assert_eq!(orig, im);
    }

    #[test]
    fn clipped_at_edges() {
        let font = LabelFont::fira_code().unwrap();
        let mut im = RgbImage::new(40, 40);
        draw_text(&mut im, &font, "outside", (-500, -500), &style(2));
        draw_text(&mut im, &font, "edge", (30, 5), &style(2));
        draw_text(&mut im, &font, "edge", (-10, 45), &style(2));
        assert!(im.pixels().any(|p| p.0 != [0, 0, 0]));
    }

    #[test]
    fn thicker_covers_more() {
        let font = LabelFont::fira_code().unwrap();
        let orig = RgbImage::new(200, 60);
        let mut thin = orig.clone();
        let mut thick = orig.clone();
        draw_text(&mut thin, &font, "Zone", (10, 40), &style(1));
        draw_text(&mut thick, &font, "Zone", (10, 40), &style(3));
        assert!(changed(&orig, &thick) > changed(&orig, &thin));
    }
}
