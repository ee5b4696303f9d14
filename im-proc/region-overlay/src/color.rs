use crate::{Error, Result};

/// Amount added to each channel so that region colors stand out against
/// the preview.
pub const BRIGHTEN_OFFSET: u8 = 40;

/// A color with its channels in blue, green, red order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bgr8 {
    pub b: u8,
    pub g: u8,
    pub r: u8,
}

impl From<Bgr8> for image::Rgb<u8> {
    fn from(c: Bgr8) -> Self {
        image::Rgb([c.r, c.g, c.b])
    }
}

/// Parse a `#RRGGBB` (or `RRGGBB`) color and brighten each channel by
/// [BRIGHTEN_OFFSET], saturating at 255.
pub fn hex_to_bgr(hex: &str) -> Result<Bgr8> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidColor(hex.to_string()));
    }
    let channel = |i: usize| -> Result<u8> {
        let v = u8::from_str_radix(&digits[i..i + 2], 16)
            .map_err(|_| Error::InvalidColor(hex.to_string()))?;
        Ok(v.saturating_add(BRIGHTEN_OFFSET))
    };
    Ok(Bgr8 {
        r: channel(0)?,
        g: channel(2)?,
        b: channel(4)?,
    })
}
