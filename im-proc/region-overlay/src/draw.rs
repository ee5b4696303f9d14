//! Rasterization primitives on `RgbImage`. All of them clip to the image.

use image::{Rgb, RgbImage};

fn put(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < image.width() as i64 && y < image.height() as i64 {
        image.put_pixel(x as u32, y as u32, color);
    }
}

/// Paint a round brush of diameter `thickness` centered on `(x, y)`.
fn stamp(image: &mut RgbImage, x: i64, y: i64, thickness: u32, color: Rgb<u8>) {
    let r = thickness.max(1) as f64 / 2.0;
    let reach = (thickness.max(1) / 2) as i64;
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            if ((dx * dx + dy * dy) as f64) <= r * r {
                put(image, x + dx, y + dy, color);
            }
        }
    }
}

/// Clip the segment `a`-`b` to the rectangle `[xmin, xmax] x [ymin, ymax]`
/// (Liang-Barsky). Returns `None` if nothing of it is inside.
fn clip_segment(
    a: (f64, f64),
    b: (f64, f64),
    (xmin, ymin, xmax, ymax): (f64, f64, f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [
        (-dx, a.0 - xmin),
        (dx, xmax - a.0),
        (-dy, a.1 - ymin),
        (dy, ymax - a.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let t = q / p;
            if p < 0.0 {
                t0 = t0.max(t);
            } else {
                t1 = t1.min(t);
            }
        }
    }
    if t0 > t1 {
        return None;
    }
    Some((
        (a.0 + t0 * dx, a.1 + t0 * dy),
        (a.0 + t1 * dx, a.1 + t1 * dy),
    ))
}

/// Draw a straight line of the given thickness between two points.
pub(crate) fn draw_line(
    image: &mut RgbImage,
    a: (i32, i32),
    b: (i32, i32),
    thickness: u32,
    color: Rgb<u8>,
) {
    // Only the part that can touch the image is walked, so far-away
    // coordinates cost nothing.
    let margin = thickness as f64 + 1.0;
    let bounds = (
        -margin,
        -margin,
        image.width() as f64 + margin,
        image.height() as f64 + margin,
    );
    let Some((ca, cb)) = clip_segment(
        (a.0 as f64, a.1 as f64),
        (b.0 as f64, b.1 as f64),
        bounds,
    ) else {
        return;
    };

    // Bresenham
    let (mut x0, mut y0) = (ca.0.round() as i64, ca.1.round() as i64);
    let (x1, y1) = (cb.0.round() as i64, cb.1.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        stamp(image, x0, y0, thickness, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Draw the outline of the closed polygon through `pts`.
pub(crate) fn draw_closed_polyline(
    image: &mut RgbImage,
    pts: &[(i32, i32)],
    thickness: u32,
    color: Rgb<u8>,
) {
    match pts {
        [] => {}
        [p] => draw_line(image, *p, *p, thickness, color),
        _ => {
            for (i, a) in pts.iter().enumerate() {
                let b = pts[(i + 1) % pts.len()];
                draw_line(image, *a, b, thickness, color);
            }
        }
    }
}

/// Fill the polygon through `pts`, boundary included.
///
/// Uses the even-odd rule on pixel centers.
pub(crate) fn fill_polygon(image: &mut RgbImage, pts: &[(i32, i32)], color: Rgb<u8>) {
    if pts.is_empty() || image.width() == 0 || image.height() == 0 {
        return;
    }
    let ymin = pts.iter().map(|p| p.1).min().unwrap_or(0).max(0) as i64;
    let ymax = (pts.iter().map(|p| p.1).max().unwrap_or(0) as i64).min(image.height() as i64 - 1);
    let xmax_img = image.width() as i64 - 1;

    let mut xs: Vec<f64> = Vec::with_capacity(pts.len());
    for y in ymin..=ymax {
        xs.clear();
        for (i, a) in pts.iter().enumerate() {
            let b = pts[(i + 1) % pts.len()];
            let (ay, by) = (a.1 as i64, b.1 as i64);
            if ay == by {
                continue;
            }
            // half-open so that a shared vertex is counted once
            if (ay <= y && y < by) || (by <= y && y < ay) {
                let t = (y - ay) as f64 / (by - ay) as f64;
                xs.push(a.0 as f64 + t * (b.0 as f64 - a.0 as f64));
            }
        }
        xs.sort_by(f64::total_cmp);
        for span in xs.chunks_exact(2) {
            let start = (span[0].ceil() as i64).max(0);
            let stop = (span[1].floor() as i64).min(xmax_img);
            for x in start..=stop {
                image.put_pixel(x as u32, y as u32, color);
            }
        }
    }

    // The scanline rule leaves out parts of the boundary (e.g. bottom edges
    // and degenerate polygons).
    draw_closed_polyline(image, pts, 1, color);
}

/// `overlay * alpha + base * (1 - alpha)` per channel, rounded and
/// saturated.
///
/// Both images must have the same dimensions.
pub(crate) fn add_weighted(overlay: &RgbImage, alpha: f64, base: &RgbImage) -> RgbImage {
    debug_assert_eq!(overlay.dimensions(), base.dimensions());
    let beta = 1.0 - alpha;
    let mut result = base.clone();
    for (dst, src) in result.iter_mut().zip(overlay.iter()) {
        *dst = (*src as f64 * alpha + *dst as f64 * beta)
            .round()
            .clamp(0.0, 255.0) as u8;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const C: Rgb<u8> = Rgb([200, 10, 10]);

    fn count(im: &RgbImage) -> usize {
        im.pixels().filter(|p| **p == C).count()
    }

    #[test]
    fn fill_rectangle_inclusive() {
        let mut im = RgbImage::new(20, 20);
        fill_polygon(&mut im, &[(2, 3), (8, 3), (8, 7), (2, 7)], C);
        assert_eq!(count(&im), 7 * 5);
        assert_eq!(*im.get_pixel(2, 3), C);
        assert_eq!(*im.get_pixel(8, 7), C);
        assert_eq!(*im.get_pixel(9, 7), Rgb([0, 0, 0]));
    }

    #[test]
    fn fill_triangle() {
        let mut im = RgbImage::new(20, 20);
        fill_polygon(&mut im, &[(0, 0), (10, 0), (0, 10)], C);
        assert_eq!(*im.get_pixel(2, 2), C);
        assert_eq!(*im.get_pixel(0, 10), C);
        assert_eq!(*im.get_pixel(9, 9), Rgb([0, 0, 0]));
    }

    #[test]
    fn fill_clips() {
        let mut im = RgbImage::new(10, 10);
        fill_polygon(&mut im, &[(-50, -50), (50, -50), (50, 50), (-50, 50)], C);
        assert_eq!(count(&im), 100);

        let mut im = RgbImage::new(10, 10);
        fill_polygon(&mut im, &[(100, 100), (120, 100), (120, 120)], C);
        assert_eq!(count(&im), 0);
    }

    #[test]
    fn huge_coordinates_are_cheap() {
        let mut im = RgbImage::new(10, 10);
        let far = i32::MAX / 2;
        draw_closed_polyline(&mut im, &[(-far, 5), (far, 5), (far, far)], 3, C);
        assert!(count(&im) >= 10 * 3);
    }

    #[test]
    fn line_thickness() {
        let mut thin = RgbImage::new(20, 20);
        draw_line(&mut thin, (2, 10), (17, 10), 1, C);
        assert_eq!(count(&thin), 16);

        let mut thick = RgbImage::new(20, 20);
        draw_line(&mut thick, (2, 10), (17, 10), 3, C);
        assert_eq!(count(&thick), 18 * 3);
    }

    #[test]
    fn weighted() {
        let a = RgbImage::from_pixel(2, 2, Rgb([255, 0, 100]));
        let b = RgbImage::from_pixel(2, 2, Rgb([0, 255, 100]));
        let r = add_weighted(&a, 0.4, &b);
        assert_eq!(*r.get_pixel(1, 1), Rgb([102, 153, 100]));
    }
}
