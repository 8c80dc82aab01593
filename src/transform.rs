use image::{imageops, Rgba, RgbaImage};
use log::debug;
use nalgebra::Matrix3;

use crate::detection::Quadrilateral;
use crate::error::CandidateError;
use crate::geometry::{order_corners, perspective_transform, target_size, transform_point};

/// A deskewed, cropped, landscape card cut out of the source photo
#[derive(Debug, Clone)]
pub struct ExtractedCard {
    pub image: RgbaImage,
}

impl ExtractedCard {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Cubic interpolation kernel (Catmull-Rom)
fn cubic_weight(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;

    [
        -0.5 * t3 + t2 - 0.5 * t,
        1.5 * t3 - 2.5 * t2 + 1.0,
        -1.5 * t3 + 2.0 * t2 + 0.5 * t,
        0.5 * t3 - 0.5 * t2,
    ]
}

/// Bicubic sample at a fractional position.
///
/// Taps outside the image repeat the nearest edge pixel, so positions past
/// the border read as a stretched copy of the edge rather than a fill colour.
fn sample_bicubic(img: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let (width, height) = img.dimensions();
    let x = if x.is_finite() { x } else { 0.0 };
    let y = if y.is_finite() { y } else { 0.0 };

    let x_floor = x.floor() as i64;
    let y_floor = y.floor() as i64;
    let wx = cubic_weight(x - x.floor());
    let wy = cubic_weight(y - y.floor());

    let mut acc = [0.0f64; 4];

    for (j, weight_y) in wy.iter().enumerate() {
        let py = (y_floor + j as i64 - 1).clamp(0, height as i64 - 1) as u32;
        for (i, weight_x) in wx.iter().enumerate() {
            let px = (x_floor + i as i64 - 1).clamp(0, width as i64 - 1) as u32;
            let pixel = img.get_pixel(px, py);
            let weight = weight_x * weight_y;
            for (c, value) in acc.iter_mut().enumerate() {
                *value += pixel[c] as f64 * weight;
            }
        }
    }

    Rgba(acc.map(|v| v.round().clamp(0.0, 255.0) as u8))
}

/// Resample `src` into a `width` x `height` canvas.
///
/// `inverse` maps output pixel coordinates back into the source image.
pub fn warp_perspective(
    src: &RgbaImage,
    inverse: &Matrix3<f64>,
    width: u32,
    height: u32,
) -> RgbaImage {
    let mut output = RgbaImage::new(width, height);
    if src.width() == 0 || src.height() == 0 {
        return output;
    }

    for out_y in 0..height {
        for out_x in 0..width {
            let (src_x, src_y) = transform_point(inverse, out_x as f64, out_y as f64);
            output.put_pixel(out_x, out_y, sample_bicubic(src, src_x, src_y));
        }
    }

    output
}

/// Cut `border` pixels off every side, shrinking the cut where needed so at
/// least one row and column survive. Returns `None` for an empty image.
pub fn trim_border(img: &RgbaImage, border: u32) -> Option<RgbaImage> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let trim_x = border.min((width - 1) / 2);
    let trim_y = border.min((height - 1) / 2);

    Some(
        imageops::crop_imm(img, trim_x, trim_y, width - 2 * trim_x, height - 2 * trim_y)
            .to_image(),
    )
}

/// Rotate portrait images a quarter turn clockwise so every card is landscape
pub fn normalize_orientation(img: RgbaImage) -> RgbaImage {
    if img.height() > img.width() {
        imageops::rotate90(&img)
    } else {
        img
    }
}

/// Deskew one candidate out of the source image.
///
/// Fails only for this candidate; callers drop it and move on.
pub fn extract_card(
    src: &RgbaImage,
    quad: &Quadrilateral,
    border: u32,
) -> Result<ExtractedCard, CandidateError> {
    let corners = order_corners(&quad.points);
    let (width, height) = target_size(&corners);

    let (w, h) = (width as f64, height as f64);
    let destination = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];

    let forward = perspective_transform(&corners.to_f64(), &destination)
        .ok_or(CandidateError::SingularTransform)?;
    let inverse = forward
        .try_inverse()
        .ok_or(CandidateError::SingularTransform)?;

    debug!(
        "Warping {:?} into {}x{}",
        corners.to_f64(),
        width,
        height
    );

    let warped = warp_perspective(src, &inverse, width, height);
    let trimmed = trim_border(&warped, border).ok_or(CandidateError::EmptyResult)?;
    drop(warped);

    Ok(ExtractedCard {
        image: normalize_orientation(trimmed),
    })
}
