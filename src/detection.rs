use image::{DynamicImage, GrayImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::morphology::close;
use imageproc::point::Point;
use log::debug;

use crate::error::ExtractError;
use crate::geometry::polygon_area;
use crate::pipeline::PipelineConfig;

/// A simplified outer contour together with its enclosed area
#[derive(Debug, Clone)]
pub struct Polygon {
    pub points: Vec<Point<i32>>,
    pub area: f64,
}

/// A four-sided polygon large enough to plausibly bound a card
#[derive(Debug, Clone, PartialEq)]
pub struct Quadrilateral {
    pub points: [Point<i32>; 4],
    pub area: f64,
}

/// Turn the source photo into a closed binary edge map.
///
/// Grayscale, Gaussian blur, Canny, then a morphological close with a square
/// element so small breaks in card outlines are bridged.
pub fn edge_map(img: &DynamicImage, config: &PipelineConfig) -> GrayImage {
    let gray = img.to_luma8();
    let blurred = gaussian_blur_f32(&gray, config.blur_sigma);
    drop(gray);

    let edges = canny(&blurred, config.canny_low, config.canny_high);
    drop(blurred);

    close(&edges, Norm::LInf, config.close_radius)
}

/// Simplify a closed contour with Douglas-Peucker.
///
/// The ring is split at the point farthest from an extreme point so that
/// both halves are open chains with distinct endpoints.
pub fn approximate_closed_polygon(contour: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    if contour.len() < 3 || epsilon.is_nan() || epsilon <= 0.0 {
        return contour.to_vec();
    }

    // The point with the smallest x + y is a vertex of the convex hull
    let start = contour
        .iter()
        .enumerate()
        .min_by_key(|(_, p)| (p.x + p.y, p.x))
        .map(|(i, _)| i)
        .unwrap_or(0);

    let ring: Vec<Point<i32>> = contour[start..]
        .iter()
        .chain(contour[..start].iter())
        .copied()
        .collect();
    let first = ring[0];

    let far = ring
        .iter()
        .enumerate()
        .max_by_key(|(_, p)| {
            let dx = (p.x - first.x) as i64;
            let dy = (p.y - first.y) as i64;
            dx * dx + dy * dy
        })
        .map(|(i, _)| i)
        .unwrap_or(0);

    if far == 0 {
        return vec![first];
    }

    let mut back_chain = ring[far..].to_vec();
    back_chain.push(first);

    let mut polygon = approximate_polygon_dp(&ring[..=far], epsilon, false);
    let back = approximate_polygon_dp(&back_chain, epsilon, false);

    // Both halves share the far point, and the back half ends where we started
    polygon.pop();
    polygon.extend_from_slice(&back[..back.len().saturating_sub(1)]);
    polygon.dedup();
    polygon
}

/// Trace outer contours of the edge map and simplify each to a polygon.
///
/// Only outermost borders are kept; anything nested inside a card outline
/// (printed text, logos) is ignored.
pub fn find_polygons(edges: &GrayImage, epsilon_fraction: f64) -> Vec<Polygon> {
    let contours = find_contours::<i32>(edges);
    let total = contours.len();

    let polygons: Vec<Polygon> = contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            let epsilon = epsilon_fraction * arc_length(&c.points, true);
            let points = approximate_closed_polygon(&c.points, epsilon);
            let area = polygon_area(&points);
            Polygon { points, area }
        })
        .collect();

    debug!(
        "Traced {} contours, {} outer polygons",
        total,
        polygons.len()
    );

    polygons
}

/// Keep four-vertex polygons covering more than `min_area_fraction` of the
/// image, largest first.
///
/// Overlapping or nested quadrilaterals are all kept; each is extracted on
/// its own.
pub fn filter_candidates(
    polygons: Vec<Polygon>,
    image_area: f64,
    min_area_fraction: f64,
) -> Vec<Quadrilateral> {
    let min_area = image_area * min_area_fraction;

    let mut candidates: Vec<Quadrilateral> = polygons
        .into_iter()
        .filter(|p| p.area > min_area)
        .filter_map(|p| {
            let points: [Point<i32>; 4] = p.points.try_into().ok()?;
            Some(Quadrilateral {
                points,
                area: p.area,
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.area.total_cmp(&a.area));
    candidates
}

/// Run the whole-image detection phase: edge map, polygons, candidate filter
pub fn detect_candidates(
    img: &DynamicImage,
    config: &PipelineConfig,
) -> Result<Vec<Quadrilateral>, ExtractError> {
    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return Err(ExtractError::EmptyImage { width, height });
    }

    let edges = edge_map(img, config);
    let polygons = find_polygons(&edges, config.approx_epsilon_fraction);
    drop(edges);

    let image_area = width as f64 * height as f64;
    let candidates = filter_candidates(polygons, image_area, config.min_area_fraction);

    for (i, quad) in candidates.iter().enumerate() {
        debug!(
            "Candidate {}: area {:.0} ({:.1}% of image), corners {:?}",
            i + 1,
            quad.area,
            100.0 * quad.area / image_area,
            quad.points
        );
    }

    Ok(candidates)
}
