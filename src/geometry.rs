use imageproc::point::Point;
use nalgebra::{Matrix3, SMatrix, SVector};

/// Corners of a quadrilateral classified by position rather than input order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderedCorners {
    pub top_left: Point<i32>,
    pub top_right: Point<i32>,
    pub bottom_right: Point<i32>,
    pub bottom_left: Point<i32>,
}

impl OrderedCorners {
    /// Corners as floating point pairs, clockwise from top-left
    pub fn to_f64(&self) -> [(f64, f64); 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
            .map(|p| (p.x as f64, p.y as f64))
    }
}

/// Classify four points into top-left/top-right/bottom-right/bottom-left.
///
/// Top-left has the smallest `x + y`, bottom-right the largest; top-right has
/// the smallest `y - x`, bottom-left the largest. When several points tie on a
/// key (a square sitting at exactly 45°) any of the tied points may be chosen
/// and two roles can end up on the same point.
pub fn order_corners(points: &[Point<i32>; 4]) -> OrderedCorners {
    let sum = |p: &&Point<i32>| p.x as i64 + p.y as i64;
    let diff = |p: &&Point<i32>| p.y as i64 - p.x as i64;

    // The iterator is never empty, so the fallbacks are unreachable
    let top_left = *points.iter().min_by_key(sum).unwrap_or(&points[0]);
    let bottom_right = *points.iter().max_by_key(sum).unwrap_or(&points[2]);
    let top_right = *points.iter().min_by_key(diff).unwrap_or(&points[1]);
    let bottom_left = *points.iter().max_by_key(diff).unwrap_or(&points[3]);

    OrderedCorners {
        top_left,
        top_right,
        bottom_right,
        bottom_left,
    }
}

/// Euclidean distance between two points
pub fn edge_length(p: Point<i32>, q: Point<i32>) -> f64 {
    let dx = (q.x - p.x) as f64;
    let dy = (q.y - p.y) as f64;
    dx.hypot(dy)
}

/// Output canvas size for a card: the longer of each pair of opposite edges,
/// rounded and never smaller than 1x1.
pub fn target_size(corners: &OrderedCorners) -> (u32, u32) {
    let width = edge_length(corners.top_left, corners.top_right)
        .max(edge_length(corners.bottom_left, corners.bottom_right));
    let height = edge_length(corners.top_left, corners.bottom_left)
        .max(edge_length(corners.top_right, corners.bottom_right));

    (round_dimension(width), round_dimension(height))
}

fn round_dimension(length: f64) -> u32 {
    if !length.is_finite() {
        return 1;
    }
    (length.round() as u32).max(1)
}

/// Area of a closed polygon (shoelace formula), always non-negative
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();

    (twice_area as f64 / 2.0).abs()
}

/// True when any three of the points are collinear (or coincide)
fn has_collinear_triple(points: &[(f64, f64); 4]) -> bool {
    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];

    TRIPLES.iter().any(|&(i, j, k)| {
        let (a, b, c) = (points[i], points[j], points[k]);
        let cross = (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0);
        cross.abs() < 1e-9
    })
}

/// Solve the projective transform mapping each `src[i]` onto `dst[i]`.
///
/// Returns `None` when the correspondences do not determine an invertible
/// transform (three or more collinear corners, repeated corners).
pub fn perspective_transform(
    src: &[(f64, f64); 4],
    dst: &[(f64, f64); 4],
) -> Option<Matrix3<f64>> {
    if has_collinear_triple(src) || has_collinear_triple(dst) {
        return None;
    }

    // h22 is fixed to 1, leaving eight unknowns:
    //   u = (h00 x + h01 y + h02) / (h20 x + h21 y + 1)
    //   v = (h10 x + h11 y + h12) / (h20 x + h21 y + 1)
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for (i, (&(x, y), &(u, v))) in src.iter().zip(dst.iter()).enumerate() {
        let r = 2 * i;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }

    let h = a.lu().solve(&b)?;

    #[rustfmt::skip]
    let matrix = Matrix3::new(
        h[0], h[1], h[2],
        h[3], h[4], h[5],
        h[6], h[7], 1.0,
    );

    if !matrix.iter().all(|v| v.is_finite()) || matrix.determinant().abs() < 1e-12 {
        return None;
    }

    Some(matrix)
}

/// Map a point through a homogeneous 3x3 matrix
pub fn transform_point(matrix: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let p = nalgebra::Vector3::new(x, y, 1.0);
    let result = matrix * p;
    (result.x / result.z, result.y / result.z)
}
