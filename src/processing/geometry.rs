use nalgebra::Vector2;
use std::collections::HashSet;

/// Sub-pixel position in full-resolution image space, `(x, y)`.
pub type Point = Vector2<f64>;

/// Integer pixel coordinate `(x, y)`; `x` indexes columns, `y` rows.
pub type Pixel = (i64, i64);

pub fn to_pixel(p: &Point) -> Pixel {
    (p.x.round() as i64, p.y.round() as i64)
}

/// Offset from one edge of the square spanned by `p1 -> p2` to the opposite
/// edge. Always points to the same side regardless of endpoint order.
fn side_offset(p1: Pixel, p2: Pixel) -> Pixel {
    let d1 = p1.0 - p2.0;
    let d2 = p1.1 - p2.1;
    if d2 > 0 {
        (d2, -d1)
    } else {
        (-d2, d1)
    }
}

/// Cross product of the edge `a -> b` with the vector `a -> p`.
#[inline]
fn edge_determinant(a: Pixel, b: Pixel, p: Pixel) -> i64 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

/// Corners must be given in traversal order. A pixel is inside when it lies
/// between both pairs of opposite edges; a zero determinant (on the line)
/// counts as inside.
fn is_pixel_in_square(corners: &[Pixel; 4], p: Pixel) -> bool {
    let d1 = edge_determinant(corners[0], corners[1], p);
    let d2 = edge_determinant(corners[1], corners[2], p);
    let d3 = edge_determinant(corners[2], corners[3], p);
    let d4 = edge_determinant(corners[3], corners[0], p);
    d1.signum() != (-d3).signum() && d2.signum() != (-d4).signum()
}

/// Pixels of the square whose first side is `p1 -> p2`.
///
/// Scans the half-open bounding box of the corners. A zero-length side
/// produces an empty box and therefore an empty set.
pub fn pixels_in_square(p1: Pixel, p2: Pixel) -> HashSet<Pixel> {
    let (s1, s2) = side_offset(p1, p2);
    let corners = [p1, p2, (p2.0 + s1, p2.1 + s2), (p1.0 + s1, p1.1 + s2)];

    let min_x = corners.iter().map(|c| c.0).min().unwrap_or(0);
    let max_x = corners.iter().map(|c| c.0).max().unwrap_or(0);
    let min_y = corners.iter().map(|c| c.1).min().unwrap_or(0);
    let max_y = corners.iter().map(|c| c.1).max().unwrap_or(0);

    let mut inside = HashSet::new();
    for x in min_x..max_x {
        for y in min_y..max_y {
            if is_pixel_in_square(&corners, (x, y)) {
                inside.insert((x, y));
            }
        }
    }
    inside
}

/// Pixels of the 4:1 rectangle centred on the segment `p1 -> p2`, built as
/// the union of four unit squares shifted by -2, -1, 0 and 1 side lengths.
pub fn pixels_in_rectangle(p1: &Point, p2: &Point) -> HashSet<Pixel> {
    let a = to_pixel(p1);
    let b = to_pixel(p2);
    let (s1, s2) = side_offset(a, b);

    let mut rectangle = HashSet::new();
    for i in -2..2 {
        rectangle.extend(pixels_in_square(
            (a.0 + i * s1, a.1 + i * s2),
            (b.0 + i * s1, b.1 + i * s2),
        ));
    }
    rectangle
}

/// Length of the projection of `v` onto `direction`. `direction` must be
/// non-zero.
#[inline]
pub fn projected_distance(v: &Vector2<f64>, direction: &Vector2<f64>) -> f64 {
    v.dot(direction) / direction.norm()
}

/// `p2 - p1` rotated by -90°. For an edge of a contour in ascending
/// polar-angle order this points away from the centroid; bilayer offsets are
/// measured along it, so negative offsets lie inside the vesicle.
#[inline]
pub fn edge_normal(p1: &Point, p2: &Point) -> Vector2<f64> {
    Vector2::new(p2.y - p1.y, -(p2.x - p1.x))
}

/// Shoelace area of a closed polygon. Positive for points in ascending
/// polar-angle order.
pub fn signed_area(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..n {
        let p1 = &points[i];
        let p2 = &points[(i + 1) % n];
        area += p1.x * p2.y - p2.x * p1.y;
    }
    0.5 * area
}
