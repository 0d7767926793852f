use crate::processing::bilayer::BilayerCandidate;
use crate::processing::geometry::{edge_normal, Point};

/// Refined positions for one contour edge: inner leaflet, intermembrane
/// space and outer leaflet, in whole pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinedTriplet {
    pub inner: Point,
    pub mid: Point,
    pub outer: Point,
}

impl RefinedTriplet {
    pub fn layer(&self, layer: Layer) -> Point {
        match layer {
            Layer::Inner => self.inner,
            Layer::Intermembrane => self.mid,
            Layer::Outer => self.outer,
        }
    }

    pub fn points(&self) -> [Point; 3] {
        [self.inner, self.mid, self.outer]
    }
}

/// One of the three coordinate layers of a refined membrane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Inner,
    Intermembrane,
    Outer,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::Inner, Layer::Intermembrane, Layer::Outer];

    pub fn name(&self) -> &'static str {
        match self {
            Layer::Inner => "inner",
            Layer::Intermembrane => "intermembrane",
            Layer::Outer => "outer",
        }
    }
}

/// Refined triplets of one vesicle, in contour order. Logically closed.
pub type Edge = Vec<RefinedTriplet>;

/// Shifts the midpoint of `p1 -> p2` along the unit edge normal by each
/// bilayer offset (Å converted to pixels) and rounds to whole pixels.
pub fn correct_pick(
    p1: &Point,
    p2: &Point,
    candidate: &BilayerCandidate,
    psize: f64,
) -> RefinedTriplet {
    let midpoint = (p1 + p2) / 2.0;
    let normal = edge_normal(p1, p2).normalize();
    let shifted = |offset: i64| {
        let p = midpoint + normal * (offset as f64 / psize);
        Point::new(p.x.round(), p.y.round())
    };

    RefinedTriplet {
        inner: shifted(candidate.inner),
        mid: shifted(candidate.mid),
        outer: shifted(candidate.outer),
    }
}
