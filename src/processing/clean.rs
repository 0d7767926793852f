use crate::processing::correct::Edge;
use crate::processing::geometry::{projected_distance, Point};

/// Distance (Å) of `p` from the line through `a` and `b`, signed by side.
fn deviation_from_chord(a: &Point, p: &Point, b: &Point, psize: f64) -> f64 {
    let chord = b - a;
    let normal = nalgebra::Vector2::new(chord.y, -chord.x);
    psize * projected_distance(&(p - a), &normal)
}

/// Removes refined triplets whose inner-leaflet point lies more than
/// `cutoff` Å from the line joining its two circular neighbours.
///
/// Edges with fewer than three triplets cannot be judged and come back
/// empty. Survivors keep their relative order.
pub fn clean_edges(edges: &[Edge], cutoff: f64, psize: f64) -> Vec<Edge> {
    edges
        .iter()
        .map(|edge| {
            let n = edge.len();
            if n < 3 {
                return Vec::new();
            }
            (0..n)
                .filter(|&j| {
                    let prev = &edge[(j + n - 1) % n].inner;
                    let next = &edge[(j + 1) % n].inner;
                    let deviation = deviation_from_chord(prev, &edge[j].inner, next, psize);
                    // NaN (coincident neighbours) is kept.
                    !(deviation.abs() > cutoff)
                })
                .map(|j| edge[j])
                .collect()
        })
        .collect()
}

/// Result of iterated cleaning.
#[derive(Debug, Clone)]
pub struct CleanReport {
    pub edges: Vec<Edge>,
    pub passes: usize,
}

/// One pass with the tight `first_cutoff`, then passes with the looser
/// `second_cutoff` on the already cleaned edges until no edge changes
/// length. Edge lengths only shrink, so this terminates.
pub fn clean_to_fixpoint(
    edges: Vec<Edge>,
    first_cutoff: f64,
    second_cutoff: f64,
    psize: f64,
) -> CleanReport {
    let mut previous = edges;
    let mut cleaned = clean_edges(&previous, first_cutoff, psize);
    let mut passes = 1;

    while previous
        .iter()
        .zip(&cleaned)
        .any(|(before, after)| before.len() != after.len())
    {
        previous = cleaned;
        cleaned = clean_edges(&previous, second_cutoff, psize);
        passes += 1;
    }

    CleanReport {
        edges: cleaned,
        passes,
    }
}

#[cfg(test)]
mod clean_tests {
    use super::*;
    use crate::processing::correct::RefinedTriplet;
    use crate::utils::test_utils::{generate_circle_points, triplets_from_inner};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn straight_edge_with_outlier() -> Edge {
        let mut inner: Vec<Point> = (0..5).map(|i| Point::new(10.0 * i as f64, 0.0)).collect();
        inner[2].y = 100.0;
        triplets_from_inner(&inner)
    }

    #[test]
    fn test_drops_single_outlier() {
        let edge = straight_edge_with_outlier();
        let cleaned = clean_edges(&[edge.clone()], 20.0, 1.0);
        assert_eq!(cleaned[0].len(), 4);
        let kept: Vec<f64> = cleaned[0].iter().map(|t| t.inner.x).collect();
        assert_eq!(kept, vec![0.0, 10.0, 30.0, 40.0]);
        assert!(cleaned[0].iter().all(|t| t.inner.y == 0.0));
    }

    #[test]
    fn test_first_point_is_judged_too() {
        let mut inner: Vec<Point> = (0..6).map(|i| Point::new(10.0 * i as f64, 0.0)).collect();
        inner[0].y = -80.0;
        let cleaned = clean_edges(&[triplets_from_inner(&inner)], 20.0, 1.0);
        assert_eq!(cleaned[0].len(), 5);
        assert_eq!(cleaned[0][0].inner, Point::new(10.0, 0.0));
    }

    #[test]
    fn test_cutoff_is_physical() {
        let edge = straight_edge_with_outlier();
        // 100 px at 0.1 Å/px is 10 Å, below the cutoff.
        let cleaned = clean_edges(&[edge], 20.0, 0.1);
        assert_eq!(cleaned[0].len(), 5);
    }

    #[test]
    fn test_short_edges_become_empty() {
        let two = triplets_from_inner(&[Point::new(0.0, 0.0), Point::new(5.0, 5.0)]);
        let cleaned = clean_edges(&[two, Vec::new()], 20.0, 1.0);
        assert!(cleaned.iter().all(|e| e.is_empty()));
    }

    #[test]
    fn test_clean_is_idempotent_on_stable_output() {
        let edge = straight_edge_with_outlier();
        let once = clean_edges(&[edge], 20.0, 1.0);
        let twice = clean_edges(&once, 20.0, 1.0);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_fixpoint_output_is_stable_and_monotonic() {
        let mut rng = StdRng::seed_from_u64(3);
        let edges: Vec<Edge> = (0..6)
            .map(|k| {
                let inner: Vec<Point> = generate_circle_points(200.0, 24 + k, (500.0, 500.0))
                    .into_iter()
                    .map(|p| {
                        let jitter = if rng.random::<f64>() < 0.2 { 60.0 } else { 2.0 };
                        Point::new(
                            p.x + jitter * (rng.random::<f64>() - 0.5),
                            p.y + jitter * (rng.random::<f64>() - 0.5),
                        )
                    })
                    .collect();
                triplets_from_inner(&inner)
            })
            .collect();

        let single = clean_edges(&edges, 20.0, 1.0);
        for (before, after) in edges.iter().zip(&single) {
            assert!(after.len() <= before.len());
        }

        let report = clean_to_fixpoint(edges.clone(), 20.0, 20.0, 1.0);
        assert!(report.passes >= 1);
        for (before, after) in edges.iter().zip(&report.edges) {
            assert!(after.len() <= before.len());
            // Survivors are a subsequence of the input.
            let mut it = before.iter();
            assert!(after.iter().all(|t| it.any(|b| b == t)));
        }
        assert_eq!(clean_edges(&report.edges, 20.0, 1.0), report.edges);
    }

    #[test]
    fn test_fixpoint_uses_second_cutoff_after_first_pass() {
        // Both outliers go in the tight pass; the loose pass then finds
        // nothing more to remove.
        let mut inner: Vec<Point> = (0..8).map(|i| Point::new(10.0 * i as f64, 0.0)).collect();
        inner[2].y = 30.0;
        inner[5].y = 100.0;
        let edge: Edge = triplets_from_inner(&inner);
        let report = clean_to_fixpoint(vec![edge], 20.0, 50.0, 1.0);
        assert_eq!(report.passes, 2);
        assert_eq!(report.edges[0].len(), 6);
        let survivors: Vec<Point> = report.edges[0].iter().map(|t: &RefinedTriplet| t.inner).collect();
        assert!(!survivors.contains(&Point::new(50.0, 100.0)));
        assert_eq!(clean_edges(&report.edges, 50.0, 1.0), report.edges);
    }
}
