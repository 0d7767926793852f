//! Per-vesicle and per-micrograph refinement, free of any file I/O.

use rayon::prelude::*;

use crate::config::RepickOptions;
use crate::error::{RepickError, RepickResult};
use crate::processing::bilayer::{find_bilayers, select_bilayer, BilayerChoice};
use crate::processing::clean::{clean_to_fixpoint, CleanReport};
use crate::processing::contours::Contour;
use crate::processing::correct::{correct_pick, Edge};
use crate::processing::filters::ImageF32;
use crate::processing::geometry::pixels_in_rectangle;
use crate::processing::profile::bin_rectangle;
use crate::processing::spline::{fit_vesicle, VesicleSplines};
use crate::timing::{Stage, StageTimings};

/// Refines one coarse contour into a list of bilayer triplets.
///
/// The contour is downsampled, then every consecutive pair of retained
/// points (the closing pair excluded) is profiled. Pairs further apart than
/// `options.max_edge_length()` and pairs without an unambiguous bilayer
/// contribute nothing.
pub fn refine_vesicle(
    image: &ImageF32,
    contour: &Contour,
    options: &RepickOptions,
    timings: &mut StageTimings,
) -> RepickResult<Edge> {
    let psize = options.psize;
    let sparse = contour.downsample(options.contour_spacing, psize);
    if sparse.len() < 3 {
        return Err(RepickError::InsufficientData {
            required: 3,
            actual: sparse.len(),
            context: format!("downsampled contour {}", contour.id),
        });
    }
    sparse.validate_orientation()?;

    let mut edge = Edge::new();
    for pair in sparse.points.windows(2) {
        let (p1, p2) = (&pair[0], &pair[1]);
        if (p2 - p1).norm() * psize > options.max_edge_length() {
            continue;
        }

        let pixels = timings.time(Stage::PixelsInRectangle, || pixels_in_rectangle(p1, p2));
        let intensities = timings.time(Stage::BinRectangle, || {
            bin_rectangle(image, p1, p2, &pixels, psize, options.half_window).means()
        });
        let choice = timings.time(Stage::FindBilayers, || {
            let candidates = find_bilayers(&intensities, options.half_window);
            select_bilayer(
                &intensities,
                &candidates,
                options.half_window,
                &options.ambiguity,
            )
        });

        match choice {
            BilayerChoice::Accepted(candidate) => {
                let triplet =
                    timings.time(Stage::CorrectPicks, || correct_pick(p1, p2, &candidate, psize));
                edge.push(triplet);
            }
            BilayerChoice::Ambiguous { best, runner_up } => {
                log::debug!(
                    "contour {}: ambiguous bilayer between {:?} and {:?}, edge dropped",
                    contour.id,
                    best.offsets(),
                    runner_up.offsets()
                );
            }
            BilayerChoice::NotFound => {}
        }
    }
    Ok(edge)
}

/// Everything computed for one micrograph.
#[derive(Debug)]
pub struct MicrographRefinement {
    /// Refined edges before cleaning, one per contour (empty if skipped).
    pub raw_edges: Vec<Edge>,
    pub cleaned: CleanReport,
    pub splines: Vec<VesicleSplines>,
    pub skipped_vesicles: usize,
    pub timings: StageTimings,
}

/// Refines all contours of one (already blurred) micrograph, cleans the
/// result and fits splines. Vesicles are processed in parallel; a vesicle
/// that fails is logged and left with an empty edge.
pub fn refine_micrograph(
    image: &ImageF32,
    contours: &[Contour],
    options: &RepickOptions,
) -> MicrographRefinement {
    let refined: Vec<(RepickResult<Edge>, StageTimings)> = contours
        .par_iter()
        .map(|contour| {
            let mut timings = StageTimings::default();
            let edge = refine_vesicle(image, contour, options, &mut timings);
            (edge, timings)
        })
        .collect();

    let mut timings = StageTimings::default();
    let mut skipped_vesicles = 0;
    let mut raw_edges = Vec::with_capacity(refined.len());
    for (contour, (edge, t)) in contours.iter().zip(refined) {
        timings.merge(&t);
        match edge {
            Ok(edge) => raw_edges.push(edge),
            Err(e) => {
                log::warn!("skipping vesicle {}: {}", contour.id, e);
                skipped_vesicles += 1;
                raw_edges.push(Edge::new());
            }
        }
    }

    let cleaned = timings.time(Stage::CleanEdges, || {
        clean_to_fixpoint(
            raw_edges.clone(),
            options.first_cutoff,
            options.second_cutoff,
            options.psize,
        )
    });

    let splines: Vec<VesicleSplines> = timings.time(Stage::FitSplines, || {
        cleaned
            .edges
            .par_iter()
            .enumerate()
            .map(|(i, edge)| {
                fit_vesicle(
                    i,
                    edge,
                    options.spline_density,
                    options.support,
                    options.psize,
                )
            })
            .collect()
    });

    MicrographRefinement {
        raw_edges,
        cleaned,
        splines,
        skipped_vesicles,
        timings,
    }
}
