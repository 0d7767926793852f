use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::config::{OutputOptions, Parameters, ProjectIds, RepickOptions};
use crate::error::RepickError;
use crate::io::input::{
    find_contour_files, load_contours, LocalMicrographSource, MicrographRecord, MicrographSource,
};
use crate::io::npy::{read_points, write_pixels};
use crate::io::output::{
    pick_records, write_pick_render, write_pick_table, write_vesicle_splines, PickRecord,
};
use crate::processing::filters::gaussian_blur;
use crate::processing::pipeline::refine_micrograph;
use crate::processing::spline::respline_points;
use crate::timing::{Stage, StageTimings, TimingBreakdown};

/// Result of processing one micrograph.
#[derive(Debug)]
pub struct MicrographOutput {
    pub uid: u64,
    pub vesicles: usize,
    pub splines_written: usize,
    pub picks: Vec<PickRecord>,
    pub timings: StageTimings,
}

#[derive(Debug)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub vesicles: usize,
    pub picks: usize,
    pub splines_written: usize,
    pub project: Option<ProjectIds>,
    pub timings: TimingBreakdown,
}

/// Reads the parameter file, then refines every micrograph listed in the
/// configured manifest. A broken parameter file or manifest aborts the
/// run; problems with a single micrograph only skip that micrograph.
pub fn run(
    parameters_path: &Path,
    input_dir: Option<&Path>,
    mut options: RepickOptions,
    outputs: &OutputOptions,
) -> Result<RunSummary> {
    let params = Parameters::load(parameters_path)?;
    options.psize = params.general.psize;

    let input_dir: PathBuf = input_dir
        .map(Path::to_path_buf)
        .or_else(|| params.input.directory.clone())
        .ok_or_else(|| {
            RepickError::Config("no contour directory given and [input] directory unset".into())
        })?;

    let source = LocalMicrographSource::new(
        params.micrographs.manifest.clone(),
        params.micrographs.root.clone(),
    );
    let mut summary = run_with_source(&source, &input_dir, &options, outputs)?;
    summary.project = params.csparc_input;
    if let Some(ids) = &summary.project {
        log::info!(
            "picks prepared for project {} job {} workspace {}",
            ids.project_id.as_deref().unwrap_or("?"),
            ids.job_id.as_deref().unwrap_or("?"),
            ids.workspace_id.as_deref().unwrap_or("?")
        );
    }
    Ok(summary)
}

/// Processes all micrographs of `source` in parallel and aggregates the
/// results in manifest order.
pub fn run_with_source(
    source: &dyn MicrographSource,
    input_dir: &Path,
    options: &RepickOptions,
    outputs: &OutputOptions,
) -> Result<RunSummary> {
    let records = source.records().context("failed to list micrographs")?;
    log::info!("refining membranes in {} micrographs", records.len());

    let results: Vec<Result<MicrographOutput>> = records
        .par_iter()
        .map(|record| process_micrograph(record, source, input_dir, options, outputs))
        .collect();

    let mut timings = StageTimings::default();
    let mut picks = Vec::new();
    let (mut processed, mut skipped, mut vesicles, mut splines_written) = (0, 0, 0, 0);
    for (record, result) in records.iter().zip(results) {
        match result {
            Ok(output) => {
                log::debug!(
                    "micrograph {}: {} of {} vesicles written as splines",
                    output.uid,
                    output.splines_written,
                    output.vesicles
                );
                processed += 1;
                vesicles += output.vesicles;
                splines_written += output.splines_written;
                timings.merge(&output.timings);
                picks.extend(output.picks);
            }
            Err(e) => {
                skipped += 1;
                log::warn!("skipping micrograph {}: {:#}", record.uid, e);
            }
        }
    }

    if let Some(path) = &outputs.pick_table {
        timings.time(Stage::WriteOutputs, || write_pick_table(path, &picks))?;
        log::info!("wrote {} picks to {:?}", picks.len(), path);
    }

    let breakdown = timings.breakdown();
    breakdown.log();
    if let Some(path) = &outputs.timings {
        let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &breakdown)
            .with_context(|| format!("failed to write timings to {:?}", path))?;
    }

    Ok(RunSummary {
        processed,
        skipped,
        vesicles,
        picks: picks.len(),
        splines_written,
        project: None,
        timings: breakdown,
    })
}

/// Full refinement of one micrograph: contours, image, blur, per-vesicle
/// refinement, cleaning, splines and the optional artefacts.
pub fn process_micrograph(
    record: &MicrographRecord,
    source: &dyn MicrographSource,
    input_dir: &Path,
    options: &RepickOptions,
    outputs: &OutputOptions,
) -> Result<MicrographOutput> {
    let uid = record.uid;
    let mut timings = StageTimings::default();

    let files = find_contour_files(input_dir, uid)?;
    let contours = load_contours(&files)?;

    let micrograph = timings
        .time(Stage::LoadImage, || source.load(record))
        .with_context(|| format!("failed to load micrograph {:?}", record.path))?;
    if let Some(header_psize) = micrograph.psize {
        if (header_psize - options.psize).abs() > 1e-3 * options.psize {
            log::warn!(
                "micrograph {}: header pixel size {:.4} differs from configured {:.4}",
                uid,
                header_psize,
                options.psize
            );
        }
    }

    let image = match options.blur {
        Some(blur) => timings.time(Stage::Blur, || {
            gaussian_blur(&micrograph.image, blur.ksize, blur.sigma)
        }),
        None => micrograph.image,
    };

    let refinement = refine_micrograph(&image, &contours, options);
    timings.merge(&refinement.timings);

    let splines_written = timings.time(Stage::WriteOutputs, || -> Result<usize> {
        if let Some(dir) = &outputs.picks_dir {
            write_pick_render(&dir.join(format!("{}.png", uid)), &image, &refinement.raw_edges)?;
        }
        if let Some(dir) = &outputs.cleaned_picks_dir {
            write_pick_render(
                &dir.join(format!("{}_cleaned.png", uid)),
                &image,
                &refinement.cleaned.edges,
            )?;
        }
        match &outputs.spline_dir {
            Some(dir) => write_vesicle_splines(dir, uid, &refinement.splines),
            None => Ok(0),
        }
    })?;

    let picks = pick_records(record, &image, options.psize, &refinement.splines);
    log::info!(
        "micrograph {}: {} vesicles, {} picks after {} cleaning passes",
        uid,
        contours.len(),
        picks.len(),
        refinement.cleaned.passes
    );

    Ok(MicrographOutput {
        uid,
        vesicles: contours.len(),
        splines_written,
        picks,
        timings,
    })
}

#[derive(Debug, Default, PartialEq)]
pub struct ResplineSummary {
    pub written: usize,
    pub failed: usize,
}

/// Re-fits a closed spline through every `.npy` point file in `input_dir`
/// and writes the distinct integer pixels it passes through to a file of
/// the same name in `output_dir`. Unreadable or unfittable files are
/// logged and skipped.
pub fn respline_directory(
    input_dir: &Path,
    density: usize,
    output_dir: &Path,
) -> Result<ResplineSummary> {
    fs::create_dir_all(output_dir).with_context(|| format!("failed to create {:?}", output_dir))?;
    let mut files: Vec<PathBuf> = fs::read_dir(input_dir)
        .with_context(|| format!("failed to list {:?}", input_dir))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|e| e == "npy"))
        .collect();
    files.sort();

    let mut summary = ResplineSummary::default();
    for path in files {
        let Some(name) = path.file_name() else {
            continue;
        };
        let result = read_points(&path)
            .and_then(|points| respline_points(&points, density))
            .and_then(|pixels| write_pixels(output_dir.join(name), &pixels));
        match result {
            Ok(()) => summary.written += 1,
            Err(e) => {
                log::warn!("file {:?} skipped: {}", name, e);
                summary.failed += 1;
            }
        }
    }
    Ok(summary)
}
