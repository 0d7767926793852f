use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use membrane_repick::processing::spline::SupportSeparation;
use membrane_repick::{respline_directory, run, OutputOptions, RepickOptions};

#[derive(Parser)]
#[command(name = "membrane-repick")]
#[command(about = "Refine vesicle membrane picks and fit splines through each leaflet")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Refine contour picks for every micrograph in the manifest
    Repick(RepickArgs),
    /// Re-fit splines through existing point files
    Respline(ResplineArgs),
}

#[derive(clap::Args)]
struct RepickArgs {
    /// Parameter file (TOML)
    #[arg(value_name = "PARAMETERS")]
    parameters: PathBuf,

    /// Directory holding the `{uid}*intermembrane.npy` contour files
    #[arg(long, value_name = "DIR")]
    input_dir: Option<PathBuf>,

    /// Separation in Å between sample points on vesicle contours
    #[arg(long, default_value_t = 50.0)]
    contour_spacing: f64,

    /// Distance in Å for the intensity profile to extend from the membrane
    #[arg(long, default_value_t = 45)]
    hist_endpoints: usize,

    /// Maximum deviation in Å from neighbouring picks in the first cleaning pass
    #[arg(long, default_value_t = 20.0)]
    first_clean_cutoff: f64,

    /// Maximum deviation in Å from neighbouring picks in later cleaning passes
    #[arg(long, default_value_t = 50.0)]
    second_clean_cutoff: f64,

    /// Number of points sampled from each spline
    #[arg(long, default_value_t = 20000)]
    spline_density: usize,

    /// Maximum distance in Å between adjacent points of a supporting arc; -1 keeps the full spline
    #[arg(long, default_value_t = 200.0, allow_hyphen_values = true)]
    support_separation: f64,

    /// Save renders of the initial membrane picks here
    #[arg(long, value_name = "DIR")]
    picks_dir: Option<PathBuf>,

    /// Save renders of the cleaned membrane picks here
    #[arg(long, value_name = "DIR")]
    cleaned_picks_dir: Option<PathBuf>,

    /// Save spline coordinates as .npy arrays here
    #[arg(long, value_name = "DIR")]
    spline_dir: Option<PathBuf>,

    /// Aggregate pick table
    #[arg(long, value_name = "CSV", default_value = "picks.csv")]
    output: PathBuf,

    /// Write per-stage timings as JSON
    #[arg(long, value_name = "JSON")]
    timings: Option<PathBuf>,
}

#[derive(clap::Args)]
struct ResplineArgs {
    /// Directory containing .npy point files
    #[arg(long, value_name = "DIR", default_value = ".")]
    input_dir: PathBuf,

    /// Number of points sampled from each spline
    #[arg(long, default_value_t = 20000)]
    spline_density: usize,

    /// Output directory
    #[arg(long, value_name = "DIR")]
    spline_dir: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Repick(args) => {
            let options = RepickOptions {
                contour_spacing: args.contour_spacing,
                half_window: args.hist_endpoints,
                first_cutoff: args.first_clean_cutoff,
                second_cutoff: args.second_clean_cutoff,
                spline_density: args.spline_density,
                support: SupportSeparation::from_cli(args.support_separation),
                ..RepickOptions::default()
            };
            let outputs = OutputOptions {
                picks_dir: args.picks_dir,
                cleaned_picks_dir: args.cleaned_picks_dir,
                spline_dir: args.spline_dir,
                pick_table: Some(args.output),
                timings: args.timings,
            };
            let summary = run(&args.parameters, args.input_dir.as_deref(), options, &outputs)?;
            log::info!(
                "{} micrographs refined, {} skipped, {} picks, {} of {} vesicles with splines",
                summary.processed,
                summary.skipped,
                summary.picks,
                summary.splines_written,
                summary.vesicles
            );
        }
        Command::Respline(args) => {
            let summary =
                respline_directory(&args.input_dir, args.spline_density, &args.spline_dir)?;
            log::info!(
                "{} files resplined, {} skipped",
                summary.written,
                summary.failed
            );
        }
    }
    Ok(())
}
