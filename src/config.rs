use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::error::RepickError;
use crate::processing::bilayer::AmbiguityPolicy;
use crate::processing::spline::SupportSeparation;

/// Parameter file shared with the upstream picking tools.
#[derive(Debug, Clone, Deserialize)]
pub struct Parameters {
    pub general: General,
    #[serde(default)]
    pub input: InputSection,
    #[serde(default)]
    pub csparc_input: Option<ProjectIds>,
    #[serde(default)]
    pub micrographs: MicrographSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    /// Downsampling factor used when the coarse picks were produced.
    pub downsample: u32,
    /// Pixel size in Å/px.
    pub psize: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputSection {
    pub directory: Option<PathBuf>,
}

/// Session, project and job identifiers. Only the external importer reads
/// these; they are carried through to the run summary untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectIds {
    pub login: Option<String>,
    #[serde(rename = "PID")]
    pub project_id: Option<String>,
    #[serde(rename = "JID")]
    pub job_id: Option<String>,
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    #[serde(rename = "WID")]
    pub workspace_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MicrographSection {
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for MicrographSection {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            root: default_root(),
        }
    }
}

fn default_manifest() -> PathBuf {
    PathBuf::from("micrographs.csv")
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

impl Parameters {
    /// Reads and validates the parameter file. Any failure here aborts the run.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read parameter file {}", path.display()))?;
        let params: Parameters = toml::from_str(&text)
            .with_context(|| format!("failed to parse parameter file {}", path.display()))?;
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), RepickError> {
        if !(self.general.psize.is_finite() && self.general.psize > 0.0) {
            return Err(RepickError::Config(format!(
                "general.psize must be a positive number, got {}",
                self.general.psize
            )));
        }
        if self.general.downsample == 0 {
            return Err(RepickError::Config(
                "general.downsample must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Numeric knobs of the refinement pipeline. Distances are in Å.
#[derive(Debug, Clone)]
pub struct RepickOptions {
    pub psize: f64,
    pub contour_spacing: f64,
    pub half_window: usize,
    pub first_cutoff: f64,
    pub second_cutoff: f64,
    pub spline_density: usize,
    pub support: SupportSeparation,
    pub ambiguity: AmbiguityPolicy,
    pub blur: Option<BlurOptions>,
}

impl Default for RepickOptions {
    fn default() -> Self {
        Self {
            psize: 1.0,
            contour_spacing: 50.0,
            half_window: 45,
            first_cutoff: 20.0,
            second_cutoff: 50.0,
            spline_density: 20000,
            support: SupportSeparation::Within(200.0),
            ambiguity: AmbiguityPolicy::default(),
            blur: Some(BlurOptions::default()),
        }
    }
}

impl RepickOptions {
    /// Longest contour edge (Å) that is still profiled.
    pub fn max_edge_length(&self) -> f64 {
        1.5 * self.contour_spacing
    }
}

/// Gaussian pre-blur applied to the micrograph before profiling.
#[derive(Debug, Clone, Copy)]
pub struct BlurOptions {
    pub ksize: usize,
    pub sigma: f64,
}

impl Default for BlurOptions {
    fn default() -> Self {
        Self {
            ksize: 29,
            sigma: 5.0,
        }
    }
}

/// Optional output locations. `None` disables the corresponding artefact.
#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    pub picks_dir: Option<PathBuf>,
    pub cleaned_picks_dir: Option<PathBuf>,
    pub spline_dir: Option<PathBuf>,
    pub pick_table: Option<PathBuf>,
    pub timings: Option<PathBuf>,
}
