//! Refinement of coarse vesicle-membrane picks in cryo-EM micrographs into
//! inner leaflet, intermembrane and outer leaflet coordinates, with closed
//! spline fits through each layer.

pub mod config;
pub mod entry;
pub mod error;
pub mod io;
pub mod processing;
pub mod timing;
mod utils;

pub use config::{OutputOptions, Parameters, RepickOptions};
pub use entry::{respline_directory, run, RunSummary};
pub use error::{RepickError, RepickResult};
