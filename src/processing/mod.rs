pub mod bilayer;
pub mod clean;
pub mod contours;
pub mod correct;
pub mod filters;
pub mod geometry;
pub mod pipeline;
pub mod profile;
pub mod spline;
