pub mod binning;
pub mod cv_squared;
pub mod fano_factor;
pub mod heatmap;
pub mod noise;
pub mod raw_expression;
pub mod raw_noise;
pub mod scatter;
pub mod spatial_amplitude;
pub mod spatial_expression;
pub mod statistics;
