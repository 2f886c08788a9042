//! Attribute and parameter key constants.
//!
//! Avoid string typos, enable IDE autocomplete.
//! Usage: `node.base().params.get_float(P_SIGMA)`

// === Attribute (port) names ===
pub const A_DATASET_IN: &str = "dataset_in";
pub const A_DATASET_OUT: &str = "dataset_out";
pub const A_IMAGE_A: &str = "image_a";
pub const A_IMAGE_B: &str = "image_b";
pub const A_IMAGE_OUT: &str = "image_out";
pub const A_COORDINATES_IN: &str = "coordinates_in";
pub const A_COORDINATES_OUT: &str = "coordinates_out";
pub const A_RECONSTRUCTION_OUT: &str = "reconstruction_out";

// === Load data ===
/// Image file or directory
pub const P_PATH: &str = "path";
/// Pixel size in nm
pub const P_PIXEL_SIZE: &str = "pixel_size";

// === Crop ===
pub const P_ROI: &str = "roi";

// === Bin ===
/// Integer binning factor
pub const P_FACTOR: &str = "factor";
/// sum | mean | max | min
pub const P_BIN_MODE: &str = "mode";

// === Spatial filter ===
/// gaussian | dog
pub const P_FILTER: &str = "filter";
/// Kernel sigma in pixels
pub const P_SIGMA: &str = "sigma";
/// Outer sigma for difference of Gaussians
pub const P_SIGMA_OUTER: &str = "sigma_outer";

// === Temporal filter ===
/// Half-width of the frame window
pub const P_WINDOW: &str = "window";
/// mean | min | median
pub const P_TEMPORAL_MODE: &str = "mode";

// === Image calculator ===
/// add | subtract | multiply | divide | min | max
pub const P_OPERATION: &str = "operation";

// === Frame selection ===
/// mean | std | min | max
pub const P_METRIC: &str = "metric";
pub const P_THRESHOLD: &str = "threshold";
/// Keep frames with metric >= threshold (else <=)
pub const P_KEEP_ABOVE: &str = "keep_above";

// === Particle detection ===
/// Threshold = mean + k * std
pub const P_THRESHOLD_K: &str = "threshold_k";
/// Minimum distance between maxima in pixels
pub const P_MIN_DISTANCE: &str = "min_distance";

// === Reconstruction ===
/// Output pixel size in nm
pub const P_OUTPUT_PIXEL_SIZE: &str = "output_pixel_size";
/// Splat sigma in nm
pub const P_SPLAT_SIGMA: &str = "splat_sigma";
