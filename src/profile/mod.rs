//! Profile cube preparation
//!
//! The extraction weights the data against a normalized spatial/spectral
//! template of the source. Two preparation paths are provided:
//!
//! - [`from_star`]: a reference-star observation, aligned and dithered
//!   identically to the science cube, normalized slice by slice to unit
//!   flux. No spatial alignment is applied.
//! - [`ModelPsf`]: a simulated PSF cube, mirrored, smoothed and shifted onto
//!   the data's spatial frame. This path is inherently approximate: the
//!   model PSF is not a perfect match to the true instrument PSF, so the
//!   extracted spectrum carries a systematic scale bias.

use ndarray::{Array3, Axis};

mod model;
pub use model::ModelPsf;

#[derive(thiserror::Error, Debug)]
pub enum ProfileError {
    #[error("pixel scale must be positive, got {0} arcsec/px")]
    PixelScale(f64),
    #[error("smoothing sigma must not be negative, got {0} arcsec")]
    SmoothSigma(f64),
    #[error("empty PSF cube")]
    EmptyPsf,
}

/// Builds a profile cube from a reference-star observation
///
/// Every slice is normalized independently: non-finite voxels are zeroed,
/// then the slice is divided by its spatial sum so it integrates to 1.
/// A slice summing to zero is degenerate and comes out all-NaN; the
/// extraction propagates it as a NaN flux value for that slice.
pub fn from_star(star: &Array3<f64>) -> Array3<f64> {
    let mut profile = star.mapv(|v| if v.is_finite() { v } else { 0f64 });
    for mut slice in profile.axis_iter_mut(Axis(0)) {
        let total = slice.sum();
        if total == 0f64 {
            slice.fill(f64::NAN);
        } else {
            slice.mapv_inplace(|v| v / total);
        }
    }
    profile
}
