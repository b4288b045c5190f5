//! Optimal spectral extraction
//!
//! Implements the inverse-variance, profile-weighted extraction of
//! Horne (1986, PASP 98, 609). Each wavelength slice is processed
//! independently: the data/profile ratio is sigma-clipped to flag outliers,
//! the surviving voxels are combined with weights `profile^2 / variance`,
//! and the per-slice fluxes are assembled into a [`Spectrum`]. Slices are
//! independent so the work is spread over a rayon pool.
//!
//! Degenerate voxels (zero variance or zero profile) contribute zero weight;
//! a degenerate slice (zero total weight, or every voxel clipped) yields a
//! NaN flux value for that slice, never a panic and never an infinity.
//!
//! Non-finite voxels in data and variance must have been replaced with zero
//! before calling [`extract`], once, by the caller
//! ([`Cube::sanitize`](crate::Cube::sanitize)); re-sanitizing inside the
//! weighting would make the masking semantics ambiguous.

use itertools::izip;
use ndarray::{Array2, Array3, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::spectrum::Spectrum;

#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("variance cube shape {variance:?} does not match data cube shape {data:?}")]
    VarianceShape {
        data: (usize, usize, usize),
        variance: (usize, usize, usize),
    },
    #[error("profile cube shape {profile:?} does not match data cube shape {data:?}")]
    ProfileShape {
        data: (usize, usize, usize),
        profile: (usize, usize, usize),
    },
    #[error("wavelength vector length {wavelength} does not match the slice count {slices}")]
    WavelengthLength { slices: usize, wavelength: usize },
}
type Result<T> = std::result::Result<T, ExtractError>;

/// Outlier rejection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Sigma-clipping threshold in units of the slice standard deviation
    pub sigma_clip_threshold: f64,
    /// Maximum number of sigma-clipping iterations per slice
    pub sigma_clip_max_iters: usize,
}
impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            sigma_clip_threshold: 3f64,
            sigma_clip_max_iters: 5,
        }
    }
}

/// Extraction result: the spectrum and the voxels rejected to obtain it
#[derive(Debug, Clone)]
pub struct Extraction {
    pub spectrum: Spectrum,
    /// `true` at voxels excluded from the weighted sum, same shape as the cube
    pub mask: Array3<bool>,
}

/// Iteratively flags outliers in `values`
///
/// Recomputes the mean and standard deviation of the surviving entries each
/// iteration and flags entries further than `threshold` standard deviations
/// from the mean, for up to `max_iters` iterations or until no entry moves.
/// Returns a flag per entry, `true` for clipped. Once converged within
/// `max_iters`, re-running on the survivors flags nothing new; if the
/// iteration cap cuts the loop short, a re-run may still flag more.
pub fn sigma_clip(values: &[f64], threshold: f64, max_iters: usize) -> Vec<bool> {
    let mut clipped = vec![false; values.len()];
    for _ in 0..max_iters {
        let survivors: Vec<f64> = values
            .iter()
            .zip(&clipped)
            .filter_map(|(&v, &c)| (!c).then(|| v))
            .collect();
        if survivors.len() < 2 {
            break;
        }
        let n = survivors.len() as f64;
        let mean = survivors.iter().sum::<f64>() / n;
        let std = (survivors.iter().map(|v| v - mean).fold(0f64, |s, x| s + x * x) / n).sqrt();
        if std == 0f64 {
            break;
        }
        let mut changed = false;
        for (&v, c) in values.iter().zip(clipped.iter_mut()) {
            if !*c && (v - mean).abs() > threshold * std {
                *c = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    clipped
}

/// Extracts one wavelength slice, returning its flux and extraction mask
fn extract_slice(
    data: ArrayView2<f64>,
    variance: ArrayView2<f64>,
    profile: ArrayView2<f64>,
    config: &ExtractConfig,
) -> (f64, Array2<bool>) {
    // Outlier statistics run over the profile support: voxels with zero
    // profile carry zero weight anyway and their ratio is undefined.
    let mut voxels = Vec::new();
    let mut ratios = Vec::new();
    for ((voxel, &d), &p) in data.indexed_iter().zip(profile.iter()) {
        if p != 0f64 {
            let ratio = d / p;
            if ratio.is_finite() {
                voxels.push(voxel);
                ratios.push(ratio);
            }
        }
    }
    let clipped = sigma_clip(
        &ratios,
        config.sigma_clip_threshold,
        config.sigma_clip_max_iters,
    );
    let mut mask = Array2::from_elem(data.dim(), false);
    for (voxel, c) in voxels.into_iter().zip(clipped) {
        if c {
            mask[voxel] = true;
        }
    }
    // Masked voxels are removed from both sums; the caller's cubes are
    // never touched.
    let mut numerator = 0f64;
    let mut weights = 0f64;
    for (&d, &v, &p, &m) in izip!(data.iter(), variance.iter(), profile.iter(), mask.iter()) {
        if m || v == 0f64 {
            continue;
        }
        numerator += p * d / v;
        weights += p * p / v;
    }
    let flux = if weights == 0f64 {
        f64::NAN
    } else {
        numerator / weights
    };
    (flux, mask)
}

/// Optimal extraction of a spectrum from equal-shaped data, variance and
/// profile cubes
///
/// Per slice: the data/profile ratio is sigma-clipped, clipped voxels are
/// excluded, and the flux is `sum(profile * data / variance) /
/// sum(profile^2 / variance)` over the surviving voxels. Degenerate slices
/// come out as NaN. Non-finite voxels in `data` and `variance` must have
/// been zeroed beforehand (see [`Cube::sanitize`](crate::Cube::sanitize)).
pub fn extract(
    data: &Array3<f64>,
    variance: &Array3<f64>,
    profile: &Array3<f64>,
    wavelength: &[f64],
    config: &ExtractConfig,
) -> Result<Extraction> {
    if variance.dim() != data.dim() {
        return Err(ExtractError::VarianceShape {
            data: data.dim(),
            variance: variance.dim(),
        });
    }
    if profile.dim() != data.dim() {
        return Err(ExtractError::ProfileShape {
            data: data.dim(),
            profile: profile.dim(),
        });
    }
    let (n_slices, n_y, n_x) = data.dim();
    if wavelength.len() != n_slices {
        return Err(ExtractError::WavelengthLength {
            slices: n_slices,
            wavelength: wavelength.len(),
        });
    }
    log::info!("Extracting {} slices...", n_slices);
    let now = Instant::now();
    let slices: Vec<(f64, Array2<bool>)> = (0..n_slices)
        .into_par_iter()
        .map(|l| {
            extract_slice(
                data.index_axis(Axis(0), l),
                variance.index_axis(Axis(0), l),
                profile.index_axis(Axis(0), l),
                config,
            )
        })
        .collect();
    log::info!("... extracted in {}ms", now.elapsed().as_millis());
    let mut flux = Vec::with_capacity(n_slices);
    let mut mask = Array3::from_elem((n_slices, n_y, n_x), false);
    for (l, (slice_flux, slice_mask)) in slices.into_iter().enumerate() {
        flux.push(slice_flux);
        mask.index_axis_mut(Axis(0), l).assign(&slice_mask);
    }
    Ok(Extraction {
        spectrum: Spectrum {
            wavelength: wavelength.to_vec(),
            flux,
        },
        mask,
    })
}

/// Plain aperture-sum extraction: the spatial sum of every slice
///
/// The diagnostic the optimal extraction is compared against; no weighting,
/// no outlier rejection. Assumes NaN-sanitized input.
pub fn boxcar(data: &Array3<f64>, wavelength: &[f64]) -> Result<Spectrum> {
    let n_slices = data.dim().0;
    if wavelength.len() != n_slices {
        return Err(ExtractError::WavelengthLength {
            slices: n_slices,
            wavelength: wavelength.len(),
        });
    }
    Ok(Spectrum {
        wavelength: wavelength.to_vec(),
        flux: data
            .axis_iter(Axis(0))
            .map(|slice| slice.sum())
            .collect(),
    })
}
