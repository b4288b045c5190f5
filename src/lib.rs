//! Optimal spectral extraction from IFU data cubes
//!
//! Given a 3D science data cube, its per-voxel variance cube and a normalized
//! spatial/spectral profile cube of matching shape, [`extract`] produces a 1D
//! flux spectrum (one value per wavelength slice) using the inverse-variance,
//! profile-weighted averaging of Horne (1986, PASP 98, 609), with iterative
//! sigma-clipping of outliers.
//!
//! The profile cube is prepared either from a simulated PSF model
//! ([`ModelPsf`]: mirror, per-slice Gaussian smoothing and a constant
//! sub-pixel shift) or from a reference-star observation ([`from_star`]:
//! per-slice normalization to unit flux).
//!
//! Cubes are loaded from NumPy `.npz` archives with [`CubeLoader`]; the
//! extracted [`Spectrum`] can be summarized, exported to CSV or, with the
//! `plot` feature, drawn to an SVG file.

pub mod cube;
mod error;
pub mod extract;
pub mod profile;
pub mod spectrum;

pub use cube::{Cube, CubeLoader};
pub use error::Error;
pub use extract::{boxcar, extract, ExtractConfig, Extraction};
pub use profile::{from_star, ModelPsf};
pub use spectrum::Spectrum;
