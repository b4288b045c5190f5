//! Model-PSF profile preparation
//!
//! Aligns a simulated PSF cube onto the data's spatial frame: left-right
//! mirror, per-slice Gaussian smoothing and a constant sub-pixel shift,
//! then a slice-axis trim or zero-pad to the data's slice count. The flip
//! axis, shift and smoothing sigma are instrument/grating-specific
//! calibration values, not universal constants.

use ndarray::{s, Array2, Array3, ArrayView2, Axis};

use super::ProfileError;

type Result<T> = std::result::Result<T, ProfileError>;

/// Model-PSF alignment builder
///
/// ```no_run
/// # fn main() -> Result<(), ifu_optex::profile::ProfileError> {
/// use ifu_optex::ModelPsf;
/// # let psf_cube = ndarray::Array3::<f64>::zeros((10, 4, 4));
/// let profile = ModelPsf::new(psf_cube)
///     .pixel_scale(0.1)
///     .smooth_sigma(0.085)
///     .shift(0.5, -0.3)
///     .build(8)?;
/// # Ok(())
/// # }
/// ```
pub struct ModelPsf {
    psf: Array3<f64>,
    pixel_scale: f64,
    smooth_sigma: f64,
    shift: (f64, f64),
    flip: bool,
}
impl ModelPsf {
    /// Wraps a raw simulated PSF cube, `[slice, y, x]`
    pub fn new(psf: Array3<f64>) -> Self {
        Self {
            psf,
            pixel_scale: 1f64,
            smooth_sigma: 0f64,
            shift: (0f64, 0f64),
            flip: true,
        }
    }
    /// Detector pixel scale [arcsec/px]
    pub fn pixel_scale(self, arcsec_per_px: f64) -> Self {
        Self {
            pixel_scale: arcsec_per_px,
            ..self
        }
    }
    /// Per-slice Gaussian smoothing sigma [arcsec]
    ///
    /// Converted to pixels with the pixel scale; zero disables smoothing.
    pub fn smooth_sigma(self, arcsec: f64) -> Self {
        Self {
            smooth_sigma: arcsec,
            ..self
        }
    }
    /// Constant sub-pixel shift [px] applied to every slice
    pub fn shift(self, x: f64, y: f64) -> Self {
        Self {
            shift: (x, y),
            ..self
        }
    }
    /// Enables or disables the left-right mirror
    ///
    /// The mirror corrects a known orientation mismatch between the PSF
    /// simulator and the data reduction conventions; on by default.
    pub fn flip(self, flip: bool) -> Self {
        Self { flip, ..self }
    }
    /// Aligns the PSF cube and trims or zero-pads it to `n_slices`
    pub fn build(self, n_slices: usize) -> Result<Array3<f64>> {
        if self.pixel_scale <= 0f64 {
            return Err(ProfileError::PixelScale(self.pixel_scale));
        }
        if self.smooth_sigma < 0f64 {
            return Err(ProfileError::SmoothSigma(self.smooth_sigma));
        }
        if self.psf.is_empty() {
            return Err(ProfileError::EmptyPsf);
        }
        let mut psf = if self.flip {
            self.psf.slice(s![.., .., ..;-1]).to_owned()
        } else {
            self.psf
        };
        let sigma_px = self.smooth_sigma / self.pixel_scale;
        if sigma_px > 0f64 {
            let kernel = gaussian_kernel(sigma_px);
            for mut slice in psf.axis_iter_mut(Axis(0)) {
                let smoothed = blur_slice(&slice.view(), &kernel);
                slice.assign(&smoothed);
            }
        }
        let (shift_x, shift_y) = self.shift;
        if shift_x != 0f64 || shift_y != 0f64 {
            for mut slice in psf.axis_iter_mut(Axis(0)) {
                let shifted = shift_slice(&slice.view(), shift_x, shift_y);
                slice.assign(&shifted);
            }
        }
        let (n_psf, n_y, n_x) = psf.dim();
        if n_psf == n_slices {
            return Ok(psf);
        }
        let mut out = Array3::zeros((n_slices, n_y, n_x));
        let n = n_psf.min(n_slices);
        out.slice_mut(s![..n, .., ..])
            .assign(&psf.slice(s![..n, .., ..]));
        Ok(out)
    }
}

/// Normalized 1D Gaussian kernel, truncated at 4 sigma
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (4f64 * sigma).ceil() as i64;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-0.5 * (i as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= total);
    kernel
}

/// Mirrors an out-of-bounds index back into `0..n`
fn reflect(mut i: i64, n: i64) -> usize {
    loop {
        if i < 0 {
            i = -i - 1;
        } else if i >= n {
            i = 2 * n - 1 - i;
        } else {
            return i as usize;
        }
    }
}

/// Separable 2D Gaussian blur with reflective boundary handling
fn blur_slice(slice: &ArrayView2<f64>, kernel: &[f64]) -> Array2<f64> {
    let (n_y, n_x) = slice.dim();
    let radius = (kernel.len() / 2) as i64;
    // along x
    let mut rows = Array2::zeros((n_y, n_x));
    for y in 0..n_y {
        for x in 0..n_x {
            let mut acc = 0f64;
            for (j, &k) in kernel.iter().enumerate() {
                let xx = reflect(x as i64 + j as i64 - radius, n_x as i64);
                acc += k * slice[[y, xx]];
            }
            rows[[y, x]] = acc;
        }
    }
    // along y
    let mut out = Array2::zeros((n_y, n_x));
    for y in 0..n_y {
        for x in 0..n_x {
            let mut acc = 0f64;
            for (j, &k) in kernel.iter().enumerate() {
                let yy = reflect(y as i64 + j as i64 - radius, n_y as i64);
                acc += k * rows[[yy, x]];
            }
            out[[y, x]] = acc;
        }
    }
    out
}

/// Sub-pixel 2D translation via bilinear interpolation, zero fill outside
fn shift_slice(slice: &ArrayView2<f64>, shift_x: f64, shift_y: f64) -> Array2<f64> {
    let (n_y, n_x) = slice.dim();
    let mut out = Array2::zeros((n_y, n_x));
    for y in 0..n_y {
        for x in 0..n_x {
            let fy = y as f64 - shift_y;
            let fx = x as f64 - shift_x;
            let y0 = fy.floor();
            let x0 = fx.floor();
            let wy = fy - y0;
            let wx = fx - x0;
            let mut acc = 0f64;
            for (dy, ky) in [(0i64, 1f64 - wy), (1i64, wy)] {
                for (dx, kx) in [(0i64, 1f64 - wx), (1i64, wx)] {
                    let yy = y0 as i64 + dy;
                    let xx = x0 as i64 + dx;
                    if yy >= 0 && yy < n_y as i64 && xx >= 0 && xx < n_x as i64 {
                        acc += ky * kx * slice[[yy as usize, xx as usize]];
                    }
                }
            }
            out[[y, x]] = acc;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn delta_cube(n_slices: usize, n: usize, y: usize, x: usize) -> Array3<f64> {
        let mut cube = Array3::zeros((n_slices, n, n));
        for l in 0..n_slices {
            cube[[l, y, x]] = 1f64;
        }
        cube
    }

    #[test]
    fn flip_mirrors_the_x_axis() {
        let psf = delta_cube(2, 5, 2, 1);
        let profile = ModelPsf::new(psf).build(2).unwrap();
        assert_eq!(profile[[0, 2, 3]], 1f64);
        assert_eq!(profile[[0, 2, 1]], 0f64);
    }

    #[test]
    fn smoothing_preserves_total_flux() {
        let psf = delta_cube(1, 41, 20, 20);
        let profile = ModelPsf::new(psf)
            .flip(false)
            .pixel_scale(0.1)
            .smooth_sigma(0.2)
            .build(1)
            .unwrap();
        // kernel fully inside the slice, the blur redistributes but keeps the mass
        assert!((profile.sum() - 1f64).abs() < 1e-12);
        assert!(profile[[0, 20, 20]] < 1f64);
    }

    #[test]
    fn integer_shift_moves_the_peak() {
        let psf = delta_cube(1, 7, 3, 3);
        let profile = ModelPsf::new(psf)
            .flip(false)
            .shift(1f64, -2f64)
            .build(1)
            .unwrap();
        assert_eq!(profile[[0, 1, 4]], 1f64);
        assert_eq!(profile[[0, 3, 3]], 0f64);
    }

    #[test]
    fn subpixel_shift_splits_the_peak() {
        let psf = delta_cube(1, 7, 3, 3);
        let profile = ModelPsf::new(psf)
            .flip(false)
            .shift(0.5, 0f64)
            .build(1)
            .unwrap();
        assert!((profile[[0, 3, 3]] - 0.5).abs() < 1e-12);
        assert!((profile[[0, 3, 4]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn slice_axis_is_trimmed_and_padded() {
        let psf = Array3::from_elem((10, 3, 3), 1f64);
        let trimmed = ModelPsf::new(psf.clone()).build(6).unwrap();
        assert_eq!(trimmed.dim(), (6, 3, 3));
        let padded = ModelPsf::new(psf).build(12).unwrap();
        assert_eq!(padded.dim(), (12, 3, 3));
        assert_eq!(padded.index_axis(Axis(0), 11).sum(), 0f64);
        assert_eq!(padded.index_axis(Axis(0), 9).sum(), 9f64);
    }

    #[test]
    fn invalid_pixel_scale_is_rejected() {
        let psf = Array3::from_elem((1, 3, 3), 1f64);
        let result = ModelPsf::new(psf).pixel_scale(0f64).build(1);
        assert!(matches!(result, Err(ProfileError::PixelScale(_))));
    }
}
