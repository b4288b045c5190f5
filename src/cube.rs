//! IFU data cube
//!
//! A [`Cube`] holds the science data, its per-voxel noise variance and the
//! wavelength of each slice, all windowed to a common spatial footprint by
//! the upstream loader. Cubes are read from NumPy `.npz` archives of
//! `float64` arrays with [`CubeLoader`].

use ndarray::Array3;
use npyz::npz::NpzArchive;
use std::{
    io,
    path::{Path, PathBuf},
    time::Instant,
};

#[derive(thiserror::Error, Debug)]
pub enum CubeError {
    #[error("failed to read the cube archive")]
    Io(#[from] io::Error),
    #[error("array `{0}` is missing from the archive")]
    MissingArray(String),
    #[error("array `{name}` has {ndim} dimensions, expected {expected}")]
    Dimensions {
        name: String,
        ndim: usize,
        expected: usize,
    },
    #[error("array `{0}` is stored in Fortran order, expected C order")]
    Order(String),
    #[error("failed to shape the cube array")]
    Shape(#[from] ndarray::ShapeError),
    #[error("variance cube shape {variance:?} does not match data cube shape {data:?}")]
    VarianceShape {
        data: (usize, usize, usize),
        variance: (usize, usize, usize),
    },
    #[error("wavelength vector length {wavelength} does not match the slice count {slices}")]
    WavelengthLength { slices: usize, wavelength: usize },
    #[error("negative variance at voxel {0:?}")]
    NegativeVariance((usize, usize, usize)),
}
type Result<T> = std::result::Result<T, CubeError>;

/// Science exposure: flux density, noise variance and wavelengths
///
/// `data` and `variance` are indexed `[slice, y, x]` and always share the
/// same shape; `wavelength` has one entry per slice.
#[derive(Debug, Clone)]
pub struct Cube {
    pub data: Array3<f64>,
    pub variance: Array3<f64>,
    pub wavelength: Vec<f64>,
}
impl Cube {
    /// Builds a cube, checking the shape invariants
    ///
    /// The variance cube must match the data cube shape and hold no negative
    /// entries (it is a variance, not a standard deviation); the wavelength
    /// vector must have one entry per slice.
    pub fn new(data: Array3<f64>, variance: Array3<f64>, wavelength: Vec<f64>) -> Result<Self> {
        if variance.dim() != data.dim() {
            return Err(CubeError::VarianceShape {
                data: data.dim(),
                variance: variance.dim(),
            });
        }
        if wavelength.len() != data.dim().0 {
            return Err(CubeError::WavelengthLength {
                slices: data.dim().0,
                wavelength: wavelength.len(),
            });
        }
        if let Some((voxel, _)) = variance.indexed_iter().find(|(_, &v)| v < 0f64) {
            return Err(CubeError::NegativeVariance(voxel));
        }
        Ok(Self {
            data,
            variance,
            wavelength,
        })
    }
    /// Returns the `(n_slices, n_y, n_x)` shape
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }
    /// Returns the number of wavelength slices
    pub fn n_slices(&self) -> usize {
        self.data.dim().0
    }
    /// Replaces non-finite voxels in data and variance with zero
    ///
    /// This is the NaN-to-zero policy [`crate::extract::extract`] expects:
    /// applied once, before extraction, never inside the per-voxel weighting.
    /// Returns the number of voxels replaced.
    pub fn sanitize(&mut self) -> usize {
        let mut replaced = 0;
        for cube in [&mut self.data, &mut self.variance] {
            cube.mapv_inplace(|v| {
                if v.is_finite() {
                    v
                } else {
                    replaced += 1;
                    0f64
                }
            });
        }
        replaced
    }
}

/// Shapes raw NPY elements into a cube
///
/// The elements come in file storage order; only C order lays them out the
/// way `[slice, y, x]` indexing expects, so Fortran-order arrays are
/// rejected rather than silently scrambled.
fn cube_from_raw(
    name: &str,
    shape: &[usize],
    order: npyz::Order,
    raw: Vec<f64>,
) -> Result<Array3<f64>> {
    if shape.len() != 3 {
        return Err(CubeError::Dimensions {
            name: name.to_string(),
            ndim: shape.len(),
            expected: 3,
        });
    }
    if !matches!(order, npyz::Order::C) {
        return Err(CubeError::Order(name.to_string()));
    }
    Ok(Array3::from_shape_vec(
        (shape[0], shape[1], shape[2]),
        raw,
    )?)
}

/// Reads a 3D `float64` array from an open `.npz` archive
pub fn read_cube<R: io::Read + io::Seek>(npz: &mut NpzArchive<R>, name: &str) -> Result<Array3<f64>> {
    let npy = npz
        .by_name(name)?
        .ok_or_else(|| CubeError::MissingArray(name.to_string()))?;
    let shape: Vec<usize> = npy.shape().iter().map(|&n| n as usize).collect();
    let order = npy.order();
    let raw = npy.into_vec::<f64>()?;
    cube_from_raw(name, &shape, order, raw)
}

/// Reads a 1D `float64` array from an open `.npz` archive
///
/// Storage order is immaterial for 1D arrays, so none is required.
pub fn read_vector<R: io::Read + io::Seek>(npz: &mut NpzArchive<R>, name: &str) -> Result<Vec<f64>> {
    let npy = npz
        .by_name(name)?
        .ok_or_else(|| CubeError::MissingArray(name.to_string()))?;
    let ndim = npy.shape().len();
    if ndim != 1 {
        return Err(CubeError::Dimensions {
            name: name.to_string(),
            ndim,
            expected: 1,
        });
    }
    Ok(npy.into_vec::<f64>()?)
}

/// Reads a single 3D `float64` array from an `.npz` archive on disk
pub fn load_cube<P: AsRef<Path>>(path: P, name: &str) -> Result<Array3<f64>> {
    let mut npz = NpzArchive::open(path.as_ref())?;
    read_cube(&mut npz, name)
}

/// Science cube loader
///
/// Builder over an `.npz` archive holding the data cube, the variance cube
/// and the wavelength vector:
/// ```no_run
/// # fn main() -> Result<(), ifu_optex::cube::CubeError> {
/// use ifu_optex::CubeLoader;
/// let cube = CubeLoader::default()
///     .data_path("target_cube.npz")
///     .variance_key("var")
///     .load()?;
/// # Ok(())
/// # }
/// ```
pub struct CubeLoader {
    path: PathBuf,
    data_key: String,
    variance_key: String,
    wavelength_key: String,
}
impl Default for CubeLoader {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cube.npz"),
            data_key: String::from("data"),
            variance_key: String::from("variance"),
            wavelength_key: String::from("wavelength"),
        }
    }
}
impl CubeLoader {
    pub fn data_path<P: AsRef<Path>>(self, path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..self
        }
    }
    pub fn data_key<S: Into<String>>(self, key: S) -> Self {
        Self {
            data_key: key.into(),
            ..self
        }
    }
    pub fn variance_key<S: Into<String>>(self, key: S) -> Self {
        Self {
            variance_key: key.into(),
            ..self
        }
    }
    pub fn wavelength_key<S: Into<String>>(self, key: S) -> Self {
        Self {
            wavelength_key: key.into(),
            ..self
        }
    }
    /// Loads the cube, checking the shape invariants
    pub fn load(self) -> Result<Cube> {
        log::info!("Loading {:?}...", self.path);
        let now = Instant::now();
        let mut npz = NpzArchive::open(&self.path)?;
        let data = read_cube(&mut npz, &self.data_key)?;
        let variance = read_cube(&mut npz, &self.variance_key)?;
        let wavelength = read_vector(&mut npz, &self.wavelength_key)?;
        log::info!("... loaded in {}ms", now.elapsed().as_millis());
        Cube::new(data, variance, wavelength)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_cube(shape: (usize, usize, usize)) -> Array3<f64> {
        Array3::from_elem(shape, 1f64)
    }

    #[test]
    fn variance_shape_mismatch() {
        let result = Cube::new(
            unit_cube((5, 4, 4)),
            unit_cube((5, 3, 4)),
            vec![0f64; 5],
        );
        assert!(matches!(result, Err(CubeError::VarianceShape { .. })));
    }

    #[test]
    fn wavelength_length_mismatch() {
        let result = Cube::new(unit_cube((5, 4, 4)), unit_cube((5, 4, 4)), vec![0f64; 4]);
        assert!(matches!(result, Err(CubeError::WavelengthLength { .. })));
    }

    #[test]
    fn negative_variance_rejected() {
        let mut variance = unit_cube((2, 2, 2));
        variance[[1, 0, 1]] = -1f64;
        let result = Cube::new(unit_cube((2, 2, 2)), variance, vec![0f64; 2]);
        assert!(matches!(
            result,
            Err(CubeError::NegativeVariance((1, 0, 1)))
        ));
    }

    #[test]
    fn c_order_elements_land_at_their_indices() {
        let raw: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let cube = cube_from_raw("data", &[2, 2, 2], npyz::Order::C, raw).unwrap();
        assert_eq!(cube[[0, 0, 1]], 1f64);
        assert_eq!(cube[[1, 0, 0]], 4f64);
    }

    #[test]
    fn fortran_order_is_rejected() {
        // element [1, 0, 0] of a Fortran-order 2x2x2 array sits at flat
        // offset 1; shaping it with C strides would scramble the cube
        let raw: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let result = cube_from_raw("data", &[2, 2, 2], npyz::Order::Fortran, raw);
        assert!(matches!(result, Err(CubeError::Order(name)) if name == "data"));
    }

    #[test]
    fn wrong_dimensionality_is_rejected() {
        let result = cube_from_raw("data", &[4, 4], npyz::Order::C, vec![0f64; 16]);
        assert!(matches!(
            result,
            Err(CubeError::Dimensions {
                ndim: 2,
                expected: 3,
                ..
            })
        ));
    }

    #[test]
    fn sanitize_zeroes_non_finite_voxels() {
        let mut data = unit_cube((2, 2, 2));
        data[[0, 0, 0]] = f64::NAN;
        data[[1, 1, 1]] = f64::INFINITY;
        let mut cube = Cube::new(data, unit_cube((2, 2, 2)), vec![1f64, 2f64]).unwrap();
        let replaced = cube.sanitize();
        assert_eq!(replaced, 2);
        assert_eq!(cube.data[[0, 0, 0]], 0f64);
        assert_eq!(cube.data[[1, 1, 1]], 0f64);
        assert!(cube.data.iter().all(|v| v.is_finite()));
    }
}
