use crate::{cube::CubeError, extract::ExtractError, profile::ProfileError};

/// Library-level error aggregate
///
/// Library functions return their own module error; this enum is the single
/// type callers can funnel them into when a pipeline spans several modules.
/// The bundled binary reports through `anyhow` instead.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error in the `cube` module")]
    Cube(#[from] CubeError),
    #[error("Error in the `profile` module")]
    Profile(#[from] ProfileError),
    #[error("Error in the `extract` module")]
    Extract(#[from] ExtractError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_module_errors() {
        let error: Error = CubeError::MissingArray(String::from("data")).into();
        assert!(matches!(error, Error::Cube(_)));
        let error: Error = ProfileError::PixelScale(0f64).into();
        assert!(matches!(error, Error::Profile(_)));
        let error: Error = ExtractError::WavelengthLength {
            slices: 5,
            wavelength: 4,
        }
        .into();
        assert!(matches!(error, Error::Extract(_)));
    }
}

