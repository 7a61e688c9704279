//! Coarse elevation lookup used to build tiles and as the last fallback for
//! point queries.

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ElevationError {
    /// The source has no coverage at the point.
    NoData,
    /// Coordinates outside the geodetic domain.
    OutOfRange { latitude: f64, longitude: f64 },
}

impl std::fmt::Display for ElevationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElevationError::NoData => write!(f, "no elevation data"),
            ElevationError::OutOfRange {
                latitude,
                longitude,
            } => write!(f, "coordinate out of range: lat={latitude} lng={longitude}"),
        }
    }
}

impl std::error::Error for ElevationError {}

/// Height above the ellipsoid in meters at a geodetic point.
pub trait ElevationSource: Send + Sync {
    fn elevation(&self, latitude: f64, longitude: f64) -> Result<f64, ElevationError>;
}

impl<F> ElevationSource for F
where
    F: Fn(f64, f64) -> Result<f64, ElevationError> + Send + Sync,
{
    fn elevation(&self, latitude: f64, longitude: f64) -> Result<f64, ElevationError> {
        self(latitude, longitude)
    }
}

/// Constant height everywhere on the globe.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FlatElevation(pub f64);

impl ElevationSource for FlatElevation {
    fn elevation(&self, latitude: f64, longitude: f64) -> Result<f64, ElevationError> {
        check_range(latitude, longitude)?;
        Ok(self.0)
    }
}

pub fn check_range(latitude: f64, longitude: f64) -> Result<(), ElevationError> {
    if (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude) {
        Ok(())
    } else {
        Err(ElevationError::OutOfRange {
            latitude,
            longitude,
        })
    }
}
