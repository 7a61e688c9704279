/// Why a single-point transform produced no result.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// The point lies behind the camera plane.
    BehindCamera,
    /// The screen ray never reaches the surface (sky or off-globe).
    MissedSurface,
    /// The input or intermediate math was not finite.
    Degenerate,
}

impl std::fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectionError::BehindCamera => write!(f, "point is behind the camera"),
            ProjectionError::MissedSurface => write!(f, "screen ray misses the surface"),
            ProjectionError::Degenerate => write!(f, "degenerate transform input"),
        }
    }
}

impl std::error::Error for ProjectionError {}
