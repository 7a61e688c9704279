pub mod antimeridian;
pub mod bounds_solver;
pub mod error;
pub mod picking;
pub mod projection;
pub mod scene_model;
pub mod transform;
pub mod view_state;
pub mod visibility;

pub use antimeridian::{AntimeridianHelper, Hemisphere};
pub use bounds_solver::{BoundsCase, SceneBoundsSolver};
pub use error::ProjectionError;
pub use projection::Projection;
pub use scene_model::{Camera, CameraParams, SceneModel, Viewport};
pub use transform::ScratchPad;
pub use view_state::ViewState;
