pub mod async_renderable;
pub mod config;
pub mod drawable;
pub mod frame;
pub mod graticule;
pub mod map_view;
pub mod refresh;

pub use async_renderable::{AsyncRenderable, AsyncSource, Invalidator, QueryAbort};
pub use config::{ConfigError, EngineConfig};
pub use drawable::{DrawContext, Drawable, Resolvable, ResolutionState};
pub use frame::{RenderCommand, RenderFrame};
pub use graticule::Graticule;
pub use map_view::{MapView, Offscreen};
pub use refresh::{RefreshCounter, RefreshRequester};
