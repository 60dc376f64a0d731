//! Headless scene lifecycle for the model viewer.
//!
//! A [`SceneSession`] owns the stage, the camera and a render loop. The actual
//! drawing, the host element and model fetching are supplied through the
//! [`RenderBackend`], [`Container`] and [`ModelLoader`] traits.

pub mod camera;
pub mod geometry;
pub mod loader;
pub mod scene;
mod session;

pub use camera::{OrbitControls, PerspectiveCamera};
pub use geometry::{compute_stats, normalization, Aabb, ModelStats, Normalization};
pub use loader::{HttpModelLoader, LoadError, ModelLoader, ModelParser, ObjParser, ParserRegistry};
pub use scene::{Scene, SceneObject};
pub use session::{
    Container, FullscreenError, LoadOutcome, RenderBackend, SceneSession, ViewerConfig,
    ViewerEvent, ViewerState,
};
