//! Mesh rendering on top of `ember-gpu`.
//!
//! [`Renderer`] owns the device, the static scene resources and the current
//! [`SwapchainBundle`], and runs the drawing protocol in [`FrameLoop`].

pub mod bundle;
pub mod frame_loop;
pub mod renderer;
pub mod scene;

pub use bundle::SwapchainBundle;
pub use frame_loop::{FrameBackend, FrameLoop, FrameStats, FrameStatus};
pub use renderer::{GpuBackend, RenderOptions, Renderer};
pub use scene::{MeshBuffers, SceneAssets, SceneData, SceneResources};
