//! Application runner for the Ember renderer.
//!
//! Handles the boilerplate around a [`Renderer`](ember_render::Renderer):
//! - Logging setup
//! - Asset loading
//! - Window and GPU context creation
//! - Event loop handling, including parking while minimized
//! - Orderly shutdown and the process exit status
//!
//! # Example
//!
//! ```no_run
//! use ember_app::{run_app, AppConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app(AppConfig::default().with_assets_root("assets"))
//! }
//! ```

mod runner;

pub use runner::{run_app, AppConfig};

pub use ember_render::{FrameStats, SceneAssets};
