//! Core data types for the Ember renderer.
//!
//! Everything in this crate lives on the host side and never touches the driver:
//! - Vertex layout shared with the vertex shader
//! - Mesh loading and vertex de-duplication
//! - Camera and uniform buffer math
//! - Decoded RGBA texture data

pub mod camera;
pub mod error;
pub mod mesh;
pub mod texture;
pub mod vertex;

pub use camera::{Camera, UniformBufferObject};
pub use error::{Error, Result};
pub use mesh::Mesh;
pub use texture::TextureData;
pub use vertex::Vertex;
