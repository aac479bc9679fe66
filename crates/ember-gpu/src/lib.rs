//! Vulkan resource layer for the Ember renderer.
//!
//! This crate provides:
//! - Instance creation with an optional diagnostic messenger
//! - Adapter scoring and logical device creation
//! - Dedicated memory allocation for buffers and images
//! - Layout transitions, mip chain generation and texture upload
//! - Swapchain, render pass, descriptor and pipeline objects
//! - Command pools, single-time submissions and frame synchronization
//!
//! Every object owning Vulkan handles implements [`GpuResource`] and is
//! destroyed explicitly with the [`GpuContext`] it came from.

pub mod adapter;
pub mod buffer;
pub mod command;
pub mod context;
pub mod debug;
pub mod depth;
pub mod descriptors;
pub mod error;
pub mod image;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod render_pass;
pub mod resource;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use adapter::{AdapterInfo, QueueFamilyIndices};
pub use buffer::GpuBuffer;
pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use debug::{DiagnosticSink, MessageType, Severity};
pub use depth::DepthAttachment;
pub use descriptors::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
pub use error::{GpuError, Result};
pub use image::{GpuImage, ImageDesc, LayoutTransition};
pub use memory::MemoryBlock;
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
pub use render_pass::{Framebuffers, RenderPass};
pub use resource::GpuResource;
pub use surface::{SurfaceCapabilities, SurfaceContext, SurfaceProvider};
pub use swapchain::Swapchain;
pub use sync::{FrameSync, FrameSyncManager};
pub use texture::Texture;
