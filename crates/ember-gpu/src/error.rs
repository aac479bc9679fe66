//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Driver, instance or surface setup failed.
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// No adapter scored above zero.
    #[error("No suitable GPU found")]
    NoSuitableAdapter,

    /// No memory type satisfies the request.
    #[error("No memory type in filter {type_filter:#034b} has properties {properties:?}")]
    UnsupportedMemory {
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    },

    /// Device memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailure(String),

    /// A Vulkan object could not be created.
    #[error("Failed to create {what}: {result}")]
    ResourceCreation {
        what: &'static str,
        result: vk::Result,
    },

    /// Layout transition without a known barrier.
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    /// The image format cannot be blitted with linear filtering.
    #[error("Format {0:?} does not support linear blitting")]
    MipGenerationUnsupported(vk::Format),

    /// Mesh, texture or other host asset failed to load.
    #[error(transparent)]
    AssetLoad(#[from] ember_core::Error),

    /// SPIR-V blob missing or malformed.
    #[error("Failed to load shader {path}: {reason}")]
    ShaderLoad { path: String, reason: String },

    /// The logical device was lost.
    #[error("Device lost")]
    DeviceLost,

    /// The swapchain no longer matches the surface.
    #[error("Swapchain out of date")]
    SwapchainOutOfDate,

    /// The swapchain still works but no longer matches the surface exactly.
    #[error("Swapchain suboptimal")]
    SwapchainSuboptimal,

    /// Operation called on a resource that cannot support it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(vk::Result),
}

impl GpuError {
    /// Whether a swapchain rebuild recovers from this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SwapchainOutOfDate | Self::SwapchainSuboptimal)
    }

    /// Map a creation failure for `what`, keeping device loss distinct.
    pub fn creation(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            result => Self::ResourceCreation { what, result },
        }
    }
}

impl From<vk::Result> for GpuError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::SwapchainOutOfDate,
            vk::Result::SUBOPTIMAL_KHR => Self::SwapchainSuboptimal,
            other => Self::Vulkan(other),
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swapchain_codes_are_recoverable() {
        assert!(GpuError::from(vk::Result::ERROR_OUT_OF_DATE_KHR).is_recoverable());
        assert!(GpuError::from(vk::Result::SUBOPTIMAL_KHR).is_recoverable());
        assert!(!GpuError::from(vk::Result::ERROR_DEVICE_LOST).is_recoverable());
        assert!(!GpuError::NoSuitableAdapter.is_recoverable());
    }

    #[test]
    fn device_loss_is_never_hidden() {
        assert!(matches!(
            GpuError::from(vk::Result::ERROR_DEVICE_LOST),
            GpuError::DeviceLost
        ));
        assert!(matches!(
            GpuError::creation("buffer")(vk::Result::ERROR_DEVICE_LOST),
            GpuError::DeviceLost
        ));
        assert!(matches!(
            GpuError::creation("buffer")(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            GpuError::ResourceCreation { what: "buffer", .. }
        ));
    }
}
