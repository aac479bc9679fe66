//! Shared cleanup contract for GPU-owned objects.

use crate::context::GpuContext;

/// A value that owns Vulkan handles created from a [`GpuContext`].
///
/// Resources are released explicitly because destruction needs the device.
/// `destroy` nulls every handle it releases, so a second call, or a call on a
/// partially constructed value, only touches what is still alive. Types that
/// implement `Default` start out owning nothing, so they can be filled in
/// step by step and destroyed at any point.
pub trait GpuResource {
    /// Release all handles owned by this value.
    ///
    /// # Safety
    /// The GPU must have finished using the resource and `ctx` must be the
    /// context it was created from.
    unsafe fn destroy(&mut self, ctx: &GpuContext);
}
