//! Synchronization primitives.

use ash::vk;

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::resource::GpuResource;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = device
        .create_semaphore(&create_info, None)
        .map_err(GpuError::creation("semaphore"))?;
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = device
        .create_fence(&create_info, None)
        .map_err(GpuError::creation("fence"))?;
    Ok(fence)
}

/// Wait for a fence to be signaled.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
    device.wait_for_fences(&[fence], true, timeout_ns)?;
    Ok(())
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    device.reset_fences(&[fence])?;
    Ok(())
}

/// Synchronization objects of one frame slot.
pub struct FrameSync {
    /// Signaled when the acquired image is ready to be rendered to.
    pub image_available: vk::Semaphore,
    /// Signaled when rendering is complete and the image may be presented.
    pub render_finished: vk::Semaphore,
    /// Signaled when the slot's submission has finished executing.
    pub in_flight: vk::Fence,
}

impl FrameSync {
    /// Create the slot's objects. The fence starts signaled so the first wait returns.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight: vk::Fence::null(),
        };
        let created = (|| {
            sync.image_available = create_semaphore(device)?;
            sync.render_finished = create_semaphore(device)?;
            sync.in_flight = create_fence(device, true)?;
            Ok(())
        })();
        if let Err(e) = created {
            sync.release(device);
            return Err(e);
        }
        Ok(sync)
    }

    /// Wait for this slot's previous submission.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait(&self, device: &ash::Device) -> Result<()> {
        wait_for_fence(device, self.in_flight, u64::MAX)
    }

    /// Reset the fence before resubmitting.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        reset_fence(device, self.in_flight)
    }

    unsafe fn release(&mut self, device: &ash::Device) {
        if self.image_available != vk::Semaphore::null() {
            device.destroy_semaphore(self.image_available, None);
            self.image_available = vk::Semaphore::null();
        }
        if self.render_finished != vk::Semaphore::null() {
            device.destroy_semaphore(self.render_finished, None);
            self.render_finished = vk::Semaphore::null();
        }
        if self.in_flight != vk::Fence::null() {
            device.destroy_fence(self.in_flight, None);
            self.in_flight = vk::Fence::null();
        }
    }
}

impl GpuResource for FrameSync {
    unsafe fn destroy(&mut self, ctx: &GpuContext) {
        self.release(ctx.device());
    }
}

/// Synchronization objects for every frame in flight.
#[derive(Default)]
pub struct FrameSyncManager {
    frames: Vec<FrameSync>,
}

impl FrameSyncManager {
    /// Create one [`FrameSync`] per frame in flight.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(ctx: &GpuContext, frames_in_flight: usize) -> Result<Self> {
        let mut manager = Self {
            frames: Vec::with_capacity(frames_in_flight),
        };
        for _ in 0..frames_in_flight {
            match FrameSync::new(ctx.device()) {
                Ok(sync) => manager.frames.push(sync),
                Err(e) => {
                    manager.destroy(ctx);
                    return Err(e);
                }
            }
        }
        Ok(manager)
    }

    /// Sync objects of a frame slot.
    pub fn get(&self, slot: usize) -> &FrameSync {
        &self.frames[slot % self.frames.len()]
    }
}

impl GpuResource for FrameSyncManager {
    unsafe fn destroy(&mut self, ctx: &GpuContext) {
        for sync in &mut self.frames {
            sync.destroy(ctx);
        }
        self.frames.clear();
    }
}
