//! Command pool, recording helpers and single-time submission.

use ash::vk;

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::resource::GpuResource;

/// Command pool for allocating command buffers.
#[derive(Default)]
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a command pool with default flags on the given queue family.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default().queue_family_index(queue_family);

        let pool = device
            .create_command_pool(&create_info, None)
            .map_err(GpuError::creation("command pool"))?;

        Ok(Self { pool, queue_family })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate primary command buffers.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffers(
        &self,
        device: &ash::Device,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = device
            .allocate_command_buffers(&alloc_info)
            .map_err(GpuError::creation("command buffers"))?;
        Ok(buffers)
    }

    /// Return command buffers to the pool.
    ///
    /// # Safety
    /// The buffers must come from this pool and must not be pending execution.
    pub unsafe fn free_command_buffers(&self, device: &ash::Device, buffers: &[vk::CommandBuffer]) {
        if !buffers.is_empty() {
            device.free_command_buffers(self.pool, buffers);
        }
    }
}

impl GpuResource for CommandPool {
    unsafe fn destroy(&mut self, ctx: &GpuContext) {
        if self.pool != vk::CommandPool::null() {
            ctx.device().destroy_command_pool(self.pool, None);
            self.pool = vk::CommandPool::null();
        }
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    device.begin_command_buffer(cmd, &begin_info)?;
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device.end_command_buffer(cmd)?;
    Ok(())
}

/// Submit command buffers to a queue.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn submit_command_buffers(
    device: &ash::Device,
    queue: vk::Queue,
    command_buffers: &[vk::CommandBuffer],
    wait_semaphores: &[vk::Semaphore],
    wait_stages: &[vk::PipelineStageFlags],
    signal_semaphores: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    let submit_info = vk::SubmitInfo::default()
        .command_buffers(command_buffers)
        .wait_semaphores(wait_semaphores)
        .wait_dst_stage_mask(wait_stages)
        .signal_semaphores(signal_semaphores);

    device.queue_submit(queue, &[submit_info], fence)?;
    Ok(())
}

/// Record `f` into a one-shot command buffer, submit it to the graphics queue
/// without a fence and wait for the queue to drain.
///
/// # Safety
/// All handles must be valid and the pool must belong to the graphics family.
pub unsafe fn execute_single_time_commands<F>(
    ctx: &GpuContext,
    pool: &CommandPool,
    f: F,
) -> Result<()>
where
    F: FnOnce(&ash::Device, vk::CommandBuffer),
{
    let device = ctx.device();
    let queue = ctx.graphics_queue();
    let cmd = pool.allocate_command_buffers(device, 1)?[0];

    let result = (|| {
        begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        f(device, cmd);
        end_command_buffer(device, cmd)?;

        let cmd_buffers = [cmd];
        let submit_info = vk::SubmitInfo::default().command_buffers(&cmd_buffers);
        device.queue_submit(queue, &[submit_info], vk::Fence::null())?;
        device.queue_wait_idle(queue)?;
        Ok(())
    })();

    pool.free_command_buffers(device, &[cmd]);

    result
}
