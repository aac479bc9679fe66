//! Buffers bound to dedicated device memory.

use ash::vk;
use bytemuck::Pod;

use crate::command::{execute_single_time_commands, CommandPool};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::MemoryBlock;
use crate::resource::GpuResource;

/// A buffer and the memory it is bound to.
#[derive(Default)]
pub struct GpuBuffer {
    buffer: vk::Buffer,
    memory: MemoryBlock,
    size: u64,
    properties: vk::MemoryPropertyFlags,
}

impl GpuBuffer {
    /// Create a buffer of `size` bytes bound to memory with `properties`.
    ///
    /// # Safety
    /// The context must be valid.
    pub unsafe fn new(
        ctx: &GpuContext,
        size: u64,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let device = ctx.device();

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = device
            .create_buffer(&buffer_info, None)
            .map_err(GpuError::creation("buffer"))?;

        let requirements = device.get_buffer_memory_requirements(buffer);
        let mut memory = match MemoryBlock::allocate(ctx, requirements, properties) {
            Ok(memory) => memory,
            Err(e) => {
                device.destroy_buffer(buffer, None);
                return Err(e);
            }
        };

        if let Err(e) = device.bind_buffer_memory(buffer, memory.handle(), 0) {
            device.destroy_buffer(buffer, None);
            memory.destroy(ctx);
            return Err(GpuError::creation("buffer memory binding")(e));
        }

        Ok(Self {
            buffer,
            memory,
            size,
            properties,
        })
    }

    /// Create a host-visible, host-coherent buffer holding `data`.
    ///
    /// # Safety
    /// The context must be valid.
    pub unsafe fn host_visible_with_data<T: Pod>(
        ctx: &GpuContext,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let mut buffer = Self::new(
            ctx,
            std::mem::size_of_val(data) as u64,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        if let Err(e) = buffer.upload_host(ctx, data) {
            buffer.destroy(ctx);
            return Err(e);
        }
        Ok(buffer)
    }

    /// Create a device-local buffer and fill it with `data` through a staging copy.
    ///
    /// `TRANSFER_DST` is added to `usage`.
    ///
    /// # Safety
    /// The context must be valid and `pool` must belong to the graphics family.
    pub unsafe fn device_local_with_data<T: Pod>(
        ctx: &GpuContext,
        pool: &CommandPool,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let size = std::mem::size_of_val(data) as u64;
        let mut staging =
            Self::host_visible_with_data(ctx, vk::BufferUsageFlags::TRANSFER_SRC, data)?;

        let result = Self::new(
            ctx,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .and_then(|mut buffer| match copy_buffer(ctx, pool, &staging, &buffer, size) {
            Ok(()) => Ok(buffer),
            Err(e) => {
                buffer.destroy(ctx);
                Err(e)
            }
        });

        staging.destroy(ctx);
        result
    }

    /// Map the memory, copy `data` to offset 0 and unmap.
    ///
    /// # Safety
    /// The GPU must not be reading the buffer while it is written.
    pub unsafe fn upload_host<T: Pod>(&self, ctx: &GpuContext, data: &[T]) -> Result<()> {
        if !self
            .properties
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
        {
            return Err(GpuError::InvalidState(
                "Buffer is not host-visible".to_string(),
            ));
        }

        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as u64 > self.size {
            return Err(GpuError::InvalidState(format!(
                "{} bytes do not fit a {} byte buffer",
                bytes.len(),
                self.size
            )));
        }
        if bytes.is_empty() {
            return Ok(());
        }

        let device = ctx.device();
        let ptr = device.map_memory(
            self.memory.handle(),
            0,
            bytes.len() as u64,
            vk::MemoryMapFlags::empty(),
        )?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
        device.unmap_memory(self.memory.handle());

        Ok(())
    }

    /// Raw buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl GpuResource for GpuBuffer {
    unsafe fn destroy(&mut self, ctx: &GpuContext) {
        if self.buffer != vk::Buffer::null() {
            ctx.device().destroy_buffer(self.buffer, None);
            self.buffer = vk::Buffer::null();
        }
        self.memory.destroy(ctx);
    }
}

/// Copy `size` bytes from `src` to `dst` with a single-time command buffer.
///
/// # Safety
/// Both buffers must be valid, large enough and idle.
pub unsafe fn copy_buffer(
    ctx: &GpuContext,
    pool: &CommandPool,
    src: &GpuBuffer,
    dst: &GpuBuffer,
    size: u64,
) -> Result<()> {
    if size > src.size() || size > dst.size() {
        return Err(GpuError::InvalidState(format!(
            "copy of {size} bytes exceeds buffer bounds"
        )));
    }

    execute_single_time_commands(ctx, pool, |device, cmd| {
        let region = vk::BufferCopy::default().size(size);
        device.cmd_copy_buffer(cmd, src.handle(), dst.handle(), &[region]);
    })
}
