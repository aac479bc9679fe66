//! Device memory type selection and allocation.

use ash::vk;

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::resource::GpuResource;

/// Find the first memory type allowed by `type_filter` that has all `required` flags.
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let count = properties
        .memory_type_count
        .min(vk::MAX_MEMORY_TYPES as u32);

    (0..count)
        .find(|&i| {
            type_filter & (1 << i) != 0
                && properties.memory_types[i as usize]
                    .property_flags
                    .contains(required)
        })
        .ok_or(GpuError::UnsupportedMemory {
            type_filter,
            properties: required,
        })
}

/// A dedicated device allocation bound to exactly one buffer or image.
#[derive(Debug, Default)]
pub struct MemoryBlock {
    memory: vk::DeviceMemory,
}

impl MemoryBlock {
    /// Allocate memory satisfying `requirements` with the given property flags.
    ///
    /// # Safety
    /// The context must be valid.
    pub unsafe fn allocate(
        ctx: &GpuContext,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let type_index = find_memory_type(
            ctx.memory_properties(),
            requirements.memory_type_bits,
            properties,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(type_index);

        let memory = ctx
            .device()
            .allocate_memory(&alloc_info, None)
            .map_err(|e| match e {
                vk::Result::ERROR_DEVICE_LOST => GpuError::DeviceLost,
                e => GpuError::AllocationFailure(format!(
                    "{} bytes from type {type_index}: {e}",
                    requirements.size
                )),
            })?;

        Ok(Self { memory })
    }

    /// Raw memory handle.
    pub fn handle(&self) -> vk::DeviceMemory {
        self.memory
    }
}

impl GpuResource for MemoryBlock {
    unsafe fn destroy(&mut self, ctx: &GpuContext) {
        if self.memory != vk::DeviceMemory::null() {
            ctx.device().free_memory(self.memory, None);
            self.memory = vk::DeviceMemory::null();
        }
    }
}
