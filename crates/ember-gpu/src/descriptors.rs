//! Descriptor set layouts, pools and writes.

use ash::vk;

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::resource::GpuResource;

/// Descriptor set layout builder.
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl<'a> DescriptorSetLayoutBuilder<'a> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Add a binding.
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Add a uniform buffer binding.
    pub fn uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::UNIFORM_BUFFER, 1, stage_flags)
    }

    /// Add a combined image sampler binding.
    pub fn combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            1,
            stage_flags,
        )
    }

    /// Bindings added so far.
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'a>] {
        &self.bindings
    }

    /// Build the descriptor set layout.
    ///
    /// # Safety
    /// The context must be valid.
    pub unsafe fn build(self, ctx: &GpuContext) -> Result<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        let handle = ctx
            .device()
            .create_descriptor_set_layout(&layout_info, None)
            .map_err(GpuError::creation("descriptor set layout"))?;
        Ok(DescriptorSetLayout { handle })
    }
}

impl Default for DescriptorSetLayoutBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Layout of the mesh set: the transform uniform at binding 0 for the vertex
/// stage and the texture at binding 1 for the fragment stage.
pub fn mesh_set_layout<'a>() -> DescriptorSetLayoutBuilder<'a> {
    DescriptorSetLayoutBuilder::new()
        .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
        .combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
}

/// Pool sizes for `set_count` mesh sets.
pub fn mesh_pool_sizes(set_count: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: set_count,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: set_count,
        },
    ]
}

/// Owned descriptor set layout.
#[derive(Default)]
pub struct DescriptorSetLayout {
    handle: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }
}

impl GpuResource for DescriptorSetLayout {
    unsafe fn destroy(&mut self, ctx: &GpuContext) {
        if self.handle != vk::DescriptorSetLayout::null() {
            ctx.device().destroy_descriptor_set_layout(self.handle, None);
            self.handle = vk::DescriptorSetLayout::null();
        }
    }
}

/// Descriptor pool for allocating descriptor sets.
///
/// Sets are never freed individually; destroying the pool releases them.
#[derive(Default)]
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a new descriptor pool.
    ///
    /// # Safety
    /// The context must be valid.
    pub unsafe fn new(
        ctx: &GpuContext,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = ctx
            .device()
            .create_descriptor_pool(&create_info, None)
            .map_err(GpuError::creation("descriptor pool"))?;
        Ok(Self { pool })
    }

    /// Allocate one set per layout.
    ///
    /// # Safety
    /// The context must be valid.
    pub unsafe fn allocate(
        &self,
        ctx: &GpuContext,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = ctx
            .device()
            .allocate_descriptor_sets(&alloc_info)
            .map_err(GpuError::creation("descriptor sets"))?;
        Ok(sets)
    }
}

impl GpuResource for DescriptorPool {
    unsafe fn destroy(&mut self, ctx: &GpuContext) {
        if self.pool != vk::DescriptorPool::null() {
            ctx.device().destroy_descriptor_pool(self.pool, None);
            self.pool = vk::DescriptorPool::null();
        }
    }
}

/// Write a uniform buffer descriptor.
///
/// # Safety
/// Device and buffer must be valid.
pub unsafe fn write_uniform_buffer(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    buffer: vk::Buffer,
    offset: u64,
    range: u64,
) {
    let buffer_info = vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(std::slice::from_ref(&buffer_info));

    device.update_descriptor_sets(&[write], &[]);
}

/// Write a combined image sampler descriptor for a shader-readable image.
///
/// # Safety
/// Device, view and sampler must be valid.
pub unsafe fn write_combined_image_sampler(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    image_view: vk::ImageView,
    sampler: vk::Sampler,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .image_view(image_view)
        .sampler(sampler)
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(std::slice::from_ref(&image_info));

    device.update_descriptor_sets(&[write], &[]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_layout_binds_uniform_then_sampler() {
        let builder = mesh_set_layout();
        let bindings = builder.bindings();
        assert_eq!(bindings.len(), 2);

        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[0].descriptor_count, 1);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::VERTEX);

        assert_eq!(bindings[1].binding, 1);
        assert_eq!(
            bindings[1].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(bindings[1].descriptor_count, 1);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn pool_sizes_scale_with_image_count() {
        let sizes = mesh_pool_sizes(3);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 3);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[1].descriptor_count, 3);
    }
}
