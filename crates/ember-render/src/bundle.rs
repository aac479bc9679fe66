//! Everything that depends on the swapchain, built and replaced as one unit.

use ash::vk;
use ember_core::UniformBufferObject;
use ember_gpu::command::{begin_command_buffer, end_command_buffer};
use ember_gpu::descriptors::{mesh_pool_sizes, write_combined_image_sampler, write_uniform_buffer};
use ember_gpu::{
    DepthAttachment, DescriptorPool, Framebuffers, GpuBuffer, GpuContext, GpuResource,
    GraphicsPipeline, GraphicsPipelineConfig, RenderPass, Result, Swapchain,
};

use crate::scene::SceneResources;

/// Clear values: opaque black color and far depth.
pub fn clear_values() -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

/// Swapchain, attachments, pipeline and per-image objects.
///
/// Built front to back in dependency order and destroyed in reverse. Either
/// the whole bundle exists or none of it does.
#[derive(Default)]
pub struct SwapchainBundle {
    swapchain: Swapchain,
    depth: DepthAttachment,
    render_pass: RenderPass,
    pipeline: GraphicsPipeline,
    framebuffers: Framebuffers,
    uniform_buffers: Vec<GpuBuffer>,
    descriptor_pool: DescriptorPool,
    descriptor_sets: Vec<vk::DescriptorSet>,
    command_buffers: Vec<vk::CommandBuffer>,
}

impl SwapchainBundle {
    /// Build every swapchain-dependent object and record one command buffer per image.
    ///
    /// # Safety
    /// The context and scene must be valid and no other swapchain may exist
    /// for the surface.
    pub unsafe fn new(
        ctx: &GpuContext,
        scene: &SceneResources,
        framebuffer_size: (u32, u32),
        vsync: bool,
    ) -> Result<Self> {
        let mut bundle = Self::default();
        if let Err(e) = bundle.populate(ctx, scene, framebuffer_size, vsync) {
            bundle.release(ctx, scene);
            return Err(e);
        }
        Ok(bundle)
    }

    unsafe fn populate(
        &mut self,
        ctx: &GpuContext,
        scene: &SceneResources,
        framebuffer_size: (u32, u32),
        vsync: bool,
    ) -> Result<()> {
        let pool = scene.command_pool();

        self.swapchain = Swapchain::new(ctx, framebuffer_size, vsync)?;
        let extent = self.swapchain.extent();
        let image_count = self.swapchain.image_count();

        self.depth = DepthAttachment::new(ctx, pool, extent)?;
        self.render_pass = RenderPass::new(ctx, self.swapchain.format(), self.depth.format())?;

        let config = GraphicsPipelineConfig {
            vertex_shader: scene.vertex_shader(),
            fragment_shader: scene.fragment_shader(),
            ..GraphicsPipelineConfig::default()
        };
        self.pipeline = GraphicsPipeline::new(
            ctx,
            &config,
            self.render_pass.handle(),
            extent,
            &[scene.set_layout().handle()],
        )?;

        self.framebuffers = Framebuffers::new(
            ctx,
            &self.render_pass,
            self.swapchain.image_views(),
            self.depth.view(),
            extent,
        )?;

        self.uniform_buffers.reserve(image_count);
        for _ in 0..image_count {
            self.uniform_buffers.push(GpuBuffer::new(
                ctx,
                UniformBufferObject::SIZE,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?);
        }

        let set_count = image_count as u32;
        self.descriptor_pool = DescriptorPool::new(ctx, set_count, &mesh_pool_sizes(set_count))?;
        let layouts = vec![scene.set_layout().handle(); image_count];
        self.descriptor_sets = self.descriptor_pool.allocate(ctx, &layouts)?;
        for (set, ubo) in self.descriptor_sets.iter().zip(&self.uniform_buffers) {
            write_uniform_buffer(ctx.device(), *set, 0, ubo.handle(), 0, UniformBufferObject::SIZE);
            write_combined_image_sampler(
                ctx.device(),
                *set,
                1,
                scene.texture().view(),
                scene.texture().sampler(),
            );
        }

        self.command_buffers = pool.allocate_command_buffers(ctx.device(), set_count)?;
        for image in 0..image_count {
            self.record(ctx, scene, image)?;
        }

        Ok(())
    }

    /// Record the draw for one swapchain image.
    unsafe fn record(&self, ctx: &GpuContext, scene: &SceneResources, image: usize) -> Result<()> {
        let device = ctx.device();
        let cmd = self.command_buffers[image];

        begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::empty())?;

        let clear_values = clear_values();
        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass.handle())
            .framebuffer(self.framebuffers.get(image))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: self.swapchain.extent(),
            })
            .clear_values(&clear_values);

        device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);

        if let Some(mesh) = scene.mesh() {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
            device.cmd_bind_vertex_buffers(cmd, 0, &[mesh.vertices.handle()], &[0]);
            device.cmd_bind_index_buffer(cmd, mesh.indices.handle(), 0, vk::IndexType::UINT32);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout(),
                0,
                &[self.descriptor_sets[image]],
                &[],
            );
            device.cmd_draw_indexed(cmd, mesh.index_count, 1, 0, 0, 0);
        }

        device.cmd_end_render_pass(cmd);
        end_command_buffer(device, cmd)
    }

    /// Release everything in reverse build order.
    ///
    /// # Safety
    /// The device must be idle and `scene` must be the one the bundle was built with.
    pub unsafe fn release(&mut self, ctx: &GpuContext, scene: &SceneResources) {
        scene
            .command_pool()
            .free_command_buffers(ctx.device(), &self.command_buffers);
        self.command_buffers.clear();
        self.descriptor_pool.destroy(ctx);
        self.descriptor_sets.clear();
        for ubo in &mut self.uniform_buffers {
            ubo.destroy(ctx);
        }
        self.uniform_buffers.clear();
        self.framebuffers.destroy(ctx);
        self.pipeline.destroy(ctx);
        self.render_pass.destroy(ctx);
        self.depth.destroy(ctx);
        self.swapchain.destroy(ctx);
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Number of swapchain images, and of every per-image object.
    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    pub fn uniform_buffer(&self, image: usize) -> &GpuBuffer {
        &self.uniform_buffers[image]
    }

    pub fn command_buffer(&self, image: usize) -> vk::CommandBuffer {
        self.command_buffers[image]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clears_to_black_and_far_depth() {
        let [color, depth] = clear_values();
        unsafe {
            assert_eq!(color.color.float32, [0.0, 0.0, 0.0, 1.0]);
            assert_eq!(depth.depth_stencil.depth, 1.0);
            assert_eq!(depth.depth_stencil.stencil, 0);
        }
    }
}
