//! Render pass with one color and one depth attachment, and its framebuffers.

use ash::vk;

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::resource::GpuResource;

/// Color attachment: cleared on load, stored, handed to presentation.
pub fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
}

/// Depth attachment: cleared on load, contents discarded afterwards.
pub fn depth_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
}

/// External-to-subpass-0 dependency.
///
/// Waits on color output so the acquired image is no longer being read by
/// the presentation engine, and on early fragment tests so the depth
/// attachment of the previous frame is done before it is cleared.
pub fn external_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
}

/// Single-subpass render pass.
#[derive(Default)]
pub struct RenderPass {
    handle: vk::RenderPass,
}

impl RenderPass {
    /// # Safety
    /// The context must be valid.
    pub unsafe fn new(
        ctx: &GpuContext,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let color_ref = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let depth_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(std::slice::from_ref(&color_ref))
            .depth_stencil_attachment(&depth_ref);

        let attachments = [color_attachment(color_format), depth_attachment(depth_format)];
        let subpasses = [subpass];
        let dependencies = [external_dependency()];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let handle = ctx
            .device()
            .create_render_pass(&create_info, None)
            .map_err(GpuError::creation("render pass"))?;

        Ok(Self { handle })
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }
}

impl GpuResource for RenderPass {
    unsafe fn destroy(&mut self, ctx: &GpuContext) {
        if self.handle != vk::RenderPass::null() {
            ctx.device().destroy_render_pass(self.handle, None);
            self.handle = vk::RenderPass::null();
        }
    }
}

/// One framebuffer per swapchain view, each sharing the depth view.
#[derive(Default)]
pub struct Framebuffers {
    handles: Vec<vk::Framebuffer>,
}

impl Framebuffers {
    /// # Safety
    /// The context, render pass and views must be valid.
    pub unsafe fn new(
        ctx: &GpuContext,
        render_pass: &RenderPass,
        color_views: &[vk::ImageView],
        depth_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let mut framebuffers = Self {
            handles: Vec::with_capacity(color_views.len()),
        };

        for &color_view in color_views {
            let attachments = [color_view, depth_view];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass.handle())
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            match ctx.device().create_framebuffer(&create_info, None) {
                Ok(handle) => framebuffers.handles.push(handle),
                Err(e) => {
                    framebuffers.destroy(ctx);
                    return Err(GpuError::creation("framebuffer")(e));
                }
            }
        }

        Ok(framebuffers)
    }

    pub fn get(&self, image_index: usize) -> vk::Framebuffer {
        self.handles[image_index]
    }
}

impl GpuResource for Framebuffers {
    unsafe fn destroy(&mut self, ctx: &GpuContext) {
        for framebuffer in self.handles.drain(..) {
            ctx.device().destroy_framebuffer(framebuffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_attachment_ends_presentable() {
        let color = color_attachment(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(color.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(color.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn depth_attachment_is_not_stored() {
        let depth = depth_attachment(vk::Format::D32_SFLOAT);
        assert_eq!(depth.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(depth.stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(depth.stencil_store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(
            depth.final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn dependency_covers_color_output() {
        let dep = external_dependency();
        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dep.dst_subpass, 0);
        assert!(dep
            .src_stage_mask
            .contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));
        assert!(dep
            .dst_stage_mask
            .contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));
        assert_eq!(dep.src_access_mask, vk::AccessFlags::empty());
        assert!(dep
            .dst_access_mask
            .contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
    }
}
