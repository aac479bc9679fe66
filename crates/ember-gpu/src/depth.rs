//! Depth attachment.

use ash::vk;

use crate::command::CommandPool;
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::image::{GpuImage, ImageDesc};
use crate::resource::GpuResource;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Whether the format has a stencil aspect.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// First candidate whose optimal-tiling features allow depth-stencil attachment.
pub fn select_depth_format(
    candidates: &[vk::Format],
    optimal_features: impl Fn(vk::Format) -> vk::FormatFeatureFlags,
) -> Result<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            optimal_features(format).contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or_else(|| GpuError::Initialization("no supported depth format".to_string()))
}

/// Depth image sized to the swapchain, ready for use as an attachment.
#[derive(Default)]
pub struct DepthAttachment {
    image: GpuImage,
}

impl DepthAttachment {
    /// Create the depth image and move it to `DEPTH_STENCIL_ATTACHMENT_OPTIMAL`.
    ///
    /// # Safety
    /// The context must be valid and `pool` must belong to the graphics family.
    pub unsafe fn new(ctx: &GpuContext, pool: &CommandPool, extent: vk::Extent2D) -> Result<Self> {
        let format = select_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
            ctx.format_properties(format).optimal_tiling_features
        })?;

        let mut image = GpuImage::new(
            ctx,
            &ImageDesc {
                width: extent.width,
                height: extent.height,
                mip_levels: 1,
                format,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            },
        )?;

        let prepared = image
            .create_view(ctx, vk::ImageAspectFlags::DEPTH)
            .and_then(|()| {
                image.transition_layout(
                    ctx,
                    pool,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                )
            });
        if let Err(e) = prepared {
            image.destroy(ctx);
            return Err(e);
        }

        tracing::debug!("Depth attachment {:?} {}x{}", format, extent.width, extent.height);
        Ok(Self { image })
    }

    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }
}

impl GpuResource for DepthAttachment {
    unsafe fn destroy(&mut self, ctx: &GpuContext) {
        self.image.destroy(ctx);
    }
}
