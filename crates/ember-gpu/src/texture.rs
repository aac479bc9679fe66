//! Sampled textures with a full mip chain.

use ash::vk;
use ember_core::TextureData;

use crate::buffer::GpuBuffer;
use crate::command::CommandPool;
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::image::{mip_level_count, GpuImage, ImageDesc};
use crate::resource::GpuResource;

/// Color format textures are uploaded in.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Sampler state: linear filtering, repeat addressing and the full LOD range.
///
/// Anisotropy is enabled only when `max_anisotropy` is given.
pub fn sampler_create_info(
    mip_levels: u32,
    max_anisotropy: Option<f32>,
) -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(max_anisotropy.is_some())
        .max_anisotropy(max_anisotropy.unwrap_or(1.0))
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(mip_levels as f32)
}

/// Texture image with mips and its sampler.
#[derive(Default)]
pub struct Texture {
    image: GpuImage,
    sampler: vk::Sampler,
}

impl Texture {
    /// Upload RGBA pixels, generate mips and create the sampler.
    ///
    /// # Safety
    /// The context must be valid and `pool` must belong to the graphics family.
    pub unsafe fn upload(ctx: &GpuContext, pool: &CommandPool, data: &TextureData) -> Result<Self> {
        let (width, height) = (data.width(), data.height());
        let mip_levels = mip_level_count(width, height);

        let mut staging = GpuBuffer::host_visible_with_data(
            ctx,
            vk::BufferUsageFlags::TRANSFER_SRC,
            data.pixels(),
        )?;

        let image = GpuImage::new(
            ctx,
            &ImageDesc {
                width,
                height,
                mip_levels,
                format: TEXTURE_FORMAT,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
                properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            },
        );
        let mut texture = match image {
            Ok(image) => Self {
                image,
                sampler: vk::Sampler::null(),
            },
            Err(e) => {
                staging.destroy(ctx);
                return Err(e);
            }
        };

        let filled = texture.fill(ctx, pool, &staging);
        staging.destroy(ctx);

        if let Err(e) = filled {
            texture.destroy(ctx);
            return Err(e);
        }

        tracing::info!("Texture {}x{} uploaded with {} mip levels", width, height, mip_levels);
        Ok(texture)
    }

    unsafe fn fill(&mut self, ctx: &GpuContext, pool: &CommandPool, staging: &GpuBuffer) -> Result<()> {
        self.image.transition_layout(
            ctx,
            pool,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        self.image.copy_from_buffer(ctx, pool, staging)?;
        self.image.generate_mipmaps(ctx, pool)?;
        self.image.create_view(ctx, vk::ImageAspectFlags::COLOR)?;

        let info = sampler_create_info(self.image.mip_levels(), ctx.max_anisotropy());
        self.sampler = ctx
            .device()
            .create_sampler(&info, None)
            .map_err(GpuError::creation("sampler"))?;
        Ok(())
    }

    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels()
    }
}

impl GpuResource for Texture {
    unsafe fn destroy(&mut self, ctx: &GpuContext) {
        if self.sampler != vk::Sampler::null() {
            ctx.device().destroy_sampler(self.sampler, None);
            self.sampler = vk::Sampler::null();
        }
        self.image.destroy(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_covers_full_lod_range() {
        let info = sampler_create_info(10, Some(16.0));
        assert_eq!(info.min_lod, 0.0);
        assert_eq!(info.max_lod, 10.0);
        assert_eq!(info.mipmap_mode, vk::SamplerMipmapMode::LINEAR);
        assert_eq!(info.mag_filter, vk::Filter::LINEAR);
        assert_eq!(info.min_filter, vk::Filter::LINEAR);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.address_mode_v, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.address_mode_w, vk::SamplerAddressMode::REPEAT);
    }

    #[test]
    fn anisotropy_uses_adapter_limit_when_available() {
        let info = sampler_create_info(1, Some(8.0));
        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert_eq!(info.max_anisotropy, 8.0);

        let info = sampler_create_info(1, None);
        assert_eq!(info.anisotropy_enable, vk::FALSE);
        assert_eq!(info.max_anisotropy, 1.0);
    }
}
