//! 2D images, views, layout transitions and mip chain generation.

use ash::vk;

use crate::buffer::GpuBuffer;
use crate::command::{execute_single_time_commands, CommandPool};
use crate::context::GpuContext;
use crate::depth::has_stencil_component;
use crate::error::{GpuError, Result};
use crate::memory::MemoryBlock;
use crate::resource::GpuResource;

/// Number of mip levels for a full chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Extent of the next mip level. Each dimension halves and never drops below 1.
pub fn next_mip_extent(width: u32, height: u32) -> (u32, u32) {
    ((width / 2).max(1), (height / 2).max(1))
}

/// Aspect addressed when moving an image of `format` into `new_layout`.
pub fn aspect_for(format: vk::Format, new_layout: vk::ImageLayout) -> vk::ImageAspectFlags {
    if new_layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Access and stage masks of one image memory barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

impl LayoutTransition {
    /// Barrier masks for the supported whole-image transitions.
    pub fn between(old: vk::ImageLayout, new: vk::ImageLayout) -> Result<Self> {
        use vk::ImageLayout as L;

        let transition = match (old, new) {
            (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => Self {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            },
            (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => Self {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            },
            (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => Self {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            },
            _ => return Err(GpuError::UnsupportedTransition { old, new }),
        };

        Ok(transition)
    }
}

/// Barrier on a single mip level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipBarrier {
    pub level: u32,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub masks: LayoutTransition,
}

/// One command of the mip chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipStep {
    Barrier(MipBarrier),
    Blit {
        src_level: u32,
        src_extent: (u32, u32),
        dst_level: u32,
        dst_extent: (u32, u32),
    },
}

/// Commands that fill levels `1..mip_levels` from level 0.
///
/// Every level must start in `TRANSFER_DST_OPTIMAL`; all of them end in
/// `SHADER_READ_ONLY_OPTIMAL`.
pub fn mip_chain_steps(width: u32, height: u32, mip_levels: u32) -> Vec<MipStep> {
    use vk::ImageLayout as L;

    let mut steps = Vec::with_capacity(mip_levels as usize * 3);
    let (mut mip_width, mut mip_height) = (width.max(1), height.max(1));

    for level in 1..mip_levels {
        steps.push(MipStep::Barrier(MipBarrier {
            level: level - 1,
            old_layout: L::TRANSFER_DST_OPTIMAL,
            new_layout: L::TRANSFER_SRC_OPTIMAL,
            masks: LayoutTransition {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::TRANSFER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            },
        }));

        let next = next_mip_extent(mip_width, mip_height);
        steps.push(MipStep::Blit {
            src_level: level - 1,
            src_extent: (mip_width, mip_height),
            dst_level: level,
            dst_extent: next,
        });

        steps.push(MipStep::Barrier(MipBarrier {
            level: level - 1,
            old_layout: L::TRANSFER_SRC_OPTIMAL,
            new_layout: L::SHADER_READ_ONLY_OPTIMAL,
            masks: LayoutTransition {
                src_access: vk::AccessFlags::TRANSFER_READ,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            },
        }));

        (mip_width, mip_height) = next;
    }

    if mip_levels > 0 {
        steps.push(MipStep::Barrier(MipBarrier {
            level: mip_levels - 1,
            old_layout: L::TRANSFER_DST_OPTIMAL,
            new_layout: L::SHADER_READ_ONLY_OPTIMAL,
            masks: LayoutTransition {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            },
        }));
    }

    steps
}

fn full_range(aspect: vk::ImageAspectFlags, base_mip: u32, levels: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(base_mip)
        .level_count(levels)
        .base_array_layer(0)
        .layer_count(1)
}

/// Record a pipeline barrier moving `range` between layouts.
///
/// # Safety
/// The command buffer must be recording and the image must be valid.
unsafe fn record_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    masks: LayoutTransition,
) {
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access);

    device.cmd_pipeline_barrier(
        cmd,
        masks.src_stage,
        masks.dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[barrier],
    );
}

/// Create a 2D view over the first `mip_levels` levels of `image`.
///
/// # Safety
/// The device and image must be valid.
pub unsafe fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(full_range(aspect, 0, mip_levels));

    let view = device
        .create_image_view(&create_info, None)
        .map_err(GpuError::creation("image view"))?;
    Ok(view)
}

/// Parameters of a 2D, single-sample, single-layer image.
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub properties: vk::MemoryPropertyFlags,
}

/// An image, its memory and an optional view.
#[derive(Default)]
pub struct GpuImage {
    image: vk::Image,
    memory: MemoryBlock,
    view: vk::ImageView,
    format: vk::Format,
    extent: vk::Extent2D,
    mip_levels: u32,
}

impl GpuImage {
    /// Create the image in `UNDEFINED` layout and bind dedicated memory to it.
    ///
    /// # Safety
    /// The context must be valid.
    pub unsafe fn new(ctx: &GpuContext, desc: &ImageDesc) -> Result<Self> {
        let device = ctx.device();

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .format(desc.format)
            .tiling(desc.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = device
            .create_image(&image_info, None)
            .map_err(GpuError::creation("image"))?;

        let requirements = device.get_image_memory_requirements(image);
        let mut memory = match MemoryBlock::allocate(ctx, requirements, desc.properties) {
            Ok(memory) => memory,
            Err(e) => {
                device.destroy_image(image, None);
                return Err(e);
            }
        };

        if let Err(e) = device.bind_image_memory(image, memory.handle(), 0) {
            device.destroy_image(image, None);
            memory.destroy(ctx);
            return Err(GpuError::creation("image memory binding")(e));
        }

        Ok(Self {
            image,
            memory,
            view: vk::ImageView::null(),
            format: desc.format,
            extent: vk::Extent2D {
                width: desc.width,
                height: desc.height,
            },
            mip_levels: desc.mip_levels,
        })
    }

    /// Create the view covering every mip level.
    ///
    /// # Safety
    /// The context must be valid.
    pub unsafe fn create_view(&mut self, ctx: &GpuContext, aspect: vk::ImageAspectFlags) -> Result<()> {
        if self.view != vk::ImageView::null() {
            return Err(GpuError::InvalidState("Image view already created".to_string()));
        }
        self.view = create_image_view(ctx.device(), self.image, self.format, aspect, self.mip_levels)?;
        Ok(())
    }

    /// Move every mip level from `old` to `new` in a single-time submission.
    ///
    /// # Safety
    /// The image must not be in use by the GPU.
    pub unsafe fn transition_layout(
        &self,
        ctx: &GpuContext,
        pool: &CommandPool,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> Result<()> {
        let masks = LayoutTransition::between(old, new)?;
        let range = full_range(aspect_for(self.format, new), 0, self.mip_levels);

        execute_single_time_commands(ctx, pool, |device, cmd| {
            record_barrier(device, cmd, self.image, range, old, new, masks);
        })
    }

    /// Copy `src` into mip level 0. The image must be in `TRANSFER_DST_OPTIMAL`.
    ///
    /// # Safety
    /// The buffer must hold at least a full level 0 and both objects must be idle.
    pub unsafe fn copy_from_buffer(&self, ctx: &GpuContext, pool: &CommandPool, src: &GpuBuffer) -> Result<()> {
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_offset(vk::Offset3D::default())
            .image_extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            });

        execute_single_time_commands(ctx, pool, |device, cmd| {
            device.cmd_copy_buffer_to_image(
                cmd,
                src.handle(),
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        })
    }

    /// Fill every level below 0 by repeated linear blits and leave the whole
    /// chain in `SHADER_READ_ONLY_OPTIMAL`.
    ///
    /// All levels must be in `TRANSFER_DST_OPTIMAL` with level 0 populated.
    ///
    /// # Safety
    /// The image must not be in use by the GPU.
    pub unsafe fn generate_mipmaps(&self, ctx: &GpuContext, pool: &CommandPool) -> Result<()> {
        let features = ctx.format_properties(self.format).optimal_tiling_features;
        if !features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR) {
            return Err(GpuError::MipGenerationUnsupported(self.format));
        }

        let steps = mip_chain_steps(self.extent.width, self.extent.height, self.mip_levels);

        execute_single_time_commands(ctx, pool, |device, cmd| {
            for step in &steps {
                match *step {
                    MipStep::Barrier(barrier) => record_barrier(
                        device,
                        cmd,
                        self.image,
                        full_range(vk::ImageAspectFlags::COLOR, barrier.level, 1),
                        barrier.old_layout,
                        barrier.new_layout,
                        barrier.masks,
                    ),
                    MipStep::Blit {
                        src_level,
                        src_extent,
                        dst_level,
                        dst_extent,
                    } => {
                        let blit = vk::ImageBlit::default()
                            .src_offsets([vk::Offset3D::default(), corner(src_extent)])
                            .src_subresource(color_layer(src_level))
                            .dst_offsets([vk::Offset3D::default(), corner(dst_extent)])
                            .dst_subresource(color_layer(dst_level));

                        device.cmd_blit_image(
                            cmd,
                            self.image,
                            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                            self.image,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            &[blit],
                            vk::Filter::LINEAR,
                        );
                    }
                }
            }
        })?;

        tracing::debug!(
            "Generated {} mip levels for {}x{} image",
            self.mip_levels,
            self.extent.width,
            self.extent.height
        );
        Ok(())
    }

    /// Raw image handle.
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// View handle, null until [`GpuImage::create_view`] succeeds.
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }
}

impl GpuResource for GpuImage {
    unsafe fn destroy(&mut self, ctx: &GpuContext) {
        let device = ctx.device();
        if self.view != vk::ImageView::null() {
            device.destroy_image_view(self.view, None);
            self.view = vk::ImageView::null();
        }
        if self.image != vk::Image::null() {
            device.destroy_image(self.image, None);
            self.image = vk::Image::null();
        }
        self.memory.destroy(ctx);
    }
}

fn corner((width, height): (u32, u32)) -> vk::Offset3D {
    vk::Offset3D {
        x: width as i32,
        y: height as i32,
        z: 1,
    }
}

fn color_layer(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(mip_level)
        .base_array_layer(0)
        .layer_count(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::ImageLayout as L;

    /// Replay the steps and return the final layout of every level.
    fn simulate(width: u32, height: u32, levels: u32) -> Vec<vk::ImageLayout> {
        let mut layouts = vec![L::TRANSFER_DST_OPTIMAL; levels as usize];
        let mut filled = vec![false; levels as usize];
        filled[0] = true;

        for step in mip_chain_steps(width, height, levels) {
            match step {
                MipStep::Barrier(b) => {
                    assert_eq!(layouts[b.level as usize], b.old_layout, "level {}", b.level);
                    layouts[b.level as usize] = b.new_layout;
                }
                MipStep::Blit {
                    src_level,
                    dst_level,
                    ..
                } => {
                    assert_eq!(layouts[src_level as usize], L::TRANSFER_SRC_OPTIMAL);
                    assert_eq!(layouts[dst_level as usize], L::TRANSFER_DST_OPTIMAL);
                    assert!(filled[src_level as usize]);
                    filled[dst_level as usize] = true;
                }
            }
        }

        assert!(filled.iter().all(|&f| f));
        layouts
    }

    #[test]
    fn mip_count_follows_log2_of_longest_side() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 1), 2);
        assert_eq!(mip_level_count(512, 256), 10);
        assert_eq!(mip_level_count(1024, 1024), 11);
        assert_eq!(mip_level_count(1000, 3), 10);
        assert_eq!(mip_level_count(0, 0), 1);

        for w in 1..300u32 {
            for h in [1u32, 7, 64, 299] {
                let expected = (f64::from(w.max(h))).log2().floor() as u32 + 1;
                assert_eq!(mip_level_count(w, h), expected, "{w}x{h}");
            }
        }
    }

    #[test]
    fn mip_extents_halve_down_to_one() {
        assert_eq!(next_mip_extent(512, 256), (256, 128));
        assert_eq!(next_mip_extent(3, 1), (1, 1));
        assert_eq!(next_mip_extent(1, 1), (1, 1));
    }

    #[test]
    fn every_level_ends_shader_readable() {
        for (w, h) in [(512, 256), (1, 1), (5, 3), (1, 300), (1024, 1024)] {
            let levels = mip_level_count(w, h);
            let layouts = simulate(w, h, levels);
            assert_eq!(layouts.len(), levels as usize);
            assert!(layouts.iter().all(|&l| l == L::SHADER_READ_ONLY_OPTIMAL));
        }
    }

    #[test]
    fn chain_for_512_by_256_has_ten_levels() {
        let levels = mip_level_count(512, 256);
        assert_eq!(levels, 10);

        let blits: Vec<_> = mip_chain_steps(512, 256, levels)
            .into_iter()
            .filter_map(|step| match step {
                MipStep::Blit {
                    src_level,
                    dst_level,
                    dst_extent,
                    ..
                } => Some((src_level, dst_level, dst_extent)),
                MipStep::Barrier(_) => None,
            })
            .collect();

        assert_eq!(blits.len(), 9);
        assert_eq!(blits[0], (0, 1, (256, 128)));
        assert_eq!(blits[7], (7, 8, (2, 1)));
        assert_eq!(blits[8], (8, 9, (1, 1)));
    }

    #[test]
    fn transition_table_masks() {
        let t = LayoutTransition::between(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::empty());
        assert_eq!(t.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let t = LayoutTransition::between(L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(t.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);

        let t = LayoutTransition::between(L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::empty());
        assert_eq!(
            t.dst_access,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        assert_eq!(t.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
    }

    #[test]
    fn unknown_transitions_are_rejected() {
        let pairs = [
            (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_DST_OPTIMAL),
            (L::UNDEFINED, L::PRESENT_SRC_KHR),
            (L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL),
            (L::UNDEFINED, L::UNDEFINED),
        ];
        for (old, new) in pairs {
            let err = LayoutTransition::between(old, new).unwrap_err();
            assert!(matches!(
                err,
                GpuError::UnsupportedTransition { old: o, new: n } if o == old && n == new
            ));
        }
    }

    #[test]
    fn depth_targets_use_depth_aspect() {
        let depth = L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
        assert_eq!(aspect_for(vk::Format::D32_SFLOAT, depth), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_for(vk::Format::D24_UNORM_S8_UINT, depth),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            aspect_for(vk::Format::R8G8B8A8_SRGB, L::TRANSFER_DST_OPTIMAL),
            vk::ImageAspectFlags::COLOR
        );
    }
}
