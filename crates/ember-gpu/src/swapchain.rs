//! Swapchain management.

use ash::vk;

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::image::create_image_view;
use crate::resource::GpuResource;

/// Swapchain images, their views and the parameters they were created with.
#[derive(Default)]
pub struct Swapchain {
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for the context's surface.
    ///
    /// `framebuffer_size` is used only when the surface leaves the extent to
    /// the application.
    ///
    /// # Safety
    /// The context must be valid and no other swapchain may target the surface.
    pub unsafe fn new(ctx: &GpuContext, framebuffer_size: (u32, u32), vsync: bool) -> Result<Self> {
        let support = ctx.surface().capabilities(ctx.physical_device())?;
        let surface_format = select_surface_format(&support.formats).ok_or_else(|| {
            GpuError::InvalidState("surface reports no formats".to_string())
        })?;
        let present_mode = select_present_mode(&support.present_modes, vsync);
        let extent = calculate_extent(&support.capabilities, framebuffer_size);
        let image_count = image_count(&support.capabilities);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(ctx.surface().surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let loader = ctx.swapchain_loader();
        let handle = loader
            .create_swapchain(&create_info, None)
            .map_err(GpuError::creation("swapchain"))?;

        let mut swapchain = Self {
            handle,
            images: Vec::new(),
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
        };

        if let Err(e) = swapchain.create_views(ctx) {
            swapchain.destroy(ctx);
            return Err(e);
        }

        tracing::info!(
            "Swapchain created: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            swapchain.images.len(),
            surface_format.format,
            present_mode
        );

        Ok(swapchain)
    }

    unsafe fn create_views(&mut self, ctx: &GpuContext) -> Result<()> {
        self.images = ctx.swapchain_loader().get_swapchain_images(self.handle)?;
        self.image_views.reserve(self.images.len());
        for &image in &self.images {
            let view = create_image_view(
                ctx.device(),
                image,
                self.format,
                vk::ImageAspectFlags::COLOR,
                1,
            )?;
            self.image_views.push(view);
        }
        Ok(())
    }

    /// Acquire the next image, signaling `semaphore` when it is ready.
    ///
    /// Returns the image index and whether the swapchain is suboptimal.
    /// Fails with [`GpuError::SwapchainOutOfDate`] when no image was acquired.
    ///
    /// # Safety
    /// The semaphore must be unsignaled with no pending operations.
    pub unsafe fn acquire_next_image(
        &self,
        ctx: &GpuContext,
        semaphore: vk::Semaphore,
    ) -> Result<(u32, bool)> {
        ctx.swapchain_loader()
            .acquire_next_image(self.handle, u64::MAX, semaphore, vk::Fence::null())
            .map_err(GpuError::from)
    }

    /// Queue `image_index` for presentation after `wait_semaphore` signals.
    ///
    /// Fails with [`GpuError::SwapchainSuboptimal`] or
    /// [`GpuError::SwapchainOutOfDate`] when the swapchain needs a rebuild; the
    /// image was still queued in the suboptimal case.
    ///
    /// # Safety
    /// The image must have been acquired from this swapchain.
    pub unsafe fn present(
        &self,
        ctx: &GpuContext,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<()> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.handle];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match ctx
            .swapchain_loader()
            .queue_present(ctx.present_queue(), &present_info)
        {
            Ok(false) => Ok(()),
            Ok(true) => Err(GpuError::SwapchainSuboptimal),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of swapchain images.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl GpuResource for Swapchain {
    unsafe fn destroy(&mut self, ctx: &GpuContext) {
        for view in self.image_views.drain(..) {
            ctx.device().destroy_image_view(view, None);
        }
        self.images.clear();
        if self.handle != vk::SwapchainKHR::null() {
            ctx.swapchain_loader().destroy_swapchain(self.handle, None);
            self.handle = vk::SwapchainKHR::null();
        }
    }
}

/// Prefer sRGB BGRA; otherwise the first reported format.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// Prefer mailbox unless vsync is requested; FIFO is always supported.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, or the framebuffer size clamped to the
/// supported range when the surface leaves it open.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    (width, height): (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        let min = capabilities.min_image_extent;
        let max = capabilities.max_image_extent;
        vk::Extent2D {
            width: width.max(min.width).min(max.width),
            height: height.max(min.height).min(max.height),
        }
    }
}

/// One more than the minimum, capped by the maximum when there is one.
pub fn image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn prefers_srgb_bgra() {
        let available = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(select_surface_format(&available), Some(available[1]));
    }

    #[test]
    fn falls_back_to_first_format() {
        let available = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        assert_eq!(select_surface_format(&available), Some(available[0]));
        assert_eq!(select_surface_format(&[]), None);
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(select_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(select_present_mode(&all, true), vk::PresentModeKHR::FIFO);
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::IMMEDIATE], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn current_extent_wins_unless_sentinel() {
        let fixed = caps((1280, 720), (1, 1), (4096, 4096));
        assert_eq!(
            calculate_extent(&fixed, (800, 600)),
            vk::Extent2D {
                width: 1280,
                height: 720
            }
        );

        let open = caps((u32::MAX, u32::MAX), (200, 100), (1920, 1080));
        assert_eq!(
            calculate_extent(&open, (800, 600)),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
        assert_eq!(
            calculate_extent(&open, (5000, 10)),
            vk::Extent2D {
                width: 1920,
                height: 100
            }
        );
    }

    #[test]
    fn image_count_respects_maximum() {
        let mut c = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(image_count(&c), 3);
        c.max_image_count = 2;
        assert_eq!(image_count(&c), 2);
        c.max_image_count = 8;
        assert_eq!(image_count(&c), 3);
    }
}
