//! Renderer tying the frame loop to the GPU objects.

use std::time::Instant;

use ash::vk;
use ember_core::{Camera, UniformBufferObject};
use ember_gpu::command::submit_command_buffers;
use ember_gpu::{GpuContext, GpuContextBuilder, GpuResource, Result, SurfaceProvider};

use crate::bundle::SwapchainBundle;
use crate::frame_loop::{FrameBackend, FrameLoop, FrameStats, FrameStatus, DEFAULT_FRAMES_IN_FLIGHT};
use crate::scene::{SceneData, SceneResources};

/// Presentation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Present with FIFO instead of preferring mailbox.
    pub vsync: bool,
    /// Frames the host may record ahead of the GPU.
    pub frames_in_flight: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            vsync: false,
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
        }
    }
}

/// [`FrameBackend`] over a live device.
pub struct GpuBackend<P: SurfaceProvider> {
    scene: SceneResources,
    bundle: SwapchainBundle,
    ctx: GpuContext,
    // Declared after the context so the window outlives the surface.
    provider: P,
    vsync: bool,
}

impl<P: SurfaceProvider> GpuBackend<P> {
    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn scene(&self) -> &SceneResources {
        &self.scene
    }

    pub fn bundle(&self) -> &SwapchainBundle {
        &self.bundle
    }
}

impl<P: SurfaceProvider> FrameBackend for GpuBackend<P> {
    fn framebuffer_size(&self) -> (u32, u32) {
        self.provider.framebuffer_size()
    }

    fn image_count(&self) -> usize {
        self.bundle.image_count()
    }

    fn extent(&self) -> (u32, u32) {
        let extent = self.bundle.extent();
        (extent.width, extent.height)
    }

    fn wait_slot(&mut self, slot: usize) -> Result<()> {
        unsafe { self.scene.sync().get(slot).wait(self.ctx.device()) }
    }

    fn acquire(&mut self, slot: usize) -> Result<(usize, bool)> {
        let semaphore = self.scene.sync().get(slot).image_available;
        let (image, suboptimal) =
            unsafe { self.bundle.swapchain().acquire_next_image(&self.ctx, semaphore) }?;
        Ok((image as usize, suboptimal))
    }

    fn write_uniforms(&mut self, image: usize, ubo: &UniformBufferObject) -> Result<()> {
        unsafe {
            self.bundle
                .uniform_buffer(image)
                .upload_host(&self.ctx, std::slice::from_ref(ubo))
        }
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        unsafe { self.scene.sync().get(slot).reset(self.ctx.device()) }
    }

    fn submit(&mut self, slot: usize, image: usize) -> Result<()> {
        let sync = self.scene.sync().get(slot);
        unsafe {
            submit_command_buffers(
                self.ctx.device(),
                self.ctx.graphics_queue(),
                &[self.bundle.command_buffer(image)],
                &[sync.image_available],
                &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
                &[sync.render_finished],
                sync.in_flight,
            )
        }
    }

    fn present(&mut self, slot: usize, image: usize) -> Result<()> {
        let render_finished = self.scene.sync().get(slot).render_finished;
        unsafe {
            self.bundle
                .swapchain()
                .present(&self.ctx, image as u32, render_finished)
        }
    }

    fn rebuild(&mut self) -> Result<()> {
        self.ctx.wait_idle()?;
        unsafe {
            self.bundle.release(&self.ctx, &self.scene);
            self.bundle = SwapchainBundle::new(
                &self.ctx,
                &self.scene,
                self.provider.framebuffer_size(),
                self.vsync,
            )?;
        }
        Ok(())
    }
}

impl<P: SurfaceProvider> Drop for GpuBackend<P> {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.wait_idle() {
            tracing::error!("Failed to wait idle: {e}");
        }
        unsafe {
            self.bundle.release(&self.ctx, &self.scene);
            self.scene.destroy(&self.ctx);
        }
        tracing::debug!("Renderer resources destroyed");
    }
}

/// Draws the scene to the provider's surface.
pub struct Renderer<P: SurfaceProvider> {
    frames: FrameLoop,
    backend: GpuBackend<P>,
}

impl<P: SurfaceProvider> Renderer<P> {
    /// Open the device, upload the scene and build the first swapchain.
    ///
    /// A zero-sized framebuffer defers the swapchain to the first draw.
    pub fn new(
        provider: P,
        gpu: GpuContextBuilder,
        scene: SceneData,
        options: RenderOptions,
    ) -> Result<Self> {
        let ctx = gpu.build(&provider)?;
        let frames_in_flight = options.frames_in_flight.max(1);
        let mut scene = unsafe { SceneResources::new(&ctx, scene, frames_in_flight) }?;

        let (width, height) = provider.framebuffer_size();
        let bundle = if width == 0 || height == 0 {
            SwapchainBundle::default()
        } else {
            match unsafe { SwapchainBundle::new(&ctx, &scene, (width, height), options.vsync) } {
                Ok(bundle) => bundle,
                Err(e) => {
                    unsafe { scene.destroy(&ctx) };
                    return Err(e);
                }
            }
        };

        let mut frames = FrameLoop::new(frames_in_flight, bundle.image_count(), Camera::default());
        if bundle.image_count() == 0 {
            frames.notify_resized();
        }

        Ok(Self {
            frames,
            backend: GpuBackend {
                scene,
                bundle,
                ctx,
                provider,
                vsync: options.vsync,
            },
        })
    }

    /// Run one iteration of the drawing protocol.
    pub fn draw_frame(&mut self) -> Result<FrameStatus> {
        self.frames.draw_frame(&mut self.backend, Instant::now())
    }

    /// Rebuild the swapchain before the next frame.
    pub fn notify_resized(&mut self) {
        self.frames.notify_resized();
    }

    pub fn stats(&self) -> FrameStats {
        self.frames.stats()
    }

    pub fn backend(&self) -> &GpuBackend<P> {
        &self.backend
    }

    pub fn provider(&self) -> &P {
        self.backend.provider()
    }
}
