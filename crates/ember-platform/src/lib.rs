//! Window creation and Vulkan surface provision via winit.

use std::ffi::c_char;
use std::sync::Arc;

use ash::vk;
use ember_gpu::{GpuError, SurfaceProvider};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use thiserror::Error;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Window creation failed: {0}")]
    WindowCreation(String),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Ember Viewer".to_string(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

/// A window that can host a Vulkan surface.
#[derive(Clone)]
pub struct WindowSurface {
    window: Arc<Window>,
}

impl WindowSurface {
    /// Open a window on the running event loop.
    pub fn create(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attributes = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(config.resizable);

        let window = event_loop
            .create_window(attributes)
            .map_err(|e| PlatformError::WindowCreation(e.to_string()))?;

        tracing::info!(
            "Window created: {} ({}x{})",
            config.title,
            config.width,
            config.height
        );

        Ok(Self {
            window: Arc::new(window),
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

impl SurfaceProvider for WindowSurface {
    fn required_extensions(&self) -> ember_gpu::Result<Vec<*const c_char>> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| GpuError::Initialization(format!("display handle: {e}")))?;
        let extensions = ash_window::enumerate_required_extensions(display.as_raw())?;
        Ok(extensions.to_vec())
    }

    unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> ember_gpu::Result<vk::SurfaceKHR> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| GpuError::Initialization(format!("display handle: {e}")))?;
        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| GpuError::Initialization(format!("window handle: {e}")))?;

        ash_window::create_surface(
            entry,
            instance,
            display.as_raw(),
            window_handle.as_raw(),
            None,
        )
        .map_err(GpuError::creation("surface"))
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_is_resizable_800_by_600() {
        let config = WindowConfig::default();
        assert_eq!((config.width, config.height), (800, 600));
        assert!(config.resizable);
        assert_eq!(config.title, "Ember Viewer");
    }
}
