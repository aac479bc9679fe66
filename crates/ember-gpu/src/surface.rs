//! Presentation surface.
//!
//! The windowing layer stays outside this crate: anything that can create a
//! native surface and report its framebuffer size implements [`SurfaceProvider`].

use std::ffi::c_char;

use ash::vk;

use crate::error::{GpuError, Result};

/// Windowing collaborator that owns the native window.
pub trait SurfaceProvider {
    /// Instance extensions required to create the native surface.
    fn required_extensions(&self) -> Result<Vec<*const c_char>>;

    /// Create a surface bound to `instance`.
    ///
    /// # Safety
    /// The entry and instance must be valid and the instance must have been
    /// created with [`SurfaceProvider::required_extensions`] enabled.
    unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR>;

    /// Current framebuffer size in pixels. Either dimension is zero while minimized.
    fn framebuffer_size(&self) -> (u32, u32);
}

/// Vulkan surface and its extension loader.
pub struct SurfaceContext {
    /// The Vulkan surface handle.
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader.
    pub surface_loader: ash::khr::surface::Instance,
}

impl SurfaceContext {
    /// Create the surface through the provider.
    ///
    /// # Safety
    /// The entry and instance must be valid.
    pub unsafe fn new<P: SurfaceProvider + ?Sized>(
        entry: &ash::Entry,
        instance: &ash::Instance,
        provider: &P,
    ) -> Result<Self> {
        let surface = provider.create_surface(entry, instance)?;
        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        Ok(Self {
            surface,
            surface_loader,
        })
    }

    /// Query surface capabilities for an adapter.
    ///
    /// # Safety
    /// The physical device must belong to the instance the surface was created on.
    pub unsafe fn capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<SurfaceCapabilities> {
        let capabilities = self
            .surface_loader
            .get_physical_device_surface_capabilities(physical_device, self.surface)?;

        let formats = self
            .surface_loader
            .get_physical_device_surface_formats(physical_device, self.surface)?;

        let present_modes = self
            .surface_loader
            .get_physical_device_surface_present_modes(physical_device, self.surface)?;

        Ok(SurfaceCapabilities {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Whether a queue family of the adapter can present to this surface.
    ///
    /// # Safety
    /// The physical device must belong to the instance the surface was created on.
    pub unsafe fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<bool> {
        self.surface_loader
            .get_physical_device_surface_support(physical_device, queue_family, self.surface)
            .map_err(GpuError::from)
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// No swapchain may still reference the surface.
    pub unsafe fn destroy(&mut self) {
        if self.surface != vk::SurfaceKHR::null() {
            self.surface_loader.destroy_surface(self.surface, None);
            self.surface = vk::SurfaceKHR::null();
        }
    }
}

/// Surface capabilities query result.
pub struct SurfaceCapabilities {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceCapabilities {
    /// At least one format and one present mode are offered.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}
