//! GPU context management.

use std::ffi::c_char;

use ash::vk;

use crate::adapter::{required_device_extensions, select_adapter, AdapterInfo, QueueFamilyIndices};
use crate::debug::{tracing_sink, DebugMessenger, DiagnosticSink};
use crate::error::{GpuError, Result};
use crate::instance::create_instance;
use crate::surface::{SurfaceContext, SurfaceProvider};

/// Driver connection, chosen adapter, logical device and its queues.
///
/// Everything created from the device borrows this context; it is destroyed last.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
    debug: Option<DebugMessenger>,
    // Referenced by the messenger until the instance is gone. Boxed so the
    // address stays fixed when the context moves.
    #[allow(dead_code)]
    sink: Option<Box<DiagnosticSink>>,
    surface: SurfaceContext,
    physical_device: vk::PhysicalDevice,
    adapter: AdapterInfo,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    device: ash::Device,
    swapchain_loader: ash::khr::swapchain::Device,
    queue_families: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    anisotropy_enabled: bool,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Properties of the selected adapter.
    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    /// Memory types and heaps of the selected adapter.
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// The presentation surface.
    pub fn surface(&self) -> &SurfaceContext {
        &self.surface
    }

    /// Swapchain extension loader.
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    /// Graphics and present queue family indices.
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the present queue. May be the same queue as graphics.
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Maximum sampler anisotropy, or `None` when the feature is not enabled.
    pub fn max_anisotropy(&self) -> Option<f32> {
        self.anisotropy_enabled
            .then_some(self.adapter.max_sampler_anisotropy)
    }

    /// Format capabilities of the adapter.
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            self.surface.destroy();
            if let Some(debug) = self.debug.as_mut() {
                debug.destroy();
            }
            self.instance.destroy_instance(None);
        }
        tracing::debug!("GPU context destroyed");
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
    sink: Option<DiagnosticSink>,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Ember".to_string(),
            enable_validation: cfg!(debug_assertions),
            sink: None,
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable the validation layer and debug messenger.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Receive driver diagnostics here instead of through `tracing`.
    pub fn diagnostic_sink(mut self, sink: DiagnosticSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Open the driver, select an adapter able to present to the provider's
    /// surface and create the logical device.
    pub fn build<P: SurfaceProvider + ?Sized>(self, provider: &P) -> Result<GpuContext> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Initialization(format!("failed to load Vulkan: {e}")))?;

        let surface_extensions = provider.required_extensions()?;

        let sink: Option<Box<DiagnosticSink>> = self
            .enable_validation
            .then(|| Box::new(self.sink.unwrap_or_else(tracing_sink)));

        let instance = unsafe {
            create_instance(
                &entry,
                &self.app_name,
                &surface_extensions,
                sink.as_deref(),
            )
        }?;

        let mut debug = match sink.as_deref() {
            Some(sink) => match unsafe { DebugMessenger::new(&entry, &instance, sink) } {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            },
            None => None,
        };

        let mut surface = match unsafe { SurfaceContext::new(&entry, &instance, provider) } {
            Ok(surface) => surface,
            Err(e) => {
                unsafe { abandon_instance(&instance, debug.as_mut(), None) };
                return Err(e);
            }
        };

        let opened = unsafe { open_device(&instance, &surface) };
        let (physical_device, adapter, device, queue_families) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                unsafe { abandon_instance(&instance, debug.as_mut(), Some(&mut surface)) };
                return Err(e);
            }
        };

        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };
        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);

        let anisotropy_enabled = adapter.sampler_anisotropy;
        if !anisotropy_enabled {
            tracing::warn!("{} lacks sampler anisotropy; textures use plain filtering", adapter.name);
        }

        tracing::info!("Selected GPU: {} (score {})", adapter.summary(), adapter.score());

        Ok(GpuContext {
            entry,
            instance,
            debug,
            sink,
            surface,
            physical_device,
            adapter,
            memory_properties,
            device,
            swapchain_loader,
            queue_families,
            graphics_queue,
            present_queue,
            anisotropy_enabled,
        })
    }
}

/// Tear down what was created before a build step failed.
unsafe fn abandon_instance(
    instance: &ash::Instance,
    debug: Option<&mut DebugMessenger>,
    surface: Option<&mut SurfaceContext>,
) {
    if let Some(surface) = surface {
        surface.destroy();
    }
    if let Some(debug) = debug {
        debug.destroy();
    }
    instance.destroy_instance(None);
}

/// Pick the adapter and create the logical device on it.
///
/// # Safety
/// The instance and surface must be valid.
unsafe fn open_device(
    instance: &ash::Instance,
    surface: &SurfaceContext,
) -> Result<(vk::PhysicalDevice, AdapterInfo, ash::Device, QueueFamilyIndices)> {
    let (physical_device, adapter) = select_adapter(instance, surface)?;
    let queue_families = adapter
        .queue_families
        .ok_or(GpuError::NoSuitableAdapter)?;

    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extension_names: Vec<*const c_char> = required_device_extensions()
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    let features =
        vk::PhysicalDeviceFeatures::default().sampler_anisotropy(adapter.sampler_anisotropy);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device = instance
        .create_device(physical_device, &device_create_info, None)
        .map_err(GpuError::creation("logical device"))?;

    Ok((physical_device, adapter, device, queue_families))
}
