//! Physical adapter inspection, scoring and selection.

use std::ffi::CStr;

use ash::vk;

use crate::error::{GpuError, Result};
use crate::surface::{SurfaceCapabilities, SurfaceContext};

/// Device extensions every adapter must offer.
pub fn required_device_extensions() -> [&'static CStr; 1] {
    [ash::khr::swapchain::NAME]
}

/// Queue families used for drawing and presenting. They may be the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Pick the first graphics family and a family that can present.
    ///
    /// A graphics family that also presents is preferred so both queues alias.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> bool,
    ) -> Option<Self> {
        let mut graphics = None;
        let mut present = None;

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            let is_graphics = family.queue_count > 0
                && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let can_present = supports_present(index);

            if is_graphics && can_present {
                return Some(Self {
                    graphics: index,
                    present: index,
                });
            }
            if is_graphics && graphics.is_none() {
                graphics = Some(index);
            }
            if can_present && present.is_none() {
                present = Some(index);
            }
        }

        Some(Self {
            graphics: graphics?,
            present: present?,
        })
    }

    /// Distinct families, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Everything adapter selection needs to know about one physical device.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub max_image_dimension_2d: u32,
    pub max_sampler_anisotropy: f32,
    pub geometry_shader: bool,
    pub sampler_anisotropy: bool,
    pub has_required_extensions: bool,
    pub queue_families: Option<QueueFamilyIndices>,
    /// The surface offers at least one format and one present mode.
    pub surface_adequate: bool,
}

impl AdapterInfo {
    /// Query an adapter against the surface it must present to.
    ///
    /// A failed query marks the adapter unsuitable instead of failing selection.
    ///
    /// # Safety
    /// The physical device and surface must belong to `instance`.
    pub unsafe fn query(
        instance: &ash::Instance,
        surface: &SurfaceContext,
        physical_device: vk::PhysicalDevice,
    ) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let features = instance.get_physical_device_features(physical_device);

        let name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        let has_required_extensions = offers_required_extensions(
            &name,
            instance.enumerate_device_extension_properties(physical_device),
        );

        let families = instance.get_physical_device_queue_family_properties(physical_device);
        let mut present_error = None;
        let queue_families = QueueFamilyIndices::find(&families, |index| {
            surface
                .supports_present(physical_device, index)
                .unwrap_or_else(|e| {
                    present_error.get_or_insert(e);
                    false
                })
        });
        if let Some(e) = present_error {
            tracing::warn!("{name}: present support query failed: {e}");
        }

        let surface_adequate =
            has_required_extensions && surface_is_adequate(&name, surface.capabilities(physical_device));

        Self {
            name,
            device_type: properties.device_type,
            api_version: properties.api_version,
            max_image_dimension_2d: properties.limits.max_image_dimension2_d,
            max_sampler_anisotropy: properties.limits.max_sampler_anisotropy,
            geometry_shader: features.geometry_shader == vk::TRUE,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            has_required_extensions,
            queue_families,
            surface_adequate,
        }
    }

    /// Suitability score. Zero means the adapter cannot be used.
    pub fn score(&self) -> u64 {
        if !self.geometry_shader
            || !self.has_required_extensions
            || !self.surface_adequate
            || self.queue_families.is_none()
        {
            return 0;
        }

        let mut score = 10;
        if self.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += 1000;
        }
        score + u64::from(self.max_image_dimension_2d)
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, Vulkan {}.{}.{})",
            self.name,
            self.device_type,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
        )
    }
}

/// Whether the extension list contains every required device extension.
fn offers_required_extensions(
    adapter: &str,
    available: ash::prelude::VkResult<Vec<vk::ExtensionProperties>>,
) -> bool {
    match available {
        Ok(available) => required_device_extensions().iter().all(|required| {
            available
                .iter()
                .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == *required))
        }),
        Err(e) => {
            tracing::warn!("{adapter}: extension query failed: {e}");
            false
        }
    }
}

/// Whether the surface query succeeded with at least one format and present mode.
fn surface_is_adequate(adapter: &str, capabilities: Result<SurfaceCapabilities>) -> bool {
    match capabilities {
        Ok(caps) => caps.is_adequate(),
        Err(e) => {
            tracing::warn!("{adapter}: surface capability query failed: {e}");
            false
        }
    }
}

/// Highest non-zero score; the first candidate wins ties.
pub fn pick_best<T>(candidates: impl IntoIterator<Item = (T, u64)>) -> Option<T> {
    let mut best: Option<(T, u64)> = None;
    for (candidate, score) in candidates {
        if score == 0 {
            continue;
        }
        if best.as_ref().map_or(true, |(_, best_score)| score > *best_score) {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Select the best physical device for presenting to `surface`.
///
/// # Safety
/// The instance and surface must be valid.
pub unsafe fn select_adapter(
    instance: &ash::Instance,
    surface: &SurfaceContext,
) -> Result<(vk::PhysicalDevice, AdapterInfo)> {
    let devices = instance
        .enumerate_physical_devices()
        .map_err(|e| GpuError::Initialization(format!("adapter enumeration: {e}")))?;

    let mut candidates = Vec::with_capacity(devices.len());
    for device in devices {
        let info = AdapterInfo::query(instance, surface, device);
        let score = info.score();
        tracing::debug!("Adapter {} scored {}", info.summary(), score);
        candidates.push(((device, info), score));
    }

    pick_best(candidates).ok_or(GpuError::NoSuitableAdapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn suitable(device_type: vk::PhysicalDeviceType, max_dim: u32) -> AdapterInfo {
        AdapterInfo {
            name: "test".to_owned(),
            device_type,
            api_version: vk::API_VERSION_1_0,
            max_image_dimension_2d: max_dim,
            max_sampler_anisotropy: 16.0,
            geometry_shader: true,
            sampler_anisotropy: true,
            has_required_extensions: true,
            queue_families: Some(QueueFamilyIndices {
                graphics: 0,
                present: 0,
            }),
            surface_adequate: true,
        }
    }

    #[test]
    fn score_adds_discrete_bonus_and_image_dimension() {
        let discrete = suitable(vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        let integrated = suitable(vk::PhysicalDeviceType::INTEGRATED_GPU, 16384);
        assert_eq!(discrete.score(), 1000 + 10 + 8192);
        assert_eq!(integrated.score(), 10 + 16384);
        assert!(discrete.score() < integrated.score());
        let discrete_big = suitable(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        assert!(discrete_big.score() > integrated.score());
    }

    #[test]
    fn missing_requirements_eliminate_adapter() {
        let base = suitable(vk::PhysicalDeviceType::DISCRETE_GPU, 4096);

        let mut no_geometry = base.clone();
        no_geometry.geometry_shader = false;
        let mut no_swapchain = base.clone();
        no_swapchain.has_required_extensions = false;
        let mut no_surface = base.clone();
        no_surface.surface_adequate = false;
        let mut no_queues = base;
        no_queues.queue_families = None;

        for info in [no_geometry, no_swapchain, no_surface, no_queues] {
            assert_eq!(info.score(), 0);
        }
    }

    fn extension(name: &CStr) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, &src) in props.extension_name.iter_mut().zip(name.to_bytes()) {
            *dst = src as std::ffi::c_char;
        }
        props
    }

    fn capabilities(formats: usize, modes: usize) -> SurfaceCapabilities {
        SurfaceCapabilities {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default(); formats],
            present_modes: vec![vk::PresentModeKHR::FIFO; modes],
        }
    }

    #[test]
    fn failed_extension_query_marks_adapter_unsuitable() {
        assert!(offers_required_extensions(
            "gpu",
            Ok(vec![extension(c"VK_KHR_maintenance1"), extension(ash::khr::swapchain::NAME)])
        ));
        assert!(!offers_required_extensions("gpu", Ok(vec![extension(c"VK_KHR_maintenance1")])));
        assert!(!offers_required_extensions(
            "gpu",
            Err(vk::Result::ERROR_INITIALIZATION_FAILED)
        ));
    }

    #[test]
    fn failed_surface_query_marks_adapter_unsuitable() {
        assert!(surface_is_adequate("gpu", Ok(capabilities(2, 1))));
        assert!(!surface_is_adequate("gpu", Ok(capabilities(0, 1))));
        assert!(!surface_is_adequate("gpu", Ok(capabilities(2, 0))));
        assert!(!surface_is_adequate("gpu", Err(GpuError::DeviceLost)));
    }

    #[test]
    fn broken_adapter_does_not_block_the_others() {
        let mut broken = suitable(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        broken.surface_adequate = surface_is_adequate("broken", Err(GpuError::DeviceLost));
        let working = suitable(vk::PhysicalDeviceType::INTEGRATED_GPU, 4096);

        let candidates = [("broken", broken.score()), ("working", working.score())];
        assert_eq!(pick_best(candidates), Some("working"));
    }

    #[test]
    fn pick_best_skips_zero_and_keeps_first_tie() {
        assert_eq!(pick_best([("a", 0), ("b", 0)]), None);
        assert_eq!(pick_best([("a", 0), ("b", 5), ("c", 9), ("d", 9)]), Some("c"));
    }

    #[test]
    fn graphics_family_that_presents_is_shared() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let indices = QueueFamilyIndices::find(&families, |_| true).unwrap();
        assert_eq!(indices.graphics, 1);
        assert_eq!(indices.present, 1);
        assert_eq!(indices.unique(), vec![1]);
    }

    #[test]
    fn separate_present_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = QueueFamilyIndices::find(&families, |i| i == 1).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 0, present: 1 });
        assert_eq!(indices.unique(), vec![0, 1]);
    }

    #[test]
    fn incomplete_families_yield_none() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        assert!(QueueFamilyIndices::find(&families, |_| true).is_none());
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert!(QueueFamilyIndices::find(&families, |_| false).is_none());
    }
}
