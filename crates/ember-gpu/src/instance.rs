//! Vulkan instance creation.

use std::ffi::{c_char, CStr, CString};

use ash::vk;

use crate::debug::{messenger_create_info, DiagnosticSink};
use crate::error::{GpuError, Result};

/// Diagnostic layer enabled when validation is requested.
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance extensions needed on top of what the surface provider asks for.
pub fn extra_instance_extensions(enable_validation: bool) -> Vec<*const c_char> {
    let mut extensions = Vec::new();
    if enable_validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    #[cfg(target_os = "macos")]
    {
        extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
        extensions.push(ash::khr::get_physical_device_properties2::NAME.as_ptr());
    }
    extensions
}

/// Whether `layer` is in the list of available layers.
pub fn layer_available(available: &[vk::LayerProperties], layer: &CStr) -> bool {
    available.iter().any(|props| {
        props
            .layer_name_as_c_str()
            .is_ok_and(|name| name == layer)
    })
}

/// Create a Vulkan instance.
///
/// With a diagnostic sink, the validation layer must be present and the
/// messenger create-info is chained so instance creation is covered too.
///
/// # Safety
/// The entry must be a valid Vulkan entry point, and `sink` must outlive the instance.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    surface_extensions: &[*const c_char],
    sink: Option<&DiagnosticSink>,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::Initialization(format!("invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(c"Ember")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_0);

    let enable_validation = sink.is_some();

    let mut extension_names = surface_extensions.to_vec();
    extension_names.extend(extra_instance_extensions(enable_validation));

    let layer_names: Vec<*const c_char> = if enable_validation {
        let available = entry
            .enumerate_instance_layer_properties()
            .map_err(|e| GpuError::Initialization(format!("layer enumeration: {e}")))?;
        if !layer_available(&available, VALIDATION_LAYER) {
            return Err(GpuError::Initialization(format!(
                "requested layer {} is not available",
                VALIDATION_LAYER.to_string_lossy()
            )));
        }
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let mut create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let mut debug_info = sink.map(messenger_create_info);
    if let Some(debug_info) = debug_info.as_mut() {
        create_info = create_info.push_next(debug_info);
    }

    let instance = entry
        .create_instance(&create_info, None)
        .map_err(|e| GpuError::Initialization(format!("instance creation: {e}")))?;

    tracing::debug!(
        "Instance created ({} extensions, validation: {})",
        extension_names.len(),
        enable_validation
    );

    Ok(instance)
}
