//! Driver diagnostics routed to a user-supplied sink.

use std::borrow::Cow;
use std::ffi::{c_void, CStr};

use ash::vk;

use crate::error::{GpuError, Result};

/// Severity of a driver diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Verbose,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Highest severity present in the flags.
    pub fn from_flags(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            Self::Error
        } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            Self::Warning
        } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            Self::Info
        } else {
            Self::Verbose
        }
    }
}

/// Category of a driver diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    General,
    Validation,
    Performance,
}

impl MessageType {
    /// Most specific category present in the flags.
    pub fn from_flags(flags: vk::DebugUtilsMessageTypeFlagsEXT) -> Self {
        if flags.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
            Self::Validation
        } else if flags.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
            Self::Performance
        } else {
            Self::General
        }
    }
}

/// Callable receiving every forwarded diagnostic.
pub type DiagnosticSink = Box<dyn Fn(Severity, MessageType, &str) + Send + Sync>;

/// Sink that writes diagnostics to `tracing`.
pub fn tracing_sink() -> DiagnosticSink {
    Box::new(|severity, kind, message| match severity {
        Severity::Verbose => tracing::debug!(?kind, "{message}"),
        Severity::Info => tracing::info!(?kind, "{message}"),
        Severity::Warning => tracing::warn!(?kind, "{message}"),
        Severity::Error => tracing::error!(?kind, "{message}"),
    })
}

/// Messenger create-info forwarding verbose, warning and error messages of every type.
///
/// `sink` must stay at the same address for as long as the messenger (or the
/// instance it is chained into) exists.
pub fn messenger_create_info(sink: &DiagnosticSink) -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(forward_message))
        .user_data(std::ptr::from_ref(sink).cast_mut().cast())
}

unsafe extern "system" fn forward_message(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || user_data.is_null() {
        return vk::FALSE;
    }

    // SAFETY: the driver passes valid callback data, and user_data is the sink
    // registered in `messenger_create_info`.
    let (message, sink) = unsafe {
        let data = &*callback_data;
        let message = if data.p_message.is_null() {
            Cow::Borrowed("")
        } else {
            CStr::from_ptr(data.p_message).to_string_lossy()
        };
        (message, &*user_data.cast::<DiagnosticSink>())
    };

    sink(
        Severity::from_flags(severity),
        MessageType::from_flags(message_type),
        &message,
    );

    vk::FALSE
}

/// Installed debug messenger.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    /// Install a messenger on the instance.
    ///
    /// # Safety
    /// The entry and instance must be valid, the instance must have
    /// `VK_EXT_debug_utils` enabled and `sink` must not move or drop before
    /// the instance is destroyed.
    pub unsafe fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        sink: &DiagnosticSink,
    ) -> Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let create_info = messenger_create_info(sink);

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .map_err(|e| GpuError::Initialization(format!("debug messenger: {e}")))?;

        Ok(Self { loader, messenger })
    }

    /// Remove the messenger.
    ///
    /// # Safety
    /// Must be called before the instance is destroyed.
    pub unsafe fn destroy(&mut self) {
        if self.messenger != vk::DebugUtilsMessengerEXT::null() {
            unsafe {
                self.loader
                    .destroy_debug_utils_messenger(self.messenger, None);
            }
            self.messenger = vk::DebugUtilsMessengerEXT::null();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn severity_picks_highest_bit() {
        let flags = vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
        assert_eq!(Severity::from_flags(flags), Severity::Error);
        assert_eq!(
            Severity::from_flags(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE),
            Severity::Verbose
        );
    }

    #[test]
    fn message_type_prefers_validation() {
        let flags =
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION;
        assert_eq!(MessageType::from_flags(flags), MessageType::Validation);
        assert_eq!(
            MessageType::from_flags(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE),
            MessageType::Performance
        );
    }

    #[test]
    fn callback_forwards_to_sink() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&received);
        let sink: DiagnosticSink = Box::new(move |severity, kind, message| {
            captured
                .lock()
                .unwrap()
                .push((severity, kind, message.to_owned()));
        });

        let create_info = messenger_create_info(&sink);
        let text = c"vkCreateBuffer: size is zero";
        let data = vk::DebugUtilsMessengerCallbackDataEXT::default().message(text);

        let callback = create_info.pfn_user_callback.unwrap();
        let result = unsafe {
            callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                create_info.p_user_data,
            )
        };

        assert_eq!(result, vk::FALSE);
        let received = received.lock().unwrap();
        assert_eq!(
            received.as_slice(),
            &[(
                Severity::Error,
                MessageType::Validation,
                "vkCreateBuffer: size is zero".to_owned()
            )]
        );
    }
}
