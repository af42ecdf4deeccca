// Vulkan instance and debug messenger
//
// Responsibilities:
// - Work out which instance extensions the window system needs
// - Instance creation with (optional) validation layers
// - Debug messenger that forwards validation output to the log

use super::error::InitError;
use super::handle::Scoped;
use super::selector::{ensure_layers, fixed_str};
use crate::config::Config;
use anyhow::{Context, Result};
use ash::extensions::{ext, khr};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};
use std::ptr;

/// Instance extensions needed to present to `display`, plus debug utils
/// when validation is on.
pub fn required_extensions(
    display: RawDisplayHandle,
    enable_validation: bool,
) -> Result<Vec<&'static CStr>> {
    let platform_surface = match display {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        RawDisplayHandle::Android(_) => khr::AndroidSurface::name(),
        RawDisplayHandle::AppKit(_) | RawDisplayHandle::UiKit(_) => ext::MetalSurface::name(),
        _ => anyhow::bail!(InitError::UnsupportedPlatform),
    };

    let mut extensions = vec![khr::Surface::name(), platform_surface];

    if enable_validation {
        extensions.push(ext::DebugUtils::name());
    }

    Ok(extensions)
}

/// Owned copies of layer names, ready to be turned into pointers
pub(crate) fn layer_names(names: &[String]) -> Result<Vec<CString>> {
    names
        .iter()
        .map(|name| {
            CString::new(name.as_str()).with_context(|| format!("Invalid layer name {:?}", name))
        })
        .collect()
}

/// The Vulkan instance: raw handle (destroyed on drop) plus the function
/// table used to make instance-level calls.
pub struct Instance {
    handle: Scoped<'static, vk::Instance>,
    pub loader: ash::Instance,
}

impl Instance {
    pub fn new(
        entry: &ash::Entry,
        config: &Config,
        display: RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<Self> {
        if enable_validation {
            ensure_layers(entry, &config.debug.layers)?;
        }

        if cfg!(debug_assertions) && config.debug.list_extensions {
            log_available_extensions(entry);
        }

        let app_name = CString::new(config.application.name.as_str())?;
        let engine_name = CString::new(config.application.engine_name.as_str())?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let extensions: Vec<*const c_char> = required_extensions(display, enable_validation)?
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let layers = if enable_validation {
            layer_names(&config.debug.layers)?
        } else {
            Vec::new()
        };
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_ptrs);

        let loader = unsafe { entry.create_instance(&create_info, None) }.map_err(|result| {
            InitError::Creation {
                what: "instance",
                result,
            }
        })?;

        let destroy_instance = loader.fp_v1_0().destroy_instance;
        let mut handle = Scoped::with_release(move |instance| {
            log::debug!("Destroying instance {:?}", instance);
            unsafe { destroy_instance(instance, ptr::null()) }
        });
        handle.set(loader.handle());

        log::info!(
            "Created Vulkan instance ({} extension(s), {} layer(s))",
            extensions.len(),
            layer_ptrs.len()
        );

        Ok(Self { handle, loader })
    }

    /// Parent handle for instance-level children
    pub fn handle(&self) -> &Scoped<'static, vk::Instance> {
        &self.handle
    }
}

fn log_available_extensions(entry: &ash::Entry) {
    match entry.enumerate_instance_extension_properties(None) {
        Ok(extensions) => {
            log::debug!("Available instance extensions:");
            for extension in &extensions {
                log::debug!("\t{}", fixed_str(&extension.extension_name));
            }
        }
        Err(e) => log::warn!("Could not list instance extensions: {}", e),
    }
}

/// Validation output routed into the log. Borrows the instance, so it is
/// always destroyed first.
pub struct DebugMessenger<'i> {
    handle: Scoped<'i, vk::DebugUtilsMessengerEXT>,
}

impl<'i> DebugMessenger<'i> {
    pub fn new(entry: &ash::Entry, instance: &'i Instance) -> Result<Self> {
        let debug_utils = ext::DebugUtils::new(entry, &instance.loader);
        let create_messenger = debug_utils.fp().create_debug_utils_messenger_ext;
        let destroy_messenger = debug_utils.fp().destroy_debug_utils_messenger_ext;

        let mut handle = Scoped::with_context(instance.handle(), move |instance, messenger| {
            log::debug!("Destroying debug messenger {:?}", messenger);
            unsafe { destroy_messenger(instance, messenger, ptr::null()) }
        });

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let result = unsafe {
            create_messenger(
                instance.handle().get(),
                &*create_info,
                ptr::null(),
                handle.release_and_get_slot(),
            )
        };

        if result != vk::Result::SUCCESS {
            anyhow::bail!(InitError::Creation {
                what: "debug messenger",
                result,
            });
        }

        log::info!("Validation layers enabled");
        Ok(Self { handle })
    }

    pub fn handle(&self) -> vk::DebugUtilsMessengerEXT {
        self.handle.get()
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("validation layer: {}", message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("validation layer: {}", message);
        }
        _ => {
            log::debug!("validation layer: {}", message);
        }
    }

    vk::FALSE
}
