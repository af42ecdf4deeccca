// Logical device - the interface to the chosen GPU
//
// One queue from the selected family, no optional features, no device
// extensions. Validation layers are passed along too so older drivers that
// still honour device layers get the same checks.

use super::error::InitError;
use super::handle::Scoped;
use super::instance::{layer_names, Instance};
use super::selector::SelectedDevice;
use crate::config::Config;
use anyhow::Result;
use ash::vk;
use std::ffi::c_char;
use std::marker::PhantomData;
use std::ptr;

/// Logical device with automatic cleanup. Tied to the instance it was
/// created from, so it can never outlive it.
pub struct LogicalDevice<'i> {
    handle: Scoped<'i, vk::Device>,
    pub loader: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    queue_family: u32,
    // Implicitly destroyed together with the device
    queue: vk::Queue,
    _instance: PhantomData<&'i Instance>,
}

impl<'i> LogicalDevice<'i> {
    pub fn new(
        instance: &'i Instance,
        selected: &SelectedDevice,
        config: &Config,
        enable_validation: bool,
    ) -> Result<Self> {
        let queue_priorities = [config.queue_priority()];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(selected.queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let features = vk::PhysicalDeviceFeatures::default();

        let layers = if enable_validation {
            layer_names(&config.debug.layers)?
        } else {
            Vec::new()
        };
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_features(&features)
            .enabled_layer_names(&layer_ptrs);

        let loader = unsafe {
            instance
                .loader
                .create_device(selected.physical_device, &create_info, None)
        }
        .map_err(|result| InitError::Creation {
            what: "logical device",
            result,
        })?;

        let destroy_device = loader.fp_v1_0().destroy_device;
        let mut handle = Scoped::with_release(move |device| {
            log::debug!("Destroying logical device {:?}", device);
            unsafe { destroy_device(device, ptr::null()) }
        });
        handle.set(loader.handle());

        let queue = unsafe { loader.get_device_queue(selected.queue_family, 0) };

        log::info!(
            "Created logical device on {} (queue family {})",
            selected.name,
            selected.queue_family
        );

        Ok(Self {
            handle,
            loader,
            physical_device: selected.physical_device,
            queue_family: selected.queue_family,
            queue,
            _instance: PhantomData,
        })
    }

    /// Parent handle for device-level children
    pub fn handle(&self) -> &Scoped<'i, vk::Device> {
        &self.handle
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.loader.device_wait_idle() }?;
        Ok(())
    }
}
