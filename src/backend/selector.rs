// Physical device selection and layer support checks
//
// Responsibilities:
// - Find a queue family with the capabilities we need
// - Pick the first GPU that passes the suitability checks
// - Verify the requested validation layers are installed
//
// The Vulkan queries sit behind two small traits so the selection rules can
// run against fake devices in tests. ash already does the count-then-fetch
// dance for every enumeration used here.

use super::error::InitError;
use crate::config::Config;
use anyhow::{Context, Result};
use ash::vk;
use std::ffi::c_char;

/// Instance-level layer enumeration (`vkEnumerateInstanceLayerProperties`)
pub trait InstanceLayers {
    fn available_layers(&self) -> Result<Vec<String>>;
}

/// Physical device queries made through an instance
pub trait PhysicalDevices {
    fn physical_devices(&self) -> Result<Vec<vk::PhysicalDevice>>;
    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties>;
    fn properties(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties;
    fn features(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures;
}

impl InstanceLayers for ash::Entry {
    fn available_layers(&self) -> Result<Vec<String>> {
        let layers = self
            .enumerate_instance_layer_properties()
            .context("Failed to enumerate instance layers")?;

        Ok(layers.iter().map(|layer| fixed_str(&layer.layer_name)).collect())
    }
}

/// An already enumerated layer list
impl InstanceLayers for Vec<String> {
    fn available_layers(&self) -> Result<Vec<String>> {
        Ok(self.clone())
    }
}

impl PhysicalDevices for ash::Instance {
    fn physical_devices(&self) -> Result<Vec<vk::PhysicalDevice>> {
        unsafe { self.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")
    }

    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe { self.get_physical_device_queue_family_properties(device) }
    }

    fn properties(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        unsafe { self.get_physical_device_properties(device) }
    }

    fn features(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        unsafe { self.get_physical_device_features(device) }
    }
}

/// Read a NUL-terminated name out of a fixed-size Vulkan char array.
pub fn fixed_str(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Check that every required layer is available. Names must match exactly;
/// stops at the first missing one.
pub fn check_validation_layer_support(
    api: &impl InstanceLayers,
    required: &[String],
) -> Result<bool> {
    let available = api.available_layers()?;

    for name in required {
        if !available.iter().any(|layer| layer == name) {
            log::warn!("Validation layer {} is not installed", name);
            return Ok(false);
        }
    }

    Ok(true)
}

/// All required layers that are not available, in request order.
pub fn missing_layers(api: &impl InstanceLayers, required: &[String]) -> Result<Vec<String>> {
    let available = api.available_layers()?;

    Ok(required
        .iter()
        .filter(|name| !available.contains(*name))
        .cloned()
        .collect())
}

/// Fail with `InitError::MissingLayers` unless every required layer is
/// available. The driver is asked for its layer list once.
pub fn ensure_layers(api: &impl InstanceLayers, required: &[String]) -> Result<()> {
    let available = api.available_layers()?;

    if !check_validation_layer_support(&available, required)? {
        anyhow::bail!(InitError::MissingLayers(missing_layers(&available, required)?));
    }

    Ok(())
}

/// Result of a queue family scan. `None` means no family qualified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub family: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.family.is_some()
    }
}

/// Hard requirements a GPU has to meet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceRequirements {
    pub queue_flags: vk::QueueFlags,
    pub require_discrete_gpu: bool,
    pub require_geometry_shader: bool,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self {
            queue_flags: vk::QueueFlags::GRAPHICS,
            require_discrete_gpu: false,
            require_geometry_shader: false,
        }
    }
}

impl DeviceRequirements {
    pub fn from_config(config: &Config) -> Self {
        Self {
            queue_flags: config.queue_flags(),
            require_discrete_gpu: config.device.require_discrete_gpu,
            require_geometry_shader: config.device.require_geometry_shader,
        }
    }
}

/// Everything a custom predicate gets to look at.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub device: vk::PhysicalDevice,
    pub name: String,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub queue_family: u32,
}

/// The GPU we settled on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedDevice {
    pub physical_device: vk::PhysicalDevice,
    pub name: String,
    pub queue_family: u32,
}

type Predicate<'p> = Box<dyn Fn(&DeviceCandidate) -> bool + 'p>;

/// First-match GPU selection. No scoring: the first device (in driver
/// enumeration order) that passes every check wins.
pub struct DeviceSelector<'p> {
    requirements: DeviceRequirements,
    predicate: Option<Predicate<'p>>,
}

impl<'p> DeviceSelector<'p> {
    pub fn new(requirements: DeviceRequirements) -> Self {
        Self {
            requirements,
            predicate: None,
        }
    }

    /// Extra suitability check, applied after the built-in ones.
    pub fn with_predicate(mut self, predicate: impl Fn(&DeviceCandidate) -> bool + 'p) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    pub fn requirements(&self) -> &DeviceRequirements {
        &self.requirements
    }

    /// Lowest-indexed queue family with at least one queue and all the
    /// required capability flags.
    pub fn find_queue_families(
        &self,
        api: &impl PhysicalDevices,
        device: vk::PhysicalDevice,
    ) -> QueueFamilyIndices {
        let family = api
            .queue_families(device)
            .iter()
            .position(|family| {
                family.queue_count > 0 && family.queue_flags.contains(self.requirements.queue_flags)
            })
            .map(|index| index as u32);

        QueueFamilyIndices { family }
    }

    pub fn is_device_suitable(
        &self,
        api: &impl PhysicalDevices,
        device: vk::PhysicalDevice,
    ) -> bool {
        self.evaluate(api, device).is_some()
    }

    /// Enumerate GPUs and keep the first suitable one.
    pub fn pick_physical_device(&self, api: &impl PhysicalDevices) -> Result<SelectedDevice> {
        let devices = api.physical_devices()?;

        if devices.is_empty() {
            anyhow::bail!(InitError::NoDevices);
        }

        log::debug!("Found {} physical device(s)", devices.len());

        for device in devices {
            if let Some(selected) = self.evaluate(api, device) {
                log::info!(
                    "Selected GPU: {} (queue family {})",
                    selected.name,
                    selected.queue_family
                );
                return Ok(selected);
            }
        }

        anyhow::bail!(InitError::NoSuitableDevice)
    }

    fn evaluate(
        &self,
        api: &impl PhysicalDevices,
        device: vk::PhysicalDevice,
    ) -> Option<SelectedDevice> {
        let Some(queue_family) = self.find_queue_families(api, device).family else {
            log::debug!(
                "Skipping {:?}: no queue family supports {:?}",
                device,
                self.requirements.queue_flags
            );
            return None;
        };

        let properties = api.properties(device);
        let features = api.features(device);
        let candidate = DeviceCandidate {
            device,
            name: fixed_str(&properties.device_name),
            properties,
            features,
            queue_family,
        };

        if self.requirements.require_discrete_gpu
            && properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU
        {
            log::debug!("Skipping {}: not a discrete GPU", candidate.name);
            return None;
        }

        if self.requirements.require_geometry_shader && features.geometry_shader != vk::TRUE {
            log::debug!("Skipping {}: no geometry shader support", candidate.name);
            return None;
        }

        if let Some(predicate) = &self.predicate {
            if !predicate(&candidate) {
                log::debug!("Skipping {}: rejected by custom check", candidate.name);
                return None;
            }
        }

        Some(SelectedDevice {
            physical_device: device,
            name: candidate.name,
            queue_family,
        })
    }
}
