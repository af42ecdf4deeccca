// Fatal initialization errors
//
// Raised through `anyhow` at the point of detection; `main` reports them
// and exits with a failure status.

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("validation layers requested, but not available: {0:?}")]
    MissingLayers(Vec<String>),
    #[error("failed to create {what}: {result}")]
    Creation {
        what: &'static str,
        result: vk::Result,
    },
    #[error("failed to find GPUs with Vulkan support")]
    NoDevices,
    #[error("no Vulkan device meets the requirements")]
    NoSuitableDevice,
    #[error("no Vulkan surface extension for this display server")]
    UnsupportedPlatform,
}
