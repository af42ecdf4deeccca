// Backend module - Vulkan setup layer
//
// Design: thin wrapper around ash. Every raw handle is owned by a `Scoped`
// and children borrow their parents, so teardown order is checked by the
// compiler.

pub mod device;
pub mod error;
pub mod handle;
pub mod instance;
pub mod selector;

pub use device::LogicalDevice;
pub use error::InitError;
pub use handle::Scoped;
pub use instance::{DebugMessenger, Instance};
pub use selector::{DeviceRequirements, DeviceSelector, QueueFamilyIndices, SelectedDevice};
