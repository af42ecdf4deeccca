// vulkanize - Vulkan instance, device and queue setup behind a window
//
// The binary in main.rs wires these together; the library keeps the pieces
// testable without a GPU.

pub mod backend;
pub mod config;
