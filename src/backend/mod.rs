// Backend module - Vulkan bring-up for a single presented frame
//
// Design: Thin wrapper around ash, one module per bring-up stage
// Every failure is returned as a BringupError; nothing here exits the process

pub mod commands;
pub mod context;
pub mod device;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod resources;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use context::VulkanContext;
pub use device::VulkanDevice;
pub use error::{BringupError, BringupResult};
pub use shader::ShaderBinaries;
