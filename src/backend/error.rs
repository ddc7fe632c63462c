// Bring-up errors
//
// Every failure in the backend is fatal. Nothing here retries; errors travel
// back to the driver, which decides to terminate the process.

use ash::prelude::VkResult;
use ash::vk;
use thiserror::Error;

pub type BringupResult<T> = std::result::Result<T, BringupError>;

/// Broad class of a bring-up failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The machine cannot run us: no GPU, no surface, missing extension.
    Environment,
    /// A Vulkan call returned an error code.
    ApiRejection,
    /// A query succeeded but produced data we cannot work with.
    Invariant,
}

#[derive(Debug, Error)]
pub enum BringupError {
    #[error("Failed to load Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("Failed to create Vulkan surface: {0}")]
    SurfaceUnavailable(vk::Result),

    #[error("Failed to find Vulkan-capable GPU")]
    NoPhysicalDevice,

    #[error("Could not find required extension {0}")]
    MissingExtension(String),

    #[error("Failed to find graphics queue family")]
    NoGraphicsQueueFamily,

    #[error("Failed to find present queue family")]
    NoPresentQueueFamily,

    #[error("{call} failed: {result}")]
    Rejected {
        call: &'static str,
        result: vk::Result,
    },

    #[error("No valid swapchain configuration found ({formats} formats, {present_modes} present modes)")]
    NoSwapchainConfiguration {
        formats: usize,
        present_modes: usize,
    },

    #[error("Invalid SPIR-V binary for {stage} shader: {reason}")]
    InvalidShaderBinary {
        stage: &'static str,
        reason: String,
    },

    #[error("{buffers} command buffers recorded against {framebuffers} framebuffers")]
    ImageCountMismatch { buffers: usize, framebuffers: usize },

    #[error("Acquired image index {index} but only {count} command buffers exist")]
    ImageIndexOutOfRange { index: u32, count: usize },

    #[error("Frame semaphores were already used for a frame; they only cover a single submission")]
    FrameSyncReused,
}

impl BringupError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Loading(_)
            | Self::SurfaceUnavailable(_)
            | Self::NoPhysicalDevice
            | Self::MissingExtension(_)
            | Self::NoGraphicsQueueFamily
            | Self::NoPresentQueueFamily => FailureKind::Environment,
            Self::Rejected { .. } => FailureKind::ApiRejection,
            Self::NoSwapchainConfiguration { .. }
            | Self::InvalidShaderBinary { .. }
            | Self::ImageCountMismatch { .. }
            | Self::ImageIndexOutOfRange { .. }
            | Self::FrameSyncReused => FailureKind::Invariant,
        }
    }
}

/// Tags a raw Vulkan result with the entry point that produced it.
pub trait VkResultExt<T> {
    fn rejected_by(self, call: &'static str) -> BringupResult<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn rejected_by(self, call: &'static str) -> BringupResult<T> {
        self.map_err(|result| BringupError::Rejected { call, result })
    }
}
