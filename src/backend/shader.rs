// Shader binaries and module creation
//
// The two SPIR-V blobs are read from disk by the driver; this module only
// turns them into short-lived shader modules for pipeline creation.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::error::{BringupError, BringupResult, VkResultExt};

/// Compiled vertex + fragment shader, opaque SPIR-V bytes.
#[derive(Debug, Clone)]
pub struct ShaderBinaries {
    pub vertex: Vec<u8>,
    pub fragment: Vec<u8>,
}

impl ShaderBinaries {
    pub fn load<P: AsRef<Path>>(vertex: P, fragment: P) -> Result<Self> {
        let read = |path: &Path| {
            std::fs::read(path).with_context(|| {
                format!("Failed to read shader {:?} (was it compiled with glslc?)", path)
            })
        };

        let binaries = Self {
            vertex: read(vertex.as_ref())?,
            fragment: read(fragment.as_ref())?,
        };

        log::debug!(
            "Loaded shaders: vertex {} bytes, fragment {} bytes",
            binaries.vertex.len(),
            binaries.fragment.len()
        );

        Ok(binaries)
    }
}

/// Decode SPIR-V bytes into words. Handles alignment and byte order, which a
/// raw pointer cast would not.
pub fn decode_spirv(stage: &'static str, code: &[u8]) -> BringupResult<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(code)).map_err(|e| BringupError::InvalidShaderBinary {
        stage,
        reason: e.to_string(),
    })
}

pub fn create_shader_module(
    device: &ash::Device,
    stage: &'static str,
    code: &[u8],
) -> BringupResult<vk::ShaderModule> {
    let words = decode_spirv(stage, code)?;
    let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

    unsafe { device.create_shader_module(&create_info, None) }.rejected_by("vkCreateShaderModule")
}
