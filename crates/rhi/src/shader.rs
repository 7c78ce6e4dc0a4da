//! SPIR-V shader modules.
//!
//! Shaders are compiled offline (`glslc`) and loaded at init. A missing or
//! malformed module is a fatal init error.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use subpass_rhi::device::Device;
//! use subpass_rhi::shader::{Shader, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), subpass_rhi::RhiError> {
//! // Resolves shaders/geometry.vert.spv
//! let vert = Shader::load(device, Path::new("shaders"), "geometry", ShaderStage::Vertex)?;
//! # Ok(())
//! # }
//! ```

use std::ffi::CString;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// SPIR-V magic number, first word of every module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Shader stage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader stage
    Vertex,
    /// Fragment shader stage
    Fragment,
}

impl ShaderStage {
    /// Converts the shader stage to Vulkan shader stage flags.
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// File extension `glslc` uses for this stage.
    pub fn extension(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Returns `{dir}/{name}.{stage}.spv`.
pub fn spirv_path(dir: &Path, name: &str, stage: ShaderStage) -> PathBuf {
    dir.join(format!("{}.{}.spv", name, stage.extension()))
}

/// Decodes SPIR-V bytes into little-endian words.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] if the length is not a multiple of 4
/// or the magic number is wrong.
pub fn decode_spirv(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RhiError::ShaderError(format!("Invalid SPIR-V: {}", e)))?;

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(word) => Err(RhiError::ShaderError(format!(
            "Invalid SPIR-V magic number {:#010x}",
            word
        ))),
        None => Err(RhiError::ShaderError("Empty SPIR-V module".to_string())),
    }
}

/// Vulkan shader module wrapper.
pub struct Shader {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan shader module handle.
    module: vk::ShaderModule,
    /// Shader stage type.
    stage: ShaderStage,
    /// Entry point function name.
    entry_point: CString,
}

impl Shader {
    /// Loads `{dir}/{name}.{stage}.spv` with entry point `main`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid SPIR-V.
    pub fn load(device: Arc<Device>, dir: &Path, name: &str, stage: ShaderStage) -> RhiResult<Self> {
        Self::from_spirv_file(device, &spirv_path(dir, name, stage), stage, "main")
    }

    /// Creates a shader module from a SPIR-V file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The SPIR-V data is invalid
    /// - Shader module creation fails
    pub fn from_spirv_file(
        device: Arc<Device>,
        path: &Path,
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        debug!("Loading {} shader from {:?}", stage, path);

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;

        Self::from_spirv_bytes(device, &bytes, stage, entry_point)
    }

    /// Creates a shader module from SPIR-V bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not SPIR-V, the entry point name
    /// contains a nul byte, or module creation fails.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let code = decode_spirv(bytes)?;

        let entry_point_cstring = CString::new(entry_point)
            .map_err(|e| RhiError::ShaderError(format!("Invalid entry point name: {}", e)))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        info!(
            "Created {} shader module with entry point '{}'",
            stage, entry_point
        );

        Ok(Self {
            device,
            module,
            stage,
            entry_point: entry_point_cstring,
        })
    }

    /// Returns the Vulkan shader module handle.
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Returns the shader stage.
    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Returns the stage create info; it borrows the entry point name.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_spirv_path() {
        let path = spirv_path(Path::new("shaders"), "composite", ShaderStage::Fragment);
        assert_eq!(path, Path::new("shaders").join("composite.frag.spv"));
    }

    #[test]
    fn test_decode_spirv_accepts_magic() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        let words = decode_spirv(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn test_decode_spirv_rejects_misaligned() {
        assert!(matches!(
            decode_spirv(&[0u8; 5]),
            Err(RhiError::ShaderError(_))
        ));
    }

    #[test]
    fn test_decode_spirv_rejects_bad_magic() {
        assert!(decode_spirv(&[0u8; 8]).is_err());
        assert!(decode_spirv(&[]).is_err());
    }
}
