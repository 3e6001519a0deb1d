use anyhow::Context;
use ash::{
    util::read_spv,
    vk::{PipelineShaderStageCreateInfo, ShaderModule, ShaderModuleCreateInfo, ShaderStageFlags},
    Device,
};
use std::ffi::CStr;
use std::path::Path;
use std::sync::Weak;

use crate::framework::shared::traits::Disposable;

const ENTRY_POINT: &[u8] = b"main\0";

/// SPIR-Vのシェーダーモジュール。<br />
/// A SPIR-V shader module.
pub struct Shader {
    logical_device: Weak<Device>,
    pub file_name: String,
    pub shader_module: ShaderModule,
    pub shader_stage_info: PipelineShaderStageCreateInfo,
    is_disposed: bool,
}

impl Shader {
    pub fn new<P: AsRef<Path>>(
        device: Weak<Device>,
        file_name: P,
        stage_flag: ShaderStageFlags,
    ) -> anyhow::Result<Self> {
        let path = file_name.as_ref();
        let mut file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open shader file: {}", path.display()))?;
        let bytes = read_spv(&mut file)
            .with_context(|| format!("Failed to read SPIR-V from {}", path.display()))?;
        let module_info = ShaderModuleCreateInfo::builder().code(bytes.as_slice());
        let entry_point = CStr::from_bytes_with_nul(ENTRY_POINT)?;

        let shader_module = {
            let device = device
                .upgrade()
                .with_context(|| "Failed to upgrade device handle.")?;
            unsafe {
                device
                    .create_shader_module(&module_info, None)
                    .with_context(|| format!("Failed to create shader module: {}", path.display()))?
            }
        };
        let shader_stage_info = PipelineShaderStageCreateInfo::builder()
            .module(shader_module)
            .stage(stage_flag)
            .name(entry_point)
            .build();

        Ok(Shader {
            logical_device: device,
            file_name: path.display().to_string(),
            shader_module,
            shader_stage_info,
            is_disposed: false,
        })
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        if !self.is_disposed {
            self.dispose();
        }
    }
}

impl Disposable for Shader {
    fn dispose(&mut self) {
        if let Some(device) = self.logical_device.upgrade() {
            unsafe {
                device.destroy_shader_module(self.shader_module, None);
            }
        }
        self.is_disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.is_disposed
    }
}
