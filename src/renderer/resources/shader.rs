use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;

const SHADERS_DIR: &str = "shaders-built";

/// Vertex + fragment shader module pair for one graphics pipeline.
pub struct GraphicsShader {
    pub vert_mod: vk::ShaderModule,
    pub frag_mod: vk::ShaderModule,
    device: Arc<ash::Device>,
}

impl GraphicsShader {
    /// Load `<vert_name>.vert.spv` and `<frag_name>.frag.spv` from the
    /// build-time shader output directory. A missing blob is fatal at
    /// startup.
    pub fn new(vert_name: &str, frag_name: &str, device: Arc<ash::Device>) -> Result<Self> {
        let vert_mod = create_shader_module(
            (&format!("{}/{}.vert.spv", SHADERS_DIR, vert_name)).as_ref(),
            &device,
        )?;
        let frag_mod = create_shader_module(
            (&format!("{}/{}.frag.spv", SHADERS_DIR, frag_name)).as_ref(),
            &device,
        )?;
        Ok(Self {
            vert_mod,
            frag_mod,
            device,
        })
    }

    pub fn destroy(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.vert_mod, None);
            self.device.destroy_shader_module(self.frag_mod, None);
        }
    }
}

fn create_shader_module(filepath: &Path, device: &ash::Device) -> Result<vk::ShaderModule> {
    let code = std::fs::read(filepath)
        .wrap_err_with(|| format!("Failed to read shader bytecode: {:?}", filepath))?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default()
        .code(bytemuck::cast_slice(&code));

    let shader_module = unsafe {
        device.create_shader_module(&shader_module_info, None)?
    };

    Ok(shader_module)
}
