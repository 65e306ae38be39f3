use std::{ffi::CStr, io::Cursor, path::Path, rc::Rc};

use anyhow::Context;
use ash::vk;

use crate::foundation::{debug_messenger::DebugType, device::GfxDevice};

/// SPIR-V 文件的第一个 word
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// 通过 magic number 判断是否为 SPIR-V，兼容两种字节序
pub fn is_spirv(bytes: &[u8]) -> bool {
    if bytes.len() < 4 {
        return false;
    }
    let word = [bytes[0], bytes[1], bytes[2], bytes[3]];
    u32::from_le_bytes(word) == SPIRV_MAGIC || u32::from_be_bytes(word) == SPIRV_MAGIC
}

/// 根据文件名推断 shader stage，例如 `pbr.vert.spv`、`cull.comp`
pub fn stage_from_path(path: &Path) -> Option<vk::ShaderStageFlags> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.strip_suffix(".spv").unwrap_or(file_name);
    let ext = Path::new(stem).extension()?.to_str()?;
    match ext {
        "vert" => Some(vk::ShaderStageFlags::VERTEX),
        "frag" => Some(vk::ShaderStageFlags::FRAGMENT),
        "comp" => Some(vk::ShaderStageFlags::COMPUTE),
        _ => None,
    }
}

/// shader stage 的描述：stage、入口、代码所在路径
#[derive(Clone, Debug)]
pub struct GfxShaderStageInfo {
    pub stage: vk::ShaderStageFlags,
    pub entry_point: &'static CStr,
    pub path: std::path::PathBuf,
}
impl GfxShaderStageInfo {
    pub fn new(stage: vk::ShaderStageFlags, path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            stage,
            entry_point: c"main",
            path: path.into(),
        }
    }
}

/// pipeline 创建完成之后即可销毁
pub struct GfxShaderModule {
    handle: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
    device: Rc<GfxDevice>,
}
// new & init
impl GfxShaderModule {
    /// 读取 SPIR-V 或者 GLSL 源码文件
    pub fn load(device: Rc<GfxDevice>, path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("failed to read shader {}", path.display()))?;
        let stage = stage_from_path(path)
            .with_context(|| format!("can not infer shader stage from {}", path.display()))?;
        Self::from_bytes(device, &bytes, stage, &path.display().to_string())
    }

    /// 如果 bytes 以 SPIR-V magic 开头，直接使用；否则视为 GLSL 源码进行编译
    pub fn from_bytes(
        device: Rc<GfxDevice>,
        bytes: &[u8],
        stage: vk::ShaderStageFlags,
        name: &str,
    ) -> anyhow::Result<Self> {
        let code = if is_spirv(bytes) {
            ash::util::read_spv(&mut Cursor::new(bytes)).with_context(|| format!("invalid spir-v: {name}"))?
        } else {
            let source = std::str::from_utf8(bytes).with_context(|| format!("shader {name} is neither spir-v nor utf-8"))?;
            compile_glsl(source, stage, name)?
        };

        let shader_module_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let handle = unsafe { device.create_shader_module(&shader_module_info, None)? };

        let module = Self { handle, stage, device };
        module.device.set_debug_name(&module, name);
        Ok(module)
    }
}
impl Drop for GfxShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.handle, None);
        }
    }
}
// getters
impl GfxShaderModule {
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    #[inline]
    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }
}
impl DebugType for GfxShaderModule {
    fn debug_type_name() -> &'static str {
        "GfxShaderModule"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

#[cfg(feature = "shaderc")]
fn compile_glsl(source: &str, stage: vk::ShaderStageFlags, name: &str) -> anyhow::Result<Vec<u32>> {
    let kind = match stage {
        vk::ShaderStageFlags::VERTEX => shaderc::ShaderKind::Vertex,
        vk::ShaderStageFlags::FRAGMENT => shaderc::ShaderKind::Fragment,
        vk::ShaderStageFlags::COMPUTE => shaderc::ShaderKind::Compute,
        _ => anyhow::bail!("unsupported shader stage {:?} for {}", stage, name),
    };
    let compiler = shaderc::Compiler::new().context("shaderc is not available")?;
    let mut options = shaderc::CompileOptions::new().context("failed to create shaderc options")?;
    options.set_target_env(shaderc::TargetEnv::Vulkan, shaderc::EnvVersion::Vulkan1_2 as u32);
    let artifact = compiler
        .compile_into_spirv(source, kind, name, "main", Some(&options))
        .with_context(|| format!("failed to compile {name}"))?;
    Ok(artifact.as_binary().to_vec())
}

#[cfg(not(feature = "shaderc"))]
fn compile_glsl(_source: &str, _stage: vk::ShaderStageFlags, name: &str) -> anyhow::Result<Vec<u32>> {
    anyhow::bail!("{name} is not spir-v and runtime glsl compilation is disabled (enable the `shaderc` feature)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_spirv_magic() {
        assert!(is_spirv(&[0x03, 0x02, 0x23, 0x07, 0, 0, 0, 0]));
        assert!(is_spirv(&[0x07, 0x23, 0x02, 0x03]));
        assert!(!is_spirv(b"#version 450\nvoid main() {}"));
        assert!(!is_spirv(&[0x03, 0x02]));
    }

    #[test]
    fn stage_is_inferred_from_file_name() {
        assert_eq!(stage_from_path(Path::new("assets/shaders/pbr.vert.spv")), Some(vk::ShaderStageFlags::VERTEX));
        assert_eq!(stage_from_path(Path::new("taa.frag.spv")), Some(vk::ShaderStageFlags::FRAGMENT));
        assert_eq!(stage_from_path(Path::new("cluster_cull.comp")), Some(vk::ShaderStageFlags::COMPUTE));
        assert_eq!(stage_from_path(Path::new("readme.txt")), None);
    }

    #[cfg(not(feature = "shaderc"))]
    #[test]
    fn glsl_without_compiler_is_an_error() {
        let err = compile_glsl("void main() {}", vk::ShaderStageFlags::FRAGMENT, "test.frag").unwrap_err();
        assert!(err.to_string().contains("shaderc"));
    }
}
