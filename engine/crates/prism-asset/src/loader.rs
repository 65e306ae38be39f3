use std::path::{Path, PathBuf};

use anyhow::Context;
use ash::vk;
use prism_gfx::{gfx::Gfx, resources::sampler::GfxSamplerDesc};
use prism_render_interface::{
    bindless::BindlessDescriptorTable, material::Material, render_error::RenderError,
    resource_registry::ResourceRegistry, scene_gpu_state::SceneGpuState,
};

use crate::{gltf_loader::GltfLoader, model::Model, obj_loader::ObjLoader, texture_cache::TextureCache};

/// 可以识别、但是当前没有 loader 的格式
pub const UNSUPPORTED_EXTENSIONS: &[&str] = &[".fbx", ".dae", ".blend"];

/// 加载模型时需要用到的所有 GPU 端对象
pub struct LoadContext<'a> {
    pub gfx: &'a Gfx,
    pub bindless: &'a mut BindlessDescriptorTable,
    pub registry: &'a mut ResourceRegistry,
    pub scene: &'a mut SceneGpuState,
    pub textures: &'a mut TextureCache,
}
impl LoadContext<'_> {
    /// 材质表满的时候退回到 0 号材质
    pub fn add_material(&mut self, material: Material) -> u32 {
        self.scene.add_material(material).unwrap_or(0)
    }

    /// 材质纹理默认使用的 sampler
    pub fn material_sampler(&mut self) -> anyhow::Result<vk::Sampler> {
        self.registry.create_sampler(&GfxSamplerDesc::material())
    }
}

/// 某一类模型文件的加载器
pub trait ModelLoader {
    fn name(&self) -> &'static str;

    /// `extension` 为小写、带 `.` 的扩展名
    fn supports_extension(&self, extension: &str) -> bool;

    fn load(&self, path: &Path, ctx: &mut LoadContext) -> anyhow::Result<Model>;
}

/// 小写、带 `.` 的扩展名
pub fn normalized_extension(path: &Path) -> Option<String> {
    path.extension().map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

/// 按扩展名选择 loader
#[derive(Default)]
pub struct ModelLoaderRegistry {
    loaders: Vec<Box<dyn ModelLoader>>,
}
// new & init
impl ModelLoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_loaders() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GltfLoader));
        registry.register(Box::new(ObjLoader));
        registry
    }

    pub fn register(&mut self, loader: Box<dyn ModelLoader>) {
        log::debug!("Register model loader: {}", loader.name());
        self.loaders.push(loader);
    }
}
// tools
impl ModelLoaderRegistry {
    pub fn find(&self, extension: &str) -> Option<&dyn ModelLoader> {
        self.loaders.iter().find(|l| l.supports_extension(extension)).map(|l| l.as_ref())
    }

    pub fn load_model(&self, path: &Path, ctx: &mut LoadContext) -> anyhow::Result<Model> {
        let _span = tracy_client::span!("ModelLoaderRegistry::load_model");
        if !path.exists() {
            return Err(RenderError::AssetMissing(path.to_path_buf()).into());
        }

        let extension = normalized_extension(path).unwrap_or_default();
        let Some(loader) = self.find(&extension) else {
            return Err(Self::unsupported_reason(path, &extension));
        };

        log::info!("Loading model {} with {}", path.display(), loader.name());
        loader.load(path, ctx).with_context(|| format!("failed to load model {}", path.display()))
    }

    fn unsupported_reason(path: &Path, extension: &str) -> anyhow::Error {
        let reason = if UNSUPPORTED_EXTENSIONS.contains(&extension) {
            format!("`{extension}` models are not supported in this build")
        } else {
            format!("no loader for extension `{extension}`")
        };
        anyhow::Error::new(RenderError::AssetMissing(PathBuf::from(path))).context(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_case_insensitive() {
        assert_eq!(normalized_extension(Path::new("a/B.GLTF")).as_deref(), Some(".gltf"));
        assert_eq!(normalized_extension(Path::new("scene.Glb")).as_deref(), Some(".glb"));
        assert_eq!(normalized_extension(Path::new("noext")), None);
    }

    #[test]
    fn default_loaders_cover_gltf_and_obj() {
        let registry = ModelLoaderRegistry::with_default_loaders();
        assert_eq!(registry.find(".gltf").map(|l| l.name()), Some("glTF"));
        assert_eq!(registry.find(".glb").map(|l| l.name()), Some("glTF"));
        assert_eq!(registry.find(".obj").map(|l| l.name()), Some("OBJ"));
        for ext in UNSUPPORTED_EXTENSIONS {
            assert!(registry.find(ext).is_none());
        }
    }

    #[test]
    fn unsupported_format_is_asset_missing() {
        let err = ModelLoaderRegistry::unsupported_reason(Path::new("model.fbx"), ".fbx");
        assert!(err.to_string().contains("not supported"));
        assert!(matches!(err.downcast_ref::<RenderError>(), Some(RenderError::AssetMissing(_))));

        let err = ModelLoaderRegistry::unsupported_reason(Path::new("model.xyz"), ".xyz");
        assert!(err.to_string().contains("no loader"));
    }
}
