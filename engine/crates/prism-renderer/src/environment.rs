use std::path::Path;

use ash::vk;
use prism_gfx::{
    gfx::Gfx,
    resources::{
        image::{GfxImage, GfxImageCreateInfo},
        sampler::GfxSamplerDesc,
    },
};
use prism_render_interface::{
    bindless::{BindlessDescriptorTable, BindlessHandle},
    gpu_types::SceneData,
    resource_registry::{ImageHandle, ResourceRegistry},
};

pub const ENVIRONMENT_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;

/// 天空盒以及 IBL 相关的纹理
///
/// 目前只有 equirect 格式的天空盒；irradiance、prefiltered 与 BRDF LUT 没有预计算，保持 0 号索引
#[derive(Default)]
pub struct Environment {
    skybox: Option<ImageHandle>,
    skybox_handle: BindlessHandle,
    irradiance_handle: BindlessHandle,
    prefiltered_handle: BindlessHandle,
    brdf_lut_handle: BindlessHandle,
}
// new & init
impl Environment {
    /// 文件不存在或者解码失败时只记录警告，天空盒保持未设置
    pub fn load(
        gfx: &Gfx,
        registry: &mut ResourceRegistry,
        bindless: &mut BindlessDescriptorTable,
        path: &Path,
    ) -> Self {
        let _span = tracy_client::span!("Environment::load");

        if !path.exists() {
            log::warn!("Skybox not found: {}, rendering without environment map", path.display());
            return Self::default();
        }

        match Self::load_skybox(gfx, registry, bindless, path) {
            Ok((image, handle)) => {
                log::info!("Loaded skybox: {}", path.display());
                Self {
                    skybox: Some(image),
                    skybox_handle: handle,
                    ..Default::default()
                }
            }
            Err(e) => {
                log::warn!("Failed to load skybox {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    fn load_skybox(
        gfx: &Gfx,
        registry: &mut ResourceRegistry,
        bindless: &mut BindlessDescriptorTable,
        path: &Path,
    ) -> anyhow::Result<(ImageHandle, BindlessHandle)> {
        let (width, height, pixels) = decode_rgba32f(&std::fs::read(path)?)?;

        let info = GfxImageCreateInfo::new_image_2d_info(
            vk::Extent2D { width, height },
            ENVIRONMENT_FORMAT,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        );
        let image = GfxImage::new(gfx, &info, "skybox")?;
        image.upload_sync(gfx, bytemuck::cast_slice(&pixels))?;

        let sampler = registry.create_sampler(&Self::sampler_desc())?;
        let handle = bindless.register_image(image.default_view(), sampler)?;
        Ok((registry.register_image(image), handle))
    }

    /// 经度方向环绕，纬度方向 clamp，避免两极出现接缝
    fn sampler_desc() -> GfxSamplerDesc {
        GfxSamplerDesc {
            address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            ..GfxSamplerDesc::default()
        }
    }
}
// getters
impl Environment {
    #[inline]
    pub fn skybox_handle(&self) -> BindlessHandle {
        self.skybox_handle
    }

    #[inline]
    pub fn has_skybox(&self) -> bool {
        self.skybox.is_some() && !self.skybox_handle.is_null()
    }

    /// 把环境相关的 bindless 索引写入 scene data
    pub fn fill_scene_handles(&self, scene_data: &mut SceneData) {
        scene_data.skybox_handle = self.skybox_handle.index();
        scene_data.irradiance_handle = self.irradiance_handle.index();
        scene_data.prefiltered_handle = self.prefiltered_handle.index();
        scene_data.brdf_lut_handle = self.brdf_lut_handle.index();
    }
}

/// 解码为 RGBA32F，`.hdr` 保持线性的高动态范围数据
pub fn decode_rgba32f(bytes: &[u8]) -> anyhow::Result<(u32, u32, Vec<f32>)> {
    let image = image::load_from_memory(bytes)?.into_rgba32f();
    let (width, height) = image.dimensions();
    Ok((width, height, image.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_hdr_without_clamping() {
        let pixels = vec![image::Rgb([4.0_f32, 0.5, 0.0]), image::Rgb([0.0, 0.0, 16.0])];
        let mut bytes = Vec::new();
        image::codecs::hdr::HdrEncoder::new(&mut bytes).encode(&pixels, 2, 1).unwrap();

        let (width, height, data) = decode_rgba32f(&bytes).unwrap();
        assert_eq!((width, height), (2, 1));
        assert_eq!(data.len(), 8);
        assert!((data[0] - 4.0).abs() < 0.1);
        assert!((data[6] - 16.0).abs() < 0.5);
        assert_eq!(data[3], 1.0);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_rgba32f(b"not an image").is_err());
    }

    #[test]
    fn empty_environment_leaves_handles_zero() {
        let env = Environment::default();
        let mut scene: SceneData = bytemuck::Zeroable::zeroed();
        scene.skybox_handle = 7;
        env.fill_scene_handles(&mut scene);
        assert_eq!(scene.skybox_handle, 0);
        assert!(!env.has_skybox());
    }
}
