use ash::vk;
use itertools::Itertools;
use prism_gfx::{gfx::Gfx, resources::sampler::GfxSamplerDesc};
use prism_render_graph::graph::RenderGraph;
use prism_render_interface::{
    bindless::{BindlessDescriptorTable, BindlessHandle},
    gpu_types::CSM_CASCADE_COUNT,
    resource_registry::{ImageHandle, ImageKind, ImageSpecs, ImageViewHandle, ResourceRegistry},
};

use crate::camera_math::SHADOW_MAP_SIZE;

/// render graph 中使用的资源名
pub struct RgNames;
impl RgNames {
    pub const HDR: &'static str = "HDR_Color";
    pub const NORMAL: &'static str = "Normal";
    pub const VELOCITY: &'static str = "Velocity";
    pub const DEPTH: &'static str = "Depth";
    pub const LDR: &'static str = "LDR_Color";
    pub const SSAO: &'static str = "SSAO_Base";
    pub const SSAO_BLUR: &'static str = "SSAO_Blur";
    pub const BLOOM: &'static str = "Bloom_Base";
    pub const BLOOM_BLUR: &'static str = "Bloom_Blur";
    pub const TAA_OUTPUT: &'static str = "TAA_Output";
    pub const TAA_HISTORY: &'static str = "TAA_History";
    pub const SWAPCHAIN: &'static str = "Swapchain";

    pub fn shadow_cascade(index: usize) -> String {
        format!("ShadowMap_{index}")
    }
}

pub const HDR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const VELOCITY_FORMAT: vk::Format = vk::Format::R16G16_SFLOAT;
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;
pub const SSAO_FORMAT: vk::Format = vk::Format::R8_UNORM;

/// 所有随窗口大小变化的 render target
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Hdr,
    Normal,
    Velocity,
    Depth,
    Ldr,
    Ssao,
    SsaoBlur,
    Bloom,
    BloomBlur,
    /// TAA 的两张历史纹理，每帧交换读写
    TaaA,
    TaaB,
}
impl TargetKind {
    pub const ALL: [Self; 11] = [
        Self::Hdr,
        Self::Normal,
        Self::Velocity,
        Self::Depth,
        Self::Ldr,
        Self::Ssao,
        Self::SsaoBlur,
        Self::Bloom,
        Self::BloomBlur,
        Self::TaaA,
        Self::TaaB,
    ];

    pub fn format(self, swapchain_format: vk::Format) -> vk::Format {
        match self {
            Self::Hdr | Self::Normal | Self::Bloom | Self::BloomBlur | Self::TaaA | Self::TaaB => HDR_FORMAT,
            Self::Velocity => VELOCITY_FORMAT,
            Self::Depth => DEPTH_FORMAT,
            Self::Ldr => swapchain_format,
            Self::Ssao | Self::SsaoBlur => SSAO_FORMAT,
        }
    }

    pub fn usage(self) -> vk::ImageUsageFlags {
        match self {
            Self::Depth => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            // FinalCopy 会从 LDR blit 到 swapchain
            Self::Ldr => {
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED
                    | vk::ImageUsageFlags::TRANSFER_SRC
            }
            _ => vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
        }
    }

    /// bloom 在 1/4 分辨率下进行
    pub fn extent(self, full: vk::Extent2D) -> vk::Extent2D {
        match self {
            Self::Bloom | Self::BloomBlur => quarter_extent(full),
            _ => full,
        }
    }

    pub fn debug_name(self) -> &'static str {
        match self {
            Self::Hdr => "hdr-color",
            Self::Normal => "normal",
            Self::Velocity => "velocity",
            Self::Depth => "depth",
            Self::Ldr => "ldr-color",
            Self::Ssao => "ssao",
            Self::SsaoBlur => "ssao-blur",
            Self::Bloom => "bloom",
            Self::BloomBlur => "bloom-blur",
            Self::TaaA => "taa-history-a",
            Self::TaaB => "taa-history-b",
        }
    }

    /// 深度纹理不能线性过滤
    pub fn sampler_desc(self) -> GfxSamplerDesc {
        match self {
            Self::Depth => GfxSamplerDesc {
                mag_filter: vk::Filter::NEAREST,
                min_filter: vk::Filter::NEAREST,
                mipmap_mode: vk::SamplerMipmapMode::NEAREST,
                ..GfxSamplerDesc::linear_clamp()
            },
            _ => GfxSamplerDesc::linear_clamp(),
        }
    }
}

#[inline]
pub fn quarter_extent(full: vk::Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: (full.width / 4).max(1),
        height: (full.height / 4).max(1),
    }
}

pub struct RenderTarget {
    pub image: ImageHandle,
    /// resize 之后保持不变
    pub handle: BindlessHandle,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

/// 随窗口尺寸变化的 render target 集合
///
/// 所有 image 创建后立即转换到 SHADER_READ_ONLY_OPTIMAL，render graph 每帧都从这个 layout 开始，
/// 因此 TAA 的历史帧可以跨帧保留
pub struct RenderTargets {
    targets: Vec<RenderTarget>,
    extent: vk::Extent2D,
    swapchain_format: vk::Format,
}
// new & init
impl RenderTargets {
    pub fn new(
        gfx: &Gfx,
        registry: &mut ResourceRegistry,
        bindless: &mut BindlessDescriptorTable,
        extent: vk::Extent2D,
        swapchain_format: vk::Format,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("RenderTargets::new");

        let targets = TargetKind::ALL
            .iter()
            .map(|&kind| -> anyhow::Result<RenderTarget> {
                let target = Self::create_target(gfx, registry, kind, extent, swapchain_format)?;
                let view = registry.image(target.image)?.default_view();
                let sampler = registry.create_sampler(&kind.sampler_desc())?;
                let handle = bindless.register_image(view, sampler)?;
                Ok(RenderTarget { handle, ..target })
            })
            .try_collect()?;

        log::info!("Render targets created: {}x{}", extent.width, extent.height);
        Ok(Self {
            targets,
            extent,
            swapchain_format,
        })
    }

    fn create_target(
        gfx: &Gfx,
        registry: &mut ResourceRegistry,
        kind: TargetKind,
        extent: vk::Extent2D,
        swapchain_format: vk::Format,
    ) -> anyhow::Result<RenderTarget> {
        let format = kind.format(swapchain_format);
        let extent = kind.extent(extent);
        let image = registry.create_image(gfx, &ImageSpecs::image_2d(kind.debug_name(), extent, format, kind.usage()))?;
        registry.image(image)?.transition_sync(gfx, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;
        Ok(RenderTarget {
            image,
            handle: BindlessHandle::NULL,
            format,
            extent,
        })
    }

    /// 重建所有 render target，bindless 索引保持不变
    ///
    /// 调用之前需要保证 GPU 空闲
    pub fn resize(
        &mut self,
        gfx: &Gfx,
        registry: &mut ResourceRegistry,
        bindless: &BindlessDescriptorTable,
        extent: vk::Extent2D,
    ) -> anyhow::Result<()> {
        let _span = tracy_client::span!("RenderTargets::resize");
        if extent == self.extent {
            return Ok(());
        }

        for (kind, target) in TargetKind::ALL.iter().zip(self.targets.iter_mut()) {
            registry.remove_image(target.image);
            let new_target = Self::create_target(gfx, registry, *kind, extent, self.swapchain_format)?;
            let view = registry.image(new_target.image)?.default_view();
            let sampler = registry.create_sampler(&kind.sampler_desc())?;
            bindless.rewrite_image(target.handle, view, sampler);
            *target = RenderTarget {
                handle: target.handle,
                ..new_target
            };
        }

        log::info!(
            "Render targets resized: {}x{} -> {}x{}",
            self.extent.width,
            self.extent.height,
            extent.width,
            extent.height
        );
        self.extent = extent;
        Ok(())
    }
}
// getters
impl RenderTargets {
    #[inline]
    pub fn get(&self, kind: TargetKind) -> &RenderTarget {
        &self.targets[kind as usize]
    }

    #[inline]
    pub fn handle(&self, kind: TargetKind) -> BindlessHandle {
        self.get(kind).handle
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn bloom_extent(&self) -> vk::Extent2D {
        quarter_extent(self.extent)
    }
}
// tools
impl RenderTargets {
    /// 以 `name` 把某个 target 注册到 graph 中
    pub fn add_to_graph(
        &self,
        graph: &mut RenderGraph<'_>,
        registry: &ResourceRegistry,
        kind: TargetKind,
        name: &str,
    ) -> anyhow::Result<()> {
        let target = self.get(kind);
        let image = registry.image(target.image)?;
        graph.add_external_resource(
            name,
            image.handle(),
            image.default_view(),
            target.format,
            target.extent,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        Ok(())
    }
}

/// CSM 使用的 shadow map：一张 4 层的 2D array，每层一个 cascade
pub struct ShadowMap {
    image: ImageHandle,
    layer_views: Vec<ImageViewHandle>,
    handle: BindlessHandle,
}
// new & init
impl ShadowMap {
    pub fn new(
        gfx: &Gfx,
        registry: &mut ResourceRegistry,
        bindless: &mut BindlessDescriptorTable,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("ShadowMap::new");

        let specs = ImageSpecs {
            kind: ImageKind::Image2DArray {
                layers: CSM_CASCADE_COUNT as u32,
            },
            ..ImageSpecs::image_2d(
                "shadow-map",
                Self::extent(),
                DEPTH_FORMAT,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            )
        };
        let image = registry.create_image(gfx, &specs)?;
        registry.image(image)?.transition_sync(gfx, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;

        let layer_views: Vec<_> =
            (0..CSM_CASCADE_COUNT as u32).map(|layer| registry.create_layer_view(image, layer)).try_collect()?;

        let sampler = registry.create_sampler(&GfxSamplerDesc::shadow())?;
        let handle = bindless.register_image_array(registry.image(image)?.default_view(), sampler)?;

        Ok(Self {
            image,
            layer_views,
            handle,
        })
    }
}
// getters
impl ShadowMap {
    #[inline]
    pub fn extent() -> vk::Extent2D {
        vk::Extent2D {
            width: SHADOW_MAP_SIZE,
            height: SHADOW_MAP_SIZE,
        }
    }

    #[inline]
    pub fn handle(&self) -> BindlessHandle {
        self.handle
    }
}
// tools
impl ShadowMap {
    /// 每个 cascade 作为独立的 layer 资源注册，layout 分别跟踪
    pub fn add_to_graph(&self, graph: &mut RenderGraph<'_>, registry: &ResourceRegistry) -> anyhow::Result<()> {
        let image = registry.image(self.image)?;
        for (layer, view) in self.layer_views.iter().enumerate() {
            graph.add_layer_resource(
                RgNames::shadow_cascade(layer),
                image.handle(),
                registry.image_view(*view)?.handle(),
                DEPTH_FORMAT,
                Self::extent(),
                layer as u32,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bloom_targets_are_quarter_resolution() {
        let full = vk::Extent2D {
            width: 1600,
            height: 900,
        };
        assert_eq!(
            TargetKind::Bloom.extent(full),
            vk::Extent2D {
                width: 400,
                height: 225
            }
        );
        assert_eq!(TargetKind::Hdr.extent(full), full);
    }

    #[test]
    fn quarter_extent_never_reaches_zero() {
        let tiny = vk::Extent2D { width: 3, height: 1 };
        assert_eq!(quarter_extent(tiny), vk::Extent2D { width: 1, height: 1 });
    }

    #[test]
    fn formats_follow_target_kind() {
        let swapchain = vk::Format::B8G8R8A8_SRGB;
        assert_eq!(TargetKind::Ldr.format(swapchain), swapchain);
        assert_eq!(TargetKind::Depth.format(swapchain), vk::Format::D32_SFLOAT);
        assert_eq!(TargetKind::Velocity.format(swapchain), vk::Format::R16G16_SFLOAT);
        assert_eq!(TargetKind::SsaoBlur.format(swapchain), vk::Format::R8_UNORM);
        assert_eq!(TargetKind::TaaB.format(swapchain), HDR_FORMAT);
    }

    #[test]
    fn every_target_is_sampled() {
        for kind in TargetKind::ALL {
            assert!(kind.usage().contains(vk::ImageUsageFlags::SAMPLED), "{kind:?}");
        }
        assert!(TargetKind::Depth.usage().contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
        assert!(TargetKind::Ldr.usage().contains(vk::ImageUsageFlags::TRANSFER_SRC));
    }

    #[test]
    fn kind_index_matches_table_order() {
        for (i, kind) in TargetKind::ALL.iter().enumerate() {
            assert_eq!(*kind as usize, i);
        }
        assert!(TargetKind::ALL.iter().map(|k| k.debug_name()).all_unique());
    }
}
