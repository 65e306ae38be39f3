use std::path::Path;

use ash::vk;
use glam::Mat4;
use prism_asset::model::Model;
use prism_gfx::gfx::Gfx;
use prism_render_graph::graph::RenderGraph;
use prism_render_interface::{
    bindless::BindlessDescriptorTable,
    frame_counter::FrameLabel,
    gpu_types::{CSM_CASCADE_COUNT, SceneData},
    resource_registry::ResourceRegistry,
    scene_gpu_state::SceneGpuState,
};

use crate::{
    environment::Environment,
    passes::{
        PassContext, SceneDraw,
        bloom::{BloomPass, BloomPassData},
        cluster::{ClusterBuildPassData, ClusterCullPassData, ClusterPasses},
        composite::{CompositePass, CompositePassData},
        culling::{CullingPass, CullingPassData},
        geometry::{GeometryPass, GeometryPassData},
        present::{PresentPass, PresentPassData},
        shadow::{ShadowPass, ShadowPassData},
        ssao::{SsaoPass, SsaoPassData},
        taa::{TaaHistory, TaaPass, TaaPassData},
    },
    render_targets::{RenderTargets, RgNames, ShadowMap, TargetKind},
    ui_params::UiParams,
};

/// 根据参数决定这一帧启用哪些可选 pass
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameFeatures {
    pub gpu_culling: bool,
    pub cluster_build: bool,
    pub cluster_cull: bool,
    pub skybox: bool,
    pub taa: bool,
    pub ssao: bool,
    pub bloom: bool,
    pub fxaa: bool,
}
impl FrameFeatures {
    pub fn new(params: &UiParams, rebuild_clusters: bool, has_skybox: bool) -> Self {
        Self {
            gpu_culling: params.enable_gpu_culling,
            cluster_build: rebuild_clusters,
            cluster_cull: params.enable_cluster_cull,
            skybox: params.show_skybox && has_skybox,
            taa: params.enable_taa,
            ssao: params.enable_ssao,
            bloom: params.bloom_strength > 0.0,
            fxaa: params.enable_fxaa,
        }
    }

    /// Bloom 与 Composite 读取的 HDR 输入
    #[inline]
    pub fn hdr_source(&self) -> &'static str {
        if self.taa { RgNames::TAA_OUTPUT } else { RgNames::HDR }
    }

    /// 按执行顺序列出会被添加到 graph 中的 pass
    pub fn pass_names(&self) -> Vec<String> {
        let mut names = vec![];
        if self.gpu_culling {
            names.push("CullingPass".to_string());
        }
        if self.cluster_build {
            names.push("ClusterBuildPass".to_string());
        }
        if self.cluster_cull {
            names.push("ClusterCullPass".to_string());
        }
        names.extend((0..CSM_CASCADE_COUNT).map(|i| format!("ShadowPass_{i}")));
        names.push("GeometryPass".to_string());
        if self.taa {
            names.push("TAAPass".to_string());
        }
        if self.ssao {
            names.extend(["SSAOPass".to_string(), "SSAOBlurPass".to_string()]);
        }
        if self.bloom {
            names.extend(["BloomPass".to_string(), "BloomBlurPass".to_string()]);
        }
        names.push("CompositePass".to_string());
        names.push(if self.fxaa { "FXAAPass" } else { "FinalCopy" }.to_string());
        names
    }
}

/// 构建 graph 时需要的每帧输入
pub struct FrameInputs<'a> {
    pub frame: FrameLabel,
    pub scene: &'a SceneGpuState,
    pub model: Option<&'a Model>,
    pub params: &'a UiParams,
    /// 未带 jitter 的 view 矩阵，cluster cull 使用
    pub view: Mat4,
    pub swapchain_image: vk::Image,
    pub swapchain_view: vk::ImageView,
    pub swapchain_format: vk::Format,
    pub swapchain_extent: vk::Extent2D,
}

/// 持有所有 pass 以及屏幕大小的 render target
pub struct Renderer {
    culling: CullingPass,
    cluster: ClusterPasses,
    shadow: ShadowPass,
    geometry: GeometryPass,
    ssao: SsaoPass,
    bloom: BloomPass,
    taa: TaaPass,
    composite: CompositePass,
    present: PresentPass,

    targets: RenderTargets,
    shadow_map: ShadowMap,
    environment: Environment,

    taa_history: TaaHistory,
    /// 上次构建 cluster AABB 时使用的投影矩阵
    cluster_projection: Option<Mat4>,
    rebuild_clusters: bool,
}
// new & init
impl Renderer {
    pub fn new(
        gfx: &Gfx,
        registry: &mut ResourceRegistry,
        bindless: &mut BindlessDescriptorTable,
        swapchain_format: vk::Format,
        extent: vk::Extent2D,
        skybox_path: &Path,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("Renderer::new");

        let renderer = Self {
            culling: CullingPass::new(gfx, registry)?,
            cluster: ClusterPasses::new(gfx, registry)?,
            shadow: ShadowPass::new(gfx, registry)?,
            geometry: GeometryPass::new(gfx, registry)?,
            ssao: SsaoPass::new(gfx, registry, bindless)?,
            bloom: BloomPass::new(gfx, registry)?,
            taa: TaaPass::new(gfx, registry)?,
            composite: CompositePass::new(gfx, registry, swapchain_format)?,
            present: PresentPass::new(gfx, registry, swapchain_format)?,

            targets: RenderTargets::new(gfx, registry, bindless, extent, swapchain_format)?,
            shadow_map: ShadowMap::new(gfx, registry, bindless)?,
            environment: Environment::load(gfx, registry, bindless, skybox_path),

            taa_history: TaaHistory::default(),
            cluster_projection: None,
            rebuild_clusters: true,
        };
        log::info!("Renderer initialized: {}x{}, {:?}", extent.width, extent.height, swapchain_format);
        Ok(renderer)
    }

    /// 窗口大小变化时调用，调用前需要 GPU 空闲
    pub fn resize(
        &mut self,
        gfx: &Gfx,
        registry: &mut ResourceRegistry,
        bindless: &BindlessDescriptorTable,
        extent: vk::Extent2D,
    ) -> anyhow::Result<()> {
        self.targets.resize(gfx, registry, bindless, extent)?;
        // 宽高比变化，cluster 需要重建；旧的历史帧也已经失效
        self.cluster_projection = None;
        self.rebuild_clusters = true;
        self.taa_history = TaaHistory::default();
        Ok(())
    }
}
// frame
impl Renderer {
    /// 每帧开始时调用，`projection` 是不带 jitter 的投影矩阵
    pub fn begin_frame(&mut self, projection: Mat4) {
        self.taa_history.flip();
        self.rebuild_clusters = self.cluster_projection != Some(projection);
        if self.rebuild_clusters {
            log::debug!("projection changed, rebuilding cluster grid");
            self.cluster_projection = Some(projection);
        }
    }

    /// 填写 shadow map 与环境贴图在 bindless 中的索引
    pub fn fill_scene_handles(&self, scene_data: &mut SceneData) {
        scene_data.shadow_map_handle = self.shadow_map.handle().index();
        self.environment.fill_scene_handles(scene_data);
        scene_data.enable_skybox &= self.environment.has_skybox() as u32;
    }

    /// 按固定顺序把所有 pass 添加到 graph 中，UI pass 由调用者在之后追加
    pub fn build_graph<'a>(
        &'a self,
        graph: &mut RenderGraph<'a>,
        registry: &'a ResourceRegistry,
        bindless_set: vk::DescriptorSet,
        inputs: FrameInputs<'a>,
    ) -> anyhow::Result<FrameFeatures> {
        let _span = tracy_client::span!("Renderer::build_graph");

        let features = FrameFeatures::new(inputs.params, self.rebuild_clusters, self.environment.has_skybox());
        self.register_resources(graph, registry, &inputs)?;

        let ctx = PassContext {
            registry,
            bindless_set,
        };
        let frame = inputs.frame;
        let scene = inputs.scene;
        let params = inputs.params;
        let handles = scene.frame_handles(frame);
        let extent = self.targets.extent();

        let draw = SceneDraw {
            model: inputs.model,
            indirect_buffer: scene.indirect_buffer(frame),
            draw_count: scene.instance_count(frame),
        };

        if features.gpu_culling {
            self.culling.add_to_graph(
                graph,
                ctx,
                CullingPassData {
                    handles,
                    indirect_buffer: scene.indirect_buffer(frame),
                    instance_count: scene.instance_count(frame),
                },
            );
        }

        if features.cluster_build {
            self.cluster.add_build_to_graph(
                graph,
                ctx,
                ClusterBuildPassData {
                    cluster_handle: scene.cluster_handle(),
                    scene_handle: handles.scene,
                    cluster_buffer: scene.cluster_buffer(),
                },
            );
        }
        if features.cluster_cull {
            self.cluster.add_cull_to_graph(
                graph,
                ctx,
                ClusterCullPassData {
                    cluster_handle: scene.cluster_handle(),
                    handles,
                    light_count: scene.lights().len() as u32,
                    view: inputs.view,
                    cluster_grid_buffer: scene.cluster_grid_buffer(frame),
                    light_index_buffer: scene.light_index_buffer(frame),
                    atomic_buffer: scene.cluster_atomic_buffer(frame),
                },
            );
        }

        self.shadow.add_to_graph(
            graph,
            ctx,
            ShadowPassData {
                handles,
                material_handle: scene.material_handle(),
                draw,
            },
        );

        self.geometry.add_to_graph(
            graph,
            ctx,
            GeometryPassData {
                handles,
                material_handle: scene.material_handle(),
                draw,
                skybox: features.skybox.then(|| self.environment.skybox_handle()),
                extent,
            },
        );

        let (taa_output, taa_history) = self.taa_targets();
        let hdr_handle = if features.taa {
            self.taa.add_to_graph(
                graph,
                ctx,
                TaaPassData {
                    current_handle: self.targets.handle(TargetKind::Hdr),
                    history_handle: self.targets.handle(taa_history),
                    velocity_handle: self.targets.handle(TargetKind::Velocity),
                    extent,
                },
            );
            self.targets.handle(taa_output)
        } else {
            self.targets.handle(TargetKind::Hdr)
        };

        if features.ssao {
            self.ssao.add_to_graph(
                graph,
                ctx,
                SsaoPassData {
                    normal_handle: self.targets.handle(TargetKind::Normal),
                    depth_handle: self.targets.handle(TargetKind::Depth),
                    ssao_handle: self.targets.handle(TargetKind::Ssao),
                    radius: params.ssao_radius,
                    bias: params.ssao_bias,
                    extent,
                },
            );
        }

        if features.bloom {
            self.bloom.add_to_graph(
                graph,
                ctx,
                BloomPassData {
                    source: features.hdr_source(),
                    source_handle: hdr_handle,
                    bloom_handle: self.targets.handle(TargetKind::Bloom),
                    threshold: params.bloom_threshold,
                    softness: params.bloom_softness,
                    extent: self.targets.bloom_extent(),
                },
            );
        }

        self.composite.add_to_graph(
            graph,
            ctx,
            CompositePassData {
                source: features.hdr_source(),
                source_handle: hdr_handle,
                bloom_handle: self.targets.handle(TargetKind::BloomBlur),
                ssao_handle: self.targets.handle(TargetKind::SsaoBlur),
                exposure: params.exposure,
                bloom_strength: if features.bloom { params.bloom_strength } else { 0.0 },
                enable_ssao: features.ssao,
                extent,
            },
        );

        let ldr = self.targets.get(TargetKind::Ldr);
        self.present.add_to_graph(
            graph,
            ctx,
            PresentPassData {
                ldr_image: registry.image(ldr.image)?.handle(),
                ldr_handle: ldr.handle,
                swapchain_image: inputs.swapchain_image,
                extent,
                enable_fxaa: features.fxaa,
            },
        );

        Ok(features)
    }

    fn register_resources(
        &self,
        graph: &mut RenderGraph<'_>,
        registry: &ResourceRegistry,
        inputs: &FrameInputs<'_>,
    ) -> anyhow::Result<()> {
        let (taa_output, taa_history) = self.taa_targets();
        let named = [
            (TargetKind::Hdr, RgNames::HDR),
            (TargetKind::Normal, RgNames::NORMAL),
            (TargetKind::Velocity, RgNames::VELOCITY),
            (TargetKind::Depth, RgNames::DEPTH),
            (TargetKind::Ldr, RgNames::LDR),
            (TargetKind::Ssao, RgNames::SSAO),
            (TargetKind::SsaoBlur, RgNames::SSAO_BLUR),
            (TargetKind::Bloom, RgNames::BLOOM),
            (TargetKind::BloomBlur, RgNames::BLOOM_BLUR),
            (taa_output, RgNames::TAA_OUTPUT),
            (taa_history, RgNames::TAA_HISTORY),
        ];
        for (kind, name) in named {
            self.targets.add_to_graph(graph, registry, kind, name)?;
        }
        self.shadow_map.add_to_graph(graph, registry)?;
        graph.add_swapchain_resource(
            RgNames::SWAPCHAIN,
            inputs.swapchain_image,
            inputs.swapchain_view,
            inputs.swapchain_format,
            inputs.swapchain_extent,
        );

        let black = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        };
        let far_depth = vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        };
        // 未遮挡
        let no_occlusion = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [1.0, 0.0, 0.0, 0.0],
            },
        };
        graph.set_clear_value(RgNames::HDR, black);
        graph.set_clear_value(RgNames::SWAPCHAIN, black);
        graph.set_clear_value(RgNames::DEPTH, far_depth);
        graph.set_clear_value(RgNames::SSAO, no_occlusion);
        graph.set_clear_value(RgNames::SSAO_BLUR, no_occlusion);
        for cascade in 0..CSM_CASCADE_COUNT {
            graph.set_clear_value(&RgNames::shadow_cascade(cascade), far_depth);
        }
        Ok(())
    }

    /// (本帧写入, 上一帧结果)
    fn taa_targets(&self) -> (TargetKind, TargetKind) {
        let kinds = [TargetKind::TaaA, TargetKind::TaaB];
        (kinds[self.taa_history.write_index()], kinds[self.taa_history.read_index()])
    }
}
// getters
impl Renderer {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.targets.extent()
    }

    #[inline]
    pub fn has_skybox(&self) -> bool {
        self.environment.has_skybox()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_frame_pass_order() {
        let features = FrameFeatures::new(&UiParams::default(), true, true);
        let names = features.pass_names();
        assert_eq!(names.first().map(String::as_str), Some("ClusterBuildPass"));
        let geometry = names.iter().position(|n| n == "GeometryPass").unwrap();
        let shadow_last = names.iter().position(|n| n == "ShadowPass_3").unwrap();
        let composite = names.iter().position(|n| n == "CompositePass").unwrap();
        assert!(shadow_last < geometry);
        assert!(geometry < composite);
        assert_eq!(names.last().map(String::as_str), Some("FXAAPass"));
    }

    #[test]
    fn disabled_features_drop_passes() {
        let params = UiParams {
            enable_ssao: false,
            enable_fxaa: false,
            enable_cluster_cull: false,
            bloom_strength: 0.0,
            ..Default::default()
        };
        let features = FrameFeatures::new(&params, false, false);
        assert!(!features.bloom);
        assert_eq!(
            features.pass_names(),
            [
                "ShadowPass_0",
                "ShadowPass_1",
                "ShadowPass_2",
                "ShadowPass_3",
                "GeometryPass",
                "CompositePass",
                "FinalCopy"
            ]
        );
    }

    #[test]
    fn taa_redirects_hdr_source() {
        let mut params = UiParams::default();
        assert_eq!(FrameFeatures::new(&params, false, false).hdr_source(), RgNames::HDR);
        params.enable_taa = true;
        let features = FrameFeatures::new(&params, false, false);
        assert_eq!(features.hdr_source(), RgNames::TAA_OUTPUT);
        let names = features.pass_names();
        let taa = names.iter().position(|n| n == "TAAPass").unwrap();
        let geometry = names.iter().position(|n| n == "GeometryPass").unwrap();
        assert_eq!(taa, geometry + 1);
    }

    #[test]
    fn skybox_requires_loaded_texture() {
        let params = UiParams::default();
        assert!(!FrameFeatures::new(&params, false, false).skybox);
        assert!(FrameFeatures::new(&params, false, true).skybox);
    }
}
