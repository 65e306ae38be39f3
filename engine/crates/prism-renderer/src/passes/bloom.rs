use ash::vk;
use prism_gfx::gfx::Gfx;
use prism_render_graph::{graph::RenderGraph, pass::RgPassDesc};
use prism_render_interface::{
    bindless::BindlessHandle,
    resource_registry::{GraphicsPipelineHandle, ResourceRegistry},
};

use crate::{
    passes::{
        PassContext, create_fullscreen_pipeline, draw_fullscreen, push,
        push_constants::{BloomPushConstants, BlurPushConstants},
    },
    render_targets::{HDR_FORMAT, RgNames},
};

/// bloom.frag 中的分支
const MODE_EXTRACT: u32 = 0;
const MODE_BLUR: u32 = 1;

#[derive(Copy, Clone)]
pub struct BloomPassData<'a> {
    /// HDR 输入在 graph 中的名字，开启 TAA 时为 TAA 的输出
    pub source: &'a str,
    pub source_handle: BindlessHandle,
    pub bloom_handle: BindlessHandle,
    pub threshold: f32,
    pub softness: f32,
    /// 1/4 分辨率
    pub extent: vk::Extent2D,
}

/// 亮部提取 + 高斯模糊，均在 1/4 分辨率下进行
pub struct BloomPass {
    extract_pipeline: GraphicsPipelineHandle,
    blur_pipeline: GraphicsPipelineHandle,
}
impl BloomPass {
    pub fn new(gfx: &Gfx, registry: &mut ResourceRegistry) -> anyhow::Result<Self> {
        let extract_pipeline =
            create_fullscreen_pipeline::<BloomPushConstants>(gfx, registry, "bloom-extract", "bloom.frag", HDR_FORMAT)?;
        let blur_pipeline =
            create_fullscreen_pipeline::<BlurPushConstants>(gfx, registry, "bloom-blur", "bloom.frag", HDR_FORMAT)?;
        Ok(Self {
            extract_pipeline,
            blur_pipeline,
        })
    }

    pub fn add_to_graph<'a>(&'a self, graph: &mut RenderGraph<'a>, ctx: PassContext<'a>, data: BloomPassData<'a>) {
        let desc = RgPassDesc::raster("BloomPass")
            .read(data.source)
            .write(RgNames::BLOOM)
            .clear_outputs(true);
        graph.add_pass(desc, move |cmd| {
            let pipeline = ctx.bind_graphics(cmd, self.extract_pipeline)?;
            push(
                cmd,
                pipeline.layout(),
                &BloomPushConstants {
                    input_handle: data.source_handle.index(),
                    mode: MODE_EXTRACT,
                    threshold: data.threshold,
                    softness: data.softness,
                },
            );
            draw_fullscreen(cmd, data.extent);
            Ok(())
        });

        let desc = RgPassDesc::raster("BloomBlurPass")
            .read(RgNames::BLOOM)
            .write(RgNames::BLOOM_BLUR)
            .clear_outputs(true);
        graph.add_pass(desc, move |cmd| {
            let pipeline = ctx.bind_graphics(cmd, self.blur_pipeline)?;
            push(
                cmd,
                pipeline.layout(),
                &BlurPushConstants {
                    input_handle: data.bloom_handle.index(),
                    mode: MODE_BLUR,
                },
            );
            draw_fullscreen(cmd, data.extent);
            Ok(())
        });
    }
}
