use ash::vk;
use prism_gfx::gfx::Gfx;
use prism_render_graph::{graph::RenderGraph, pass::RgPassDesc};
use prism_render_interface::{
    bindless::BindlessHandle,
    resource_registry::{GraphicsPipelineHandle, ResourceRegistry},
};

use crate::{
    passes::{PassContext, create_fullscreen_pipeline, draw_fullscreen, push, push_constants::CompositePushConstants},
    render_targets::RgNames,
};

#[derive(Copy, Clone)]
pub struct CompositePassData<'a> {
    pub source: &'a str,
    pub source_handle: BindlessHandle,
    pub bloom_handle: BindlessHandle,
    pub ssao_handle: BindlessHandle,
    pub exposure: f32,
    /// 关闭 bloom 时为 0
    pub bloom_strength: f32,
    pub enable_ssao: bool,
    pub extent: vk::Extent2D,
}

/// 曝光、tonemap 以及叠加 bloom 和 AO，输出到 LDR
pub struct CompositePass {
    pipeline: GraphicsPipelineHandle,
}
impl CompositePass {
    pub fn new(gfx: &Gfx, registry: &mut ResourceRegistry, ldr_format: vk::Format) -> anyhow::Result<Self> {
        let pipeline =
            create_fullscreen_pipeline::<CompositePushConstants>(gfx, registry, "composite", "composite.frag", ldr_format)?;
        Ok(Self { pipeline })
    }

    pub fn add_to_graph<'a>(&'a self, graph: &mut RenderGraph<'a>, ctx: PassContext<'a>, data: CompositePassData<'a>) {
        let desc = RgPassDesc::raster("CompositePass")
            .read(data.source)
            .read(RgNames::BLOOM_BLUR)
            .read(RgNames::SSAO_BLUR)
            .write(RgNames::LDR)
            .clear_outputs(true);
        graph.add_pass(desc, move |cmd| {
            let pipeline = ctx.bind_graphics(cmd, self.pipeline)?;
            push(
                cmd,
                pipeline.layout(),
                &CompositePushConstants {
                    hdr_handle: data.source_handle.index(),
                    bloom_handle: data.bloom_handle.index(),
                    ssao_handle: data.ssao_handle.index(),
                    exposure: data.exposure,
                    bloom_strength: data.bloom_strength,
                    enable_ssao: data.enable_ssao as u32,
                },
            );
            draw_fullscreen(cmd, data.extent);
            Ok(())
        });
    }
}
