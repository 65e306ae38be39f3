//! 把 LDR 结果写入 swapchain：FXAA 或者直接 blit

use ash::vk;
use prism_gfx::gfx::Gfx;
use prism_render_graph::{graph::RenderGraph, pass::RgPassDesc};
use prism_render_interface::{
    bindless::BindlessHandle,
    resource_registry::{GraphicsPipelineHandle, ResourceRegistry},
};

use crate::{
    passes::{PassContext, create_fullscreen_pipeline, draw_fullscreen, push, push_constants::FxaaPushConstants},
    render_targets::RgNames,
};

#[derive(Copy, Clone)]
pub struct PresentPassData {
    pub ldr_image: vk::Image,
    pub ldr_handle: BindlessHandle,
    pub swapchain_image: vk::Image,
    pub extent: vk::Extent2D,
    pub enable_fxaa: bool,
}

pub struct PresentPass {
    fxaa_pipeline: GraphicsPipelineHandle,
}
impl PresentPass {
    pub fn new(gfx: &Gfx, registry: &mut ResourceRegistry, swapchain_format: vk::Format) -> anyhow::Result<Self> {
        let fxaa_pipeline =
            create_fullscreen_pipeline::<FxaaPushConstants>(gfx, registry, "fxaa", "fxaa.frag", swapchain_format)?;
        Ok(Self { fxaa_pipeline })
    }

    pub fn add_to_graph<'a>(&'a self, graph: &mut RenderGraph<'a>, ctx: PassContext<'a>, data: PresentPassData) {
        if data.enable_fxaa {
            self.add_fxaa(graph, ctx, data);
        } else {
            Self::add_final_copy(graph, data);
        }
    }

    fn add_fxaa<'a>(&'a self, graph: &mut RenderGraph<'a>, ctx: PassContext<'a>, data: PresentPassData) {
        let desc = RgPassDesc::raster("FXAAPass")
            .read(RgNames::LDR)
            .write(RgNames::SWAPCHAIN)
            .clear_outputs(true);
        graph.add_pass(desc, move |cmd| {
            let pipeline = ctx.bind_graphics(cmd, self.fxaa_pipeline)?;
            push(
                cmd,
                pipeline.layout(),
                &FxaaPushConstants {
                    input_handle: data.ldr_handle.index(),
                    _padding: 0,
                    inverse_screen_width: 1.0 / data.extent.width as f32,
                    inverse_screen_height: 1.0 / data.extent.height as f32,
                },
            );
            draw_fullscreen(cmd, data.extent);
            Ok(())
        });
    }

    /// LDR 与 swapchain 同格式、同尺寸，blit 相当于复制
    fn add_final_copy(graph: &mut RenderGraph<'_>, data: PresentPassData) {
        let desc = RgPassDesc::transfer("FinalCopy").read(RgNames::LDR).write(RgNames::SWAPCHAIN);
        graph.add_pass(desc, move |cmd| {
            let subresource = vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            };
            let corner = vk::Offset3D {
                x: data.extent.width as i32,
                y: data.extent.height as i32,
                z: 1,
            };
            let regions = [vk::ImageBlit2::default()
                .src_subresource(subresource)
                .src_offsets([vk::Offset3D::default(), corner])
                .dst_subresource(subresource)
                .dst_offsets([vk::Offset3D::default(), corner])];
            let blit = vk::BlitImageInfo2::default()
                .src_image(data.ldr_image)
                .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .dst_image(data.swapchain_image)
                .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .regions(&regions)
                .filter(vk::Filter::NEAREST);
            cmd.cmd_blit_image(&blit);
            Ok(())
        });
    }
}
