use ash::vk;
use prism_crate_tools::resource::PrismPath;
use prism_gfx::gfx::Gfx;
use prism_render_graph::{graph::RenderGraph, pass::RgPassDesc};
use prism_render_interface::{
    bindless::BindlessHandle,
    gpu_types::CSM_CASCADE_COUNT,
    resource_registry::{
        GraphicsPipelineHandle, GraphicsPipelineSpecs, PipelineLayoutSpecs, ResourceRegistry, VertexInput,
    },
    scene_gpu_state::FrameBufferHandles,
};

use crate::{
    passes::{PassContext, SceneDraw, push, push_constants::ShadowPushConstants},
    render_targets::{DEPTH_FORMAT, RgNames, ShadowMap},
};

#[derive(Copy, Clone)]
pub struct ShadowPassData<'a> {
    pub handles: FrameBufferHandles,
    pub material_handle: BindlessHandle,
    pub draw: SceneDraw<'a>,
}

/// CSM：每个 cascade 一个 depth-only pass，渲染到 shadow map 的对应 layer
pub struct ShadowPass {
    pipeline: GraphicsPipelineHandle,
}
impl ShadowPass {
    pub fn new(gfx: &Gfx, registry: &mut ResourceRegistry) -> anyhow::Result<Self> {
        let layout = registry.create_pipeline_layout(
            gfx,
            &PipelineLayoutSpecs {
                name: "shadow-layout".to_string(),
                push_constant_stages: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                push_constant_size: size_of::<ShadowPushConstants>() as u32,
            },
        )?;
        // 剔除正面以减轻 peter-panning
        let pipeline = registry.create_graphics_pipeline(
            gfx,
            &GraphicsPipelineSpecs {
                name: "shadow".to_string(),
                vertex_shader: PrismPath::shader_path("shadow.vert"),
                fragment_shader: PrismPath::shader_path("shadow.frag"),
                vertex_input: VertexInput::Mesh,
                color_formats: vec![],
                depth_format: Some(DEPTH_FORMAT),
                depth_compare_op: Some(vk::CompareOp::LESS),
                depth_write: true,
                cull_mode: vk::CullModeFlags::FRONT,
                blend_states: vec![],
                layout,
            },
        )?;
        Ok(Self { pipeline })
    }

    pub fn add_to_graph<'a>(&'a self, graph: &mut RenderGraph<'a>, ctx: PassContext<'a>, data: ShadowPassData<'a>) {
        for cascade in 0..CSM_CASCADE_COUNT {
            let desc = RgPassDesc::raster(format!("ShadowPass_{cascade}"))
                .write(RgNames::shadow_cascade(cascade))
                .clear_outputs(true);
            graph.add_pass(desc, move |cmd| {
                let pipeline = ctx.bind_graphics(cmd, self.pipeline)?;
                cmd.cmd_set_full_viewport(ShadowMap::extent());
                push(
                    cmd,
                    pipeline.layout(),
                    &ShadowPushConstants {
                        scene_handle: data.handles.scene.index(),
                        instance_handle: data.handles.instance.index(),
                        material_handle: data.material_handle.index(),
                        cascade_index: cascade as u32,
                    },
                );
                data.draw.record(cmd);
                Ok(())
            });
        }
    }
}
