use ash::vk;
use prism_crate_tools::resource::PrismPath;
use prism_gfx::gfx::Gfx;
use prism_render_graph::{graph::RenderGraph, pass::RgPassDesc};
use prism_render_interface::{
    bindless::BindlessHandle,
    resource_registry::{
        GraphicsPipelineHandle, GraphicsPipelineSpecs, PipelineLayoutSpecs, ResourceRegistry, VertexInput,
    },
    scene_gpu_state::FrameBufferHandles,
};

use crate::{
    passes::{
        PassContext, SceneDraw, push,
        push_constants::{GeometryPushConstants, SkyboxPushConstants},
    },
    render_targets::{DEPTH_FORMAT, HDR_FORMAT, RgNames, VELOCITY_FORMAT},
};

/// HDR color、法线、速度
const GEOMETRY_COLOR_FORMATS: [vk::Format; 3] = [HDR_FORMAT, HDR_FORMAT, VELOCITY_FORMAT];

/// 天空盒使用的立方体，顶点在 shader 中生成
const SKYBOX_VERTEX_COUNT: u32 = 36;

#[derive(Copy, Clone)]
pub struct GeometryPassData<'a> {
    pub handles: FrameBufferHandles,
    pub material_handle: BindlessHandle,
    pub draw: SceneDraw<'a>,
    /// `None` 时不绘制天空盒
    pub skybox: Option<BindlessHandle>,
    pub extent: vk::Extent2D,
}

/// forward PBR，同时输出 TAA 与 SSAO 需要的法线和速度
pub struct GeometryPass {
    pbr_pipeline: GraphicsPipelineHandle,
    skybox_pipeline: GraphicsPipelineHandle,
}
// new & init
impl GeometryPass {
    pub fn new(gfx: &Gfx, registry: &mut ResourceRegistry) -> anyhow::Result<Self> {
        let pbr_layout = registry.create_pipeline_layout(
            gfx,
            &PipelineLayoutSpecs {
                name: "pbr-layout".to_string(),
                push_constant_stages: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                push_constant_size: size_of::<GeometryPushConstants>() as u32,
            },
        )?;
        let pbr_pipeline = registry.create_graphics_pipeline(
            gfx,
            &GraphicsPipelineSpecs {
                name: "pbr".to_string(),
                vertex_shader: PrismPath::shader_path("pbr.vert"),
                fragment_shader: PrismPath::shader_path("pbr.frag"),
                vertex_input: VertexInput::Mesh,
                color_formats: GEOMETRY_COLOR_FORMATS.to_vec(),
                depth_format: Some(DEPTH_FORMAT),
                depth_compare_op: Some(vk::CompareOp::LESS),
                depth_write: true,
                cull_mode: vk::CullModeFlags::BACK,
                blend_states: vec![],
                layout: pbr_layout,
            },
        )?;

        let skybox_layout = registry.create_pipeline_layout(
            gfx,
            &PipelineLayoutSpecs {
                name: "skybox-layout".to_string(),
                push_constant_stages: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                push_constant_size: size_of::<SkyboxPushConstants>() as u32,
            },
        )?;
        // 深度被清除为 1.0，天空盒写在最远处，之后的几何体可以正常覆盖
        let skybox_pipeline = registry.create_graphics_pipeline(
            gfx,
            &GraphicsPipelineSpecs {
                name: "skybox".to_string(),
                vertex_shader: PrismPath::shader_path("skybox.vert"),
                fragment_shader: PrismPath::shader_path("skybox.frag"),
                vertex_input: VertexInput::None,
                color_formats: GEOMETRY_COLOR_FORMATS.to_vec(),
                depth_format: Some(DEPTH_FORMAT),
                depth_compare_op: Some(vk::CompareOp::LESS_OR_EQUAL),
                depth_write: false,
                cull_mode: vk::CullModeFlags::NONE,
                blend_states: vec![],
                layout: skybox_layout,
            },
        )?;

        Ok(Self {
            pbr_pipeline,
            skybox_pipeline,
        })
    }
}
// graph
impl GeometryPass {
    pub fn add_to_graph<'a>(&'a self, graph: &mut RenderGraph<'a>, ctx: PassContext<'a>, data: GeometryPassData<'a>) {
        let desc = RgPassDesc::raster("GeometryPass")
            .write(RgNames::HDR)
            .write(RgNames::NORMAL)
            .write(RgNames::VELOCITY)
            .write(RgNames::DEPTH)
            .clear_outputs(true);

        graph.add_pass(desc, move |cmd| {
            cmd.cmd_set_full_viewport(data.extent);

            if let Some(skybox) = data.skybox {
                let pipeline = ctx.bind_graphics(cmd, self.skybox_pipeline)?;
                push(
                    cmd,
                    pipeline.layout(),
                    &SkyboxPushConstants {
                        scene_handle: data.handles.scene.index(),
                        skybox_handle: skybox.index(),
                    },
                );
                cmd.cmd_draw(SKYBOX_VERTEX_COUNT, 1, 0, 0);
            }

            let pipeline = ctx.bind_graphics(cmd, self.pbr_pipeline)?;
            push(
                cmd,
                pipeline.layout(),
                &GeometryPushConstants {
                    scene_handle: data.handles.scene.index(),
                    instance_handle: data.handles.instance.index(),
                    material_handle: data.material_handle.index(),
                    _padding: 0,
                },
            );
            data.draw.record(cmd);
            Ok(())
        });
    }
}
