use ash::vk;
use glam::Mat4;
use prism_crate_tools::resource::PrismPath;
use prism_gfx::{gfx::Gfx, pipelines::graphics_pipeline::GfxGraphicsPipelineCreateInfo};
use prism_render_graph::{graph::RenderGraph, pass::RgPassDesc};
use prism_render_interface::{
    bindless::BindlessHandle,
    frame_counter::FrameLabel,
    resource_registry::{
        GraphicsPipelineHandle, GraphicsPipelineSpecs, PipelineLayoutSpecs, ResourceRegistry, VertexInput,
    },
};

use crate::{gui_backend::GuiBackend, gui_vertex_layout::GuiVertex};

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GuiPushConstants {
    pub ortho: Mat4,
    pub texture_handle: u32,
    pub _padding: [u32; 3],
}

/// imgui 坐标系（左上角为原点、y 向下）到 NDC 的正交投影
pub fn gui_projection(display_pos: [f32; 2], display_size: [f32; 2]) -> Mat4 {
    Mat4::orthographic_rh(
        display_pos[0],
        display_pos[0] + display_size[0],
        display_pos[1],
        display_pos[1] + display_size[1],
        -1.0,
        1.0,
    )
}

/// 把 UI 叠加到 swapchain 上，使用 LOAD 保留之前 pass 的结果
pub struct GuiPass {
    pipeline: GraphicsPipelineHandle,
}
// new & init
impl GuiPass {
    pub fn new(gfx: &Gfx, registry: &mut ResourceRegistry, color_format: vk::Format) -> anyhow::Result<Self> {
        let layout = registry.create_pipeline_layout(
            gfx,
            &PipelineLayoutSpecs {
                name: "uipass-layout".to_string(),
                push_constant_stages: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                push_constant_size: size_of::<GuiPushConstants>() as u32,
            },
        )?;
        let pipeline = registry.create_graphics_pipeline(
            gfx,
            &GraphicsPipelineSpecs {
                name: "uipass".to_string(),
                vertex_shader: PrismPath::shader_path("imgui.vert"),
                fragment_shader: PrismPath::shader_path("imgui.frag"),
                vertex_input: VertexInput::Custom {
                    bindings: GuiVertex::binding_desc(),
                    attributes: GuiVertex::attribute_desc(),
                },
                color_formats: vec![color_format],
                depth_format: None,
                depth_compare_op: None,
                depth_write: false,
                cull_mode: vk::CullModeFlags::NONE,
                blend_states: vec![GfxGraphicsPipelineCreateInfo::alpha_blend_state()],
                layout,
            },
        )?;
        Ok(Self { pipeline })
    }
}
// graph
impl GuiPass {
    /// 不读取任何资源，只写入 `target`（swapchain）
    #[allow(clippy::too_many_arguments)]
    pub fn add_to_graph<'a>(
        &'a self,
        graph: &mut RenderGraph<'a>,
        registry: &'a ResourceRegistry,
        bindless_set: vk::DescriptorSet,
        backend: &'a GuiBackend,
        frame_label: FrameLabel,
        target: &str,
        extent: vk::Extent2D,
    ) {
        let frame_data = backend.frame_data(frame_label);
        let mesh = backend.mesh(frame_label);
        let (Some(vertex_buffer), Some(index_buffer)) = (mesh.vertex_buffer(), mesh.index_buffer()) else {
            return;
        };
        if frame_data.commands.is_empty() {
            return;
        }

        let desc = RgPassDesc::raster("UIPass").write(target).clear_outputs(false);
        graph.add_pass(desc, move |cmd| {
            let pipeline = registry.graphics_pipeline(self.pipeline)?;
            let layout = pipeline.layout();
            cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline.handle());
            cmd.cmd_bind_descriptor_sets(vk::PipelineBindPoint::GRAPHICS, layout.handle(), 0, &[bindless_set]);
            cmd.cmd_set_full_viewport(extent);

            cmd.cmd_bind_index_buffer(index_buffer, 0, vk::IndexType::UINT16);
            cmd.cmd_bind_vertex_buffers(0, &[vertex_buffer.vk_buffer()], &[0]);

            let mut push_constant = GuiPushConstants {
                ortho: gui_projection(frame_data.display_pos, frame_data.display_size),
                texture_handle: BindlessHandle::NULL.index(),
                _padding: [0; 3],
            };

            // 缓存之前已经加载过的 texture
            let mut last_texture: Option<BindlessHandle> = None;
            for command in &frame_data.commands {
                cmd.cmd_set_scissor(0, std::slice::from_ref(&command.scissor));

                if last_texture != Some(command.texture) {
                    push_constant.texture_handle = command.texture.index();
                    cmd.cmd_push_constants(
                        layout.handle(),
                        layout.push_constant_stages(),
                        0,
                        bytemuck::bytes_of(&push_constant),
                    );
                    last_texture = Some(command.texture);
                }

                cmd.cmd_draw_indexed(command.index_count, command.first_index, 1, 0, command.vertex_offset);
            }
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec3, Vec4Swizzles};

    use super::*;

    #[test]
    fn push_constant_size() {
        assert_eq!(size_of::<GuiPushConstants>(), 80);
    }

    #[test]
    fn projection_maps_corners_to_ndc() {
        let proj = gui_projection([0.0, 0.0], [800.0, 600.0]);
        let top_left = proj * Vec3::new(0.0, 0.0, 0.0).extend(1.0);
        let bottom_right = proj * Vec3::new(800.0, 600.0, 0.0).extend(1.0);
        assert!((top_left.xy() - glam::vec2(-1.0, -1.0)).length() < 1e-5);
        assert!((bottom_right.xy() - glam::vec2(1.0, 1.0)).length() < 1e-5);
    }
}
