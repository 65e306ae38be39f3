//! 渲染器的各个 pass
//!
//! 每个 pass 持有自己的 pipeline handle，通过 `add_to_graph` 把回调注册到当帧的 render graph 上。
//! 回调只借用 pass 本身以及 [`PassContext`]，不持有任何 GPU 资源

pub mod bloom;
pub mod cluster;
pub mod composite;
pub mod culling;
pub mod geometry;
pub mod present;
pub mod push_constants;
pub mod shadow;
pub mod ssao;
pub mod taa;

use ash::vk;
use bytemuck::Pod;
use prism_asset::model::Model;
use prism_crate_tools::resource::PrismPath;
use prism_gfx::{
    commands::command_buffer::GfxCommandBuffer,
    gfx::Gfx,
    pipelines::{
        compute_pipeline::GfxComputePipeline, graphics_pipeline::GfxGraphicsPipeline,
        pipeline_layout::GfxPipelineLayout,
    },
    resources::buffer::GfxBuffer,
};
use prism_render_interface::{
    gpu_types::DrawIndexedIndirectCommand,
    resource_registry::{
        ComputePipelineHandle, ComputePipelineSpecs, GraphicsPipelineHandle, GraphicsPipelineSpecs,
        PipelineLayoutSpecs, ResourceRegistry, VertexInput,
    },
};

/// 录制 pass 时共享的只读上下文
#[derive(Copy, Clone)]
pub struct PassContext<'a> {
    pub registry: &'a ResourceRegistry,
    pub bindless_set: vk::DescriptorSet,
}
impl<'a> PassContext<'a> {
    /// 绑定 graphics pipeline 以及 set 0 上的 bindless descriptor set
    pub fn bind_graphics(
        &self,
        cmd: &GfxCommandBuffer,
        handle: GraphicsPipelineHandle,
    ) -> anyhow::Result<&'a GfxGraphicsPipeline> {
        let pipeline = self.registry.graphics_pipeline(handle)?;
        cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline.handle());
        cmd.cmd_bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            pipeline.layout().handle(),
            0,
            &[self.bindless_set],
        );
        Ok(pipeline)
    }

    pub fn bind_compute(
        &self,
        cmd: &GfxCommandBuffer,
        handle: ComputePipelineHandle,
    ) -> anyhow::Result<&'a GfxComputePipeline> {
        let pipeline = self.registry.compute_pipeline(handle)?;
        cmd.cmd_bind_pipeline(vk::PipelineBindPoint::COMPUTE, pipeline.handle());
        cmd.cmd_bind_descriptor_sets(
            vk::PipelineBindPoint::COMPUTE,
            pipeline.layout().handle(),
            0,
            &[self.bindless_set],
        );
        Ok(pipeline)
    }
}

/// push constant 总是从 offset 0 开始，覆盖 layout 声明的所有 stage
#[inline]
pub fn push<T: Pod>(cmd: &GfxCommandBuffer, layout: &GfxPipelineLayout, data: &T) {
    cmd.cmd_push_constants(layout.handle(), layout.push_constant_stages(), 0, bytemuck::bytes_of(data));
}

/// 当帧场景的 indirect 绘制：shadow 与 geometry pass 共用
#[derive(Copy, Clone)]
pub struct SceneDraw<'a> {
    pub model: Option<&'a Model>,
    pub indirect_buffer: &'a GfxBuffer,
    pub draw_count: u32,
}
impl SceneDraw<'_> {
    /// 绑定模型的 vertex/index buffer 并发出 indirect 绘制，没有可绘制的模型时什么也不做
    pub fn record(&self, cmd: &GfxCommandBuffer) {
        let Some(model) = self.model else {
            return;
        };
        let (Some(vertex_buffer), Some(index_buffer)) = (model.vertex_buffer(), model.index_buffer()) else {
            return;
        };
        if self.draw_count == 0 {
            return;
        }

        cmd.cmd_bind_vertex_buffers(0, &[vertex_buffer.vk_buffer()], &[0]);
        cmd.cmd_bind_index_buffer(index_buffer, 0, vk::IndexType::UINT32);
        cmd.cmd_draw_indexed_indirect(
            self.indirect_buffer,
            0,
            self.draw_count,
            size_of::<DrawIndexedIndirectCommand>() as u32,
        );
    }
}

/// 视口为 extent 的全屏三角形
#[inline]
pub fn draw_fullscreen(cmd: &GfxCommandBuffer, extent: vk::Extent2D) {
    cmd.cmd_set_full_viewport(extent);
    cmd.cmd_draw(3, 1, 0, 0);
}

/// 画到一个 color attachment 上、不使用深度的全屏 pass
pub fn create_fullscreen_pipeline<T: Pod>(
    gfx: &Gfx,
    registry: &mut ResourceRegistry,
    name: &str,
    fragment_shader: &str,
    color_format: vk::Format,
) -> anyhow::Result<GraphicsPipelineHandle> {
    let layout = registry.create_pipeline_layout(
        gfx,
        &PipelineLayoutSpecs {
            name: format!("{name}-layout"),
            push_constant_stages: vk::ShaderStageFlags::FRAGMENT,
            push_constant_size: size_of::<T>() as u32,
        },
    )?;
    registry.create_graphics_pipeline(
        gfx,
        &GraphicsPipelineSpecs {
            name: name.to_string(),
            vertex_shader: PrismPath::shader_path("post_process.vert"),
            fragment_shader: PrismPath::shader_path(fragment_shader),
            vertex_input: VertexInput::None,
            color_formats: vec![color_format],
            depth_format: None,
            depth_compare_op: None,
            depth_write: false,
            cull_mode: vk::CullModeFlags::NONE,
            blend_states: vec![],
            layout,
        },
    )
}

pub fn create_compute_pipeline<T: Pod>(
    gfx: &Gfx,
    registry: &mut ResourceRegistry,
    name: &str,
    shader: &str,
) -> anyhow::Result<ComputePipelineHandle> {
    let layout = registry.create_pipeline_layout(
        gfx,
        &PipelineLayoutSpecs {
            name: format!("{name}-layout"),
            push_constant_stages: vk::ShaderStageFlags::COMPUTE,
            push_constant_size: size_of::<T>() as u32,
        },
    )?;
    registry.create_compute_pipeline(
        gfx,
        &ComputePipelineSpecs {
            name: name.to_string(),
            shader: PrismPath::shader_path(shader),
            layout,
        },
    )
}

/// 以 64 为 workgroup 大小时需要的 group 数量
#[inline]
pub fn group_count_64(count: u32) -> u32 {
    count.div_ceil(64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_count_rounds_up() {
        assert_eq!(group_count_64(0), 0);
        assert_eq!(group_count_64(1), 1);
        assert_eq!(group_count_64(64), 1);
        assert_eq!(group_count_64(65), 2);
        assert_eq!(group_count_64(3456), 54);
    }
}
