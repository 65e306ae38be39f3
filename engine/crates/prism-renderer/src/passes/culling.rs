use ash::vk;
use glam::uvec3;
use prism_gfx::{
    commands::barrier::{GfxBarrierMask, GfxBufferBarrier},
    gfx::Gfx,
    resources::buffer::GfxBuffer,
};
use prism_render_graph::{graph::RenderGraph, pass::RgPassDesc};
use prism_render_interface::{
    resource_registry::{ComputePipelineHandle, ResourceRegistry},
    scene_gpu_state::FrameBufferHandles,
};

use crate::passes::{PassContext, create_compute_pipeline, group_count_64, push, push_constants::CullingPushConstants};

pub struct CullingPassData<'a> {
    pub handles: FrameBufferHandles,
    pub indirect_buffer: &'a GfxBuffer,
    pub instance_count: u32,
}

/// 在 compute shader 中按视锥剔除：不可见实例的 indirect 命令 instanceCount 置 0
pub struct CullingPass {
    pipeline: ComputePipelineHandle,
}
impl CullingPass {
    pub fn new(gfx: &Gfx, registry: &mut ResourceRegistry) -> anyhow::Result<Self> {
        let pipeline = create_compute_pipeline::<CullingPushConstants>(gfx, registry, "culling", "cull.comp")?;
        Ok(Self { pipeline })
    }

    pub fn add_to_graph<'a>(&'a self, graph: &mut RenderGraph<'a>, ctx: PassContext<'a>, data: CullingPassData<'a>) {
        graph.add_pass(RgPassDesc::compute("CullingPass"), move |cmd| {
            if data.instance_count == 0 {
                return Ok(());
            }
            let pipeline = ctx.bind_compute(cmd, self.pipeline)?;
            push(
                cmd,
                pipeline.layout(),
                &CullingPushConstants {
                    scene_handle: data.handles.scene.index(),
                    instance_handle: data.handles.instance.index(),
                    indirect_handle: data.handles.indirect.index(),
                    instance_count: data.instance_count,
                },
            );
            cmd.cmd_dispatch(uvec3(group_count_64(data.instance_count), 1, 1));

            cmd.buffer_memory_barrier(
                vk::DependencyFlags::empty(),
                &[GfxBufferBarrier::new()
                    .mask(GfxBarrierMask {
                        src_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                        dst_stage: vk::PipelineStageFlags2::DRAW_INDIRECT,
                        src_access: vk::AccessFlags2::SHADER_WRITE,
                        dst_access: vk::AccessFlags2::INDIRECT_COMMAND_READ,
                    })
                    .buffer(data.indirect_buffer.vk_buffer(), 0, vk::WHOLE_SIZE)],
            );
            Ok(())
        });
    }
}
