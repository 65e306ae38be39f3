//! clustered lighting：先把视锥划分为 16×9×24 个 cluster 并计算 AABB，再把光源分配到 cluster

use ash::vk;
use glam::{Mat4, uvec3};
use prism_gfx::{
    commands::{
        barrier::{GfxBarrierMask, GfxBufferBarrier},
        command_buffer::GfxCommandBuffer,
    },
    gfx::Gfx,
    resources::buffer::GfxBuffer,
};
use prism_render_graph::{graph::RenderGraph, pass::RgPassDesc};
use prism_render_interface::{
    bindless::BindlessHandle,
    gpu_types::{CLUSTER_COUNT, CLUSTER_GRID_X, CLUSTER_GRID_Y, CLUSTER_GRID_Z},
    resource_registry::{ComputePipelineHandle, ResourceRegistry},
    scene_gpu_state::FrameBufferHandles,
};

use crate::passes::{
    PassContext, create_compute_pipeline, group_count_64, push,
    push_constants::{ClusterBuildPushConstants, ClusterCullPushConstants},
};

fn buffer_barrier(cmd: &GfxCommandBuffer, buffers: &[&GfxBuffer], mask: GfxBarrierMask) {
    let barriers = buffers
        .iter()
        .map(|buffer| GfxBufferBarrier::new().mask(mask).buffer(buffer.vk_buffer(), 0, vk::WHOLE_SIZE))
        .collect::<Vec<_>>();
    cmd.buffer_memory_barrier(vk::DependencyFlags::empty(), &barriers);
}

const TRANSFER_TO_COMPUTE: GfxBarrierMask = GfxBarrierMask {
    src_stage: vk::PipelineStageFlags2::TRANSFER,
    dst_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
    src_access: vk::AccessFlags2::TRANSFER_WRITE,
    dst_access: vk::AccessFlags2::from_raw(
        vk::AccessFlags2::SHADER_STORAGE_READ.as_raw() | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
    ),
};

pub struct ClusterBuildPassData<'a> {
    pub cluster_handle: BindlessHandle,
    pub scene_handle: BindlessHandle,
    pub cluster_buffer: &'a GfxBuffer,
}

pub struct ClusterCullPassData<'a> {
    pub cluster_handle: BindlessHandle,
    pub handles: FrameBufferHandles,
    pub light_count: u32,
    /// 未带 jitter 的 view 矩阵
    pub view: Mat4,
    pub cluster_grid_buffer: &'a GfxBuffer,
    pub light_index_buffer: &'a GfxBuffer,
    pub atomic_buffer: &'a GfxBuffer,
}

pub struct ClusterPasses {
    build_pipeline: ComputePipelineHandle,
    cull_pipeline: ComputePipelineHandle,
}
// new & init
impl ClusterPasses {
    pub fn new(gfx: &Gfx, registry: &mut ResourceRegistry) -> anyhow::Result<Self> {
        let build_pipeline =
            create_compute_pipeline::<ClusterBuildPushConstants>(gfx, registry, "cluster-build", "cluster_build.comp")?;
        let cull_pipeline =
            create_compute_pipeline::<ClusterCullPushConstants>(gfx, registry, "cluster-cull", "cluster_cull.comp")?;
        Ok(Self {
            build_pipeline,
            cull_pipeline,
        })
    }
}
// graph
impl ClusterPasses {
    /// 只在投影矩阵变化时需要
    pub fn add_build_to_graph<'a>(
        &'a self,
        graph: &mut RenderGraph<'a>,
        ctx: PassContext<'a>,
        data: ClusterBuildPassData<'a>,
    ) {
        graph.add_pass(RgPassDesc::compute("ClusterBuildPass"), move |cmd| {
            // 前几帧的 cluster cull 可能仍在读取
            buffer_barrier(
                cmd,
                &[data.cluster_buffer],
                GfxBarrierMask {
                    src_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                    dst_stage: vk::PipelineStageFlags2::TRANSFER,
                    src_access: vk::AccessFlags2::SHADER_STORAGE_READ,
                    dst_access: vk::AccessFlags2::TRANSFER_WRITE,
                },
            );
            cmd.cmd_fill_buffer(data.cluster_buffer, 0, vk::WHOLE_SIZE, 0);
            buffer_barrier(cmd, &[data.cluster_buffer], TRANSFER_TO_COMPUTE);

            let pipeline = ctx.bind_compute(cmd, self.build_pipeline)?;
            push(
                cmd,
                pipeline.layout(),
                &ClusterBuildPushConstants {
                    cluster_handle: data.cluster_handle.index(),
                    scene_handle: data.scene_handle.index(),
                    grid_x: CLUSTER_GRID_X,
                    grid_y: CLUSTER_GRID_Y,
                    grid_z: CLUSTER_GRID_Z,
                    _padding: 0,
                },
            );
            cmd.cmd_dispatch(uvec3(CLUSTER_GRID_X, CLUSTER_GRID_Y, CLUSTER_GRID_Z));

            buffer_barrier(
                cmd,
                &[data.cluster_buffer],
                GfxBarrierMask {
                    src_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                    dst_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                    src_access: vk::AccessFlags2::SHADER_STORAGE_WRITE,
                    dst_access: vk::AccessFlags2::SHADER_STORAGE_READ,
                },
            );
            Ok(())
        });
    }

    pub fn add_cull_to_graph<'a>(&'a self, graph: &mut RenderGraph<'a>, ctx: PassContext<'a>, data: ClusterCullPassData<'a>) {
        graph.add_pass(RgPassDesc::compute("ClusterCullPass"), move |cmd| {
            cmd.cmd_fill_buffer(data.atomic_buffer, 0, vk::WHOLE_SIZE, 0);
            buffer_barrier(cmd, &[data.atomic_buffer], TRANSFER_TO_COMPUTE);

            let pipeline = ctx.bind_compute(cmd, self.cull_pipeline)?;
            push(
                cmd,
                pipeline.layout(),
                &ClusterCullPushConstants {
                    cluster_handle: data.cluster_handle.index(),
                    cluster_grid_handle: data.handles.cluster_grid.index(),
                    light_index_handle: data.handles.light_index.index(),
                    light_handle: data.handles.light.index(),
                    atomic_handle: data.handles.cluster_atomic.index(),
                    light_count: data.light_count,
                    _padding: [0; 2],
                    view: data.view,
                },
            );
            cmd.cmd_dispatch(uvec3(group_count_64(CLUSTER_COUNT), 1, 1));

            buffer_barrier(
                cmd,
                &[data.cluster_grid_buffer, data.light_index_buffer],
                GfxBarrierMask {
                    src_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                    dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
                    src_access: vk::AccessFlags2::SHADER_STORAGE_WRITE,
                    dst_access: vk::AccessFlags2::SHADER_STORAGE_READ,
                },
            );
            Ok(())
        });
    }
}
