use ash::vk;
use prism_gfx::gfx::Gfx;
use prism_render_graph::{graph::RenderGraph, pass::RgPassDesc};
use prism_render_interface::{
    bindless::BindlessHandle,
    resource_registry::{GraphicsPipelineHandle, ResourceRegistry},
};

use crate::{
    passes::{PassContext, create_fullscreen_pipeline, draw_fullscreen, push, push_constants::TaaPushConstants},
    render_targets::{HDR_FORMAT, RgNames},
};

/// 两张历史纹理的读写关系，每帧翻转一次
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TaaHistory {
    /// 本帧写入的纹理下标，另一张是上一帧的结果
    write_index: usize,
}
impl TaaHistory {
    #[inline]
    pub fn flip(&mut self) {
        self.write_index ^= 1;
    }

    #[inline]
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    #[inline]
    pub fn read_index(&self) -> usize {
        self.write_index ^ 1
    }
}

#[derive(Copy, Clone)]
pub struct TaaPassData {
    pub current_handle: BindlessHandle,
    pub history_handle: BindlessHandle,
    pub velocity_handle: BindlessHandle,
    pub extent: vk::Extent2D,
}

/// 将当前帧与重投影的历史帧混合
///
/// 输出写入 `TAA_Output`，下一帧作为 `TAA_History` 读取
pub struct TaaPass {
    pipeline: GraphicsPipelineHandle,
}
impl TaaPass {
    pub fn new(gfx: &Gfx, registry: &mut ResourceRegistry) -> anyhow::Result<Self> {
        let pipeline = create_fullscreen_pipeline::<TaaPushConstants>(gfx, registry, "taa", "taa.frag", HDR_FORMAT)?;
        Ok(Self { pipeline })
    }

    pub fn add_to_graph<'a>(&'a self, graph: &mut RenderGraph<'a>, ctx: PassContext<'a>, data: TaaPassData) {
        let desc = RgPassDesc::raster("TAAPass")
            .read(RgNames::HDR)
            .read(RgNames::TAA_HISTORY)
            .read(RgNames::VELOCITY)
            .write(RgNames::TAA_OUTPUT)
            .clear_outputs(true);
        graph.add_pass(desc, move |cmd| {
            let pipeline = ctx.bind_graphics(cmd, self.pipeline)?;
            push(
                cmd,
                pipeline.layout(),
                &TaaPushConstants {
                    current_handle: data.current_handle.index(),
                    history_handle: data.history_handle.index(),
                    velocity_handle: data.velocity_handle.index(),
                    _padding: 0,
                },
            );
            draw_fullscreen(cmd, data.extent);
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_ping_pongs() {
        let mut history = TaaHistory::default();
        assert_eq!((history.write_index(), history.read_index()), (0, 1));
        history.flip();
        assert_eq!((history.write_index(), history.read_index()), (1, 0));
        history.flip();
        assert_eq!(history, TaaHistory::default());
    }
}
