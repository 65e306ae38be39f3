use ash::vk;
use prism_gfx::{gfx::Gfx, resources::buffer::GfxBuffer};
use prism_render_interface::frame_counter::FrameLabel;

use crate::gui_vertex_layout::GuiVertex;

/// buffer 的最小容量（元素个数）
const MIN_CAPACITY: usize = 4096;

/// 容量不足时扩展到 2 的幂，避免每帧重新分配
pub fn grow_capacity(required: usize, current: usize) -> usize {
    if required <= current {
        current
    } else {
        required.next_power_of_two().max(MIN_CAPACITY)
    }
}

/// 某一帧 imgui 绘制所需的 vertex buffer 和 index buffer
///
/// 两者都是 host visible 的 mapped buffer，CPU 直接写入，提交之前对 GPU 可见
pub struct GuiMesh {
    frame_label: FrameLabel,

    vertex_buffer: Option<GfxBuffer>,
    vertex_capacity: usize,

    index_buffer: Option<GfxBuffer>,
    index_capacity: usize,
}
// new & init
impl GuiMesh {
    pub fn new(frame_label: FrameLabel) -> Self {
        Self {
            frame_label,
            vertex_buffer: None,
            vertex_capacity: 0,
            index_buffer: None,
            index_capacity: 0,
        }
    }
}
// tools
impl GuiMesh {
    /// 只能在该帧的 fence signal 之后调用
    pub fn upload(&mut self, gfx: &Gfx, vertices: &[GuiVertex], indices: &[imgui::DrawIdx]) -> anyhow::Result<()> {
        let _span = tracy_client::span!("GuiMesh::upload");

        if vertices.is_empty() || indices.is_empty() {
            return Ok(());
        }

        let vertex_capacity = grow_capacity(vertices.len(), self.vertex_capacity);
        if self.vertex_buffer.is_none() || vertex_capacity != self.vertex_capacity {
            self.vertex_buffer = Some(GfxBuffer::new(
                gfx,
                (vertex_capacity * size_of::<GuiVertex>()) as vk::DeviceSize,
                vk::BufferUsageFlags::VERTEX_BUFFER,
                None,
                true,
                format!("[{}]imgui-vertex", self.frame_label),
            )?);
            self.vertex_capacity = vertex_capacity;
        }

        let index_capacity = grow_capacity(indices.len(), self.index_capacity);
        if self.index_buffer.is_none() || index_capacity != self.index_capacity {
            self.index_buffer = Some(GfxBuffer::new(
                gfx,
                (index_capacity * size_of::<imgui::DrawIdx>()) as vk::DeviceSize,
                vk::BufferUsageFlags::INDEX_BUFFER,
                None,
                true,
                format!("[{}]imgui-index", self.frame_label),
            )?);
            self.index_capacity = index_capacity;
        }

        if let Some(buffer) = &self.vertex_buffer {
            buffer.transfer_data_by_mmap(0, vertices)?;
        }
        if let Some(buffer) = &self.index_buffer {
            buffer.transfer_data_by_mmap(0, indices)?;
        }
        Ok(())
    }
}
// getters
impl GuiMesh {
    #[inline]
    pub fn vertex_buffer(&self) -> Option<&GfxBuffer> {
        self.vertex_buffer.as_ref()
    }

    #[inline]
    pub fn index_buffer(&self) -> Option<&GfxBuffer> {
        self.index_buffer.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_grows_to_power_of_two() {
        assert_eq!(grow_capacity(10, 0), MIN_CAPACITY);
        assert_eq!(grow_capacity(5000, MIN_CAPACITY), 8192);
        assert_eq!(grow_capacity(100, 8192), 8192);
        assert_eq!(grow_capacity(8193, 8192), 16384);
    }
}
