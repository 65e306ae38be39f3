use std::mem::offset_of;

use ash::vk;

/// AoS: Array of Structs，与 `imgui::DrawVert` 的内存布局一致
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GuiVertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
    /// R8G8B8A8
    pub color: [u8; 4],
}
impl From<&imgui::DrawVert> for GuiVertex {
    fn from(v: &imgui::DrawVert) -> Self {
        Self {
            pos: v.pos,
            uv: v.uv,
            color: v.col,
        }
    }
}
impl GuiVertex {
    pub fn binding_desc() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn attribute_desc() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, uv) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R8G8B8A8_UNORM,
                offset: offset_of!(Self, color) as u32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_imgui() {
        assert_eq!(size_of::<GuiVertex>(), size_of::<imgui::DrawVert>());
        assert_eq!(size_of::<GuiVertex>(), 20);
        let offsets = GuiVertex::attribute_desc().iter().map(|a| a.offset).collect::<Vec<_>>();
        assert_eq!(offsets, [0, 8, 16]);
    }
}
