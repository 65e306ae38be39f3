//! CPU 与 shader 共享的数据布局
//!
//! 所有结构体都是 `#[repr(C)]` 且没有隐式 padding，可以直接 memcpy 到 storage buffer 中。

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec4, Vec2, Vec3, Vec4};

pub const MAX_MESH_INSTANCES: usize = 10000;
pub const MAX_LIGHTS: usize = 256;
pub const MAX_MATERIALS: usize = 10000;

pub const CLUSTER_GRID_X: u32 = 16;
pub const CLUSTER_GRID_Y: u32 = 9;
pub const CLUSTER_GRID_Z: u32 = 24;
pub const CLUSTER_COUNT: u32 = CLUSTER_GRID_X * CLUSTER_GRID_Y * CLUSTER_GRID_Z;
/// 每个 cluster 的光源列表：1 个计数 + 最多 255 个索引
pub const MAX_LIGHTS_PER_CLUSTER: u32 = 255;
pub const LIGHT_INDEX_LIST_STRIDE: u32 = MAX_LIGHTS_PER_CLUSTER + 1;

pub const CSM_CASCADE_COUNT: usize = 4;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub tangent: Vec4,
    pub color: Vec4,
}
impl Vertex {
    pub fn binding_desc() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn attribute_desc() -> Vec<vk::VertexInputAttributeDescription> {
        let attr = |location: u32, format: vk::Format, offset: usize| vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        };
        vec![
            attr(0, vk::Format::R32G32B32_SFLOAT, std::mem::offset_of!(Vertex, position)),
            attr(1, vk::Format::R32G32B32_SFLOAT, std::mem::offset_of!(Vertex, normal)),
            attr(2, vk::Format::R32G32_SFLOAT, std::mem::offset_of!(Vertex, uv)),
            attr(3, vk::Format::R32G32B32A32_SFLOAT, std::mem::offset_of!(Vertex, tangent)),
            attr(4, vk::Format::R32G32B32A32_SFLOAT, std::mem::offset_of!(Vertex, color)),
        ]
    }
}

#[repr(u32)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum AlphaMode {
    #[default]
    Opaque = 0,
    Mask = 1,
    Blend = 2,
}
impl AlphaMode {
    #[inline]
    pub fn from_u32(v: u32) -> Self {
        match v {
            1 => Self::Mask,
            2 => Self::Blend,
            _ => Self::Opaque,
        }
    }
}

/// 材质的 GPU 形式，texture 字段为 bindless handle，0 表示未设置
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialGpu {
    pub base_color_factor: Vec4,
    pub emissive_factor: Vec4,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub alpha_cutoff: f32,
    pub alpha_mode: u32,
    pub base_color_texture: u32,
    pub normal_texture: u32,
    pub metallic_roughness_texture: u32,
    pub emissive_texture: u32,
    pub occlusion_texture: u32,
    pub double_sided: u32,
    pub _padding: [u32; 2],
}
impl Default for MaterialGpu {
    fn default() -> Self {
        Self {
            base_color_factor: Vec4::ONE,
            emissive_factor: Vec4::ZERO,
            metallic_factor: 0.5,
            roughness_factor: 0.5,
            alpha_cutoff: 0.5,
            alpha_mode: AlphaMode::Opaque as u32,
            base_color_texture: 0,
            normal_texture: 0,
            metallic_roughness_texture: 0,
            emissive_texture: 0,
            occlusion_texture: 0,
            double_sided: 0,
            _padding: [0; 2],
        }
    }
}
impl MaterialGpu {
    #[inline]
    pub fn alpha_mode(&self) -> AlphaMode {
        AlphaMode::from_u32(self.alpha_mode)
    }
}

/// position.w = 1 表示方向光，0 表示点光源
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Light {
    pub position: Vec4,
    /// xyz: 方向；w: 作用范围
    pub direction: Vec4,
    /// rgb: 颜色；a: 强度
    pub color: Vec4,
    /// 预留给 spot light 的角度等参数
    pub params: Vec4,
}
impl Light {
    #[inline]
    pub fn is_directional(&self) -> bool {
        self.position.w == 1.0
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshInstance {
    pub transform: Mat4,
    /// xyz: 世界空间包围球中心；w: 半径
    pub bounding_sphere: Vec4,
    pub material_index: u32,
    pub _padding: [u32; 3],
}

/// 与 `VkDrawIndexedIndirectCommand` 布局一致，stride 为 20 字节
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

/// view space 中 cluster 的 AABB
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Cluster {
    pub min: Vec4,
    pub max: Vec4,
}

/// 每帧更新的场景数据
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SceneData {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub inverse_view: Mat4,
    pub inverse_projection: Mat4,
    pub prev_view_projection: Mat4,

    pub camera_position: Vec4,
    /// xy: 当前帧的 TAA jitter（NDC）
    pub jitter: Vec4,

    pub frustum_planes: [Vec4; 6],

    pub cascade_view_projection: [Mat4; CSM_CASCADE_COUNT],
    pub cascade_splits: Vec4,

    pub light_count: u32,
    pub enable_headlamp: u32,
    pub visualize_cascades: u32,
    pub pcf_range: u32,

    pub shadow_bias: f32,
    pub shadow_normal_bias: f32,
    pub csm_lambda: f32,
    pub ibl_intensity: f32,

    pub irradiance_handle: u32,
    pub prefiltered_handle: u32,
    pub brdf_lut_handle: u32,
    pub skybox_handle: u32,

    pub shadow_map_handle: u32,
    pub cluster_handle: u32,
    pub cluster_grid_handle: u32,
    pub light_index_handle: u32,

    pub scene_handle: u32,
    pub instance_handle: u32,
    pub indirect_handle: u32,
    pub light_handle: u32,

    pub material_handle: u32,
    pub _padding: u32,
    pub enable_ssao: u32,
    pub enable_skybox: u32,

    /// xyz: cluster 网格尺寸
    pub grid_size: UVec4,

    pub near_plane: f32,
    pub far_plane: f32,
    pub screen_width: f32,
    pub screen_height: f32,
}
impl Default for SceneData {
    fn default() -> Self {
        let mut data = Self::zeroed();
        data.view = Mat4::IDENTITY;
        data.projection = Mat4::IDENTITY;
        data.view_projection = Mat4::IDENTITY;
        data.inverse_view = Mat4::IDENTITY;
        data.inverse_projection = Mat4::IDENTITY;
        data.prev_view_projection = Mat4::IDENTITY;
        data.grid_size = UVec4::new(CLUSTER_GRID_X, CLUSTER_GRID_Y, CLUSTER_GRID_Z, 0);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_match_shader_side() {
        assert_eq!(size_of::<Vertex>(), 64);
        assert_eq!(size_of::<MaterialGpu>(), 80);
        assert_eq!(size_of::<Light>(), 64);
        assert_eq!(size_of::<MeshInstance>(), 96);
        assert_eq!(size_of::<DrawIndexedIndirectCommand>(), 20);
        assert_eq!(size_of::<Cluster>(), 32);
        assert_eq!(size_of::<SceneData>() % 16, 0);
    }

    #[test]
    fn vertex_attributes_are_tightly_packed() {
        let offsets: Vec<u32> = Vertex::attribute_desc().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 32, 48]);
        assert_eq!(Vertex::binding_desc()[0].stride, 64);
    }

    #[test]
    fn alpha_mode_defaults_to_opaque() {
        assert_eq!(AlphaMode::from_u32(2), AlphaMode::Blend);
        assert_eq!(AlphaMode::from_u32(7), AlphaMode::Opaque);
        assert_eq!(MaterialGpu::default().alpha_mode(), AlphaMode::Opaque);
    }

    #[test]
    fn scene_data_default_carries_grid() {
        let data = SceneData::default();
        assert_eq!(data.grid_size.x * data.grid_size.y * data.grid_size.z, CLUSTER_COUNT);
        assert_eq!(CLUSTER_COUNT, 3456);
    }
}
