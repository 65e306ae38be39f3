//! 各个 pass 的 push constant 布局，与 shader 中的声明逐字节对应
//!
//! 所有资源都以 bindless 索引的形式传入

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct CullingPushConstants {
    pub scene_handle: u32,
    pub instance_handle: u32,
    pub indirect_handle: u32,
    pub instance_count: u32,
}

/// 相机矩阵从 scene buffer 中读取
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct ClusterBuildPushConstants {
    pub cluster_handle: u32,
    pub scene_handle: u32,
    pub grid_x: u32,
    pub grid_y: u32,
    pub grid_z: u32,
    pub _padding: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct ClusterCullPushConstants {
    pub cluster_handle: u32,
    pub cluster_grid_handle: u32,
    pub light_index_handle: u32,
    pub light_handle: u32,
    pub atomic_handle: u32,
    pub light_count: u32,
    pub _padding: [u32; 2],
    pub view: Mat4,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct ShadowPushConstants {
    pub scene_handle: u32,
    pub instance_handle: u32,
    pub material_handle: u32,
    pub cascade_index: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct SkyboxPushConstants {
    pub scene_handle: u32,
    pub skybox_handle: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct GeometryPushConstants {
    pub scene_handle: u32,
    pub instance_handle: u32,
    pub material_handle: u32,
    pub _padding: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct SsaoPushConstants {
    pub normal_handle: u32,
    pub depth_handle: u32,
    pub noise_handle: u32,
    pub kernel_handle: u32,
    pub radius: f32,
    pub bias: f32,
}

/// SSAO blur 与 bloom blur 共用
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct BlurPushConstants {
    pub input_handle: u32,
    pub mode: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct BloomPushConstants {
    pub input_handle: u32,
    pub mode: u32,
    pub threshold: f32,
    pub softness: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct CompositePushConstants {
    pub hdr_handle: u32,
    pub bloom_handle: u32,
    pub ssao_handle: u32,
    pub exposure: f32,
    pub bloom_strength: f32,
    pub enable_ssao: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct TaaPushConstants {
    pub current_handle: u32,
    pub history_handle: u32,
    pub velocity_handle: u32,
    pub _padding: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct FxaaPushConstants {
    pub input_handle: u32,
    pub _padding: u32,
    pub inverse_screen_width: f32,
    pub inverse_screen_height: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_shader_declarations() {
        assert_eq!(size_of::<CullingPushConstants>(), 16);
        assert_eq!(size_of::<ClusterBuildPushConstants>(), 24);
        assert_eq!(size_of::<ClusterCullPushConstants>(), 96);
        assert_eq!(size_of::<ShadowPushConstants>(), 16);
        assert_eq!(size_of::<SkyboxPushConstants>(), 8);
        assert_eq!(size_of::<GeometryPushConstants>(), 16);
        assert_eq!(size_of::<SsaoPushConstants>(), 24);
        assert_eq!(size_of::<BlurPushConstants>(), 8);
        assert_eq!(size_of::<BloomPushConstants>(), 16);
        assert_eq!(size_of::<CompositePushConstants>(), 24);
        assert_eq!(size_of::<TaaPushConstants>(), 16);
        assert_eq!(size_of::<FxaaPushConstants>(), 16);
    }

    #[test]
    fn view_matrix_starts_after_handles() {
        let pc = ClusterCullPushConstants {
            view: Mat4::IDENTITY,
            light_count: 3,
            ..Default::default()
        };
        let bytes = bytemuck::bytes_of(&pc);
        assert_eq!(u32::from_ne_bytes(bytes[20..24].try_into().unwrap()), 3);
        assert_eq!(f32::from_ne_bytes(bytes[32..36].try_into().unwrap()), 1.0);
    }
}
