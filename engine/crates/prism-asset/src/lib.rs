//! 资产加载
//!
//! 所有加载都是同步的：解析文件、上传顶点/索引、上传纹理并注册到 bindless 表，
//! 材质写入 [`SceneGpuState`](prism_render_interface::scene_gpu_state::SceneGpuState) 的材质表

pub mod gltf_loader;
pub mod loader;
pub mod model;
pub mod obj_loader;
pub mod texture_cache;
pub mod texture_path;

pub use prism_render_interface::material::Material;
