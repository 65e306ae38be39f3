//! imgui 的 Vulkan 后端
//!
//! - [`gui_host::GuiHost`]：imgui context、字体与输入
//! - [`gui_backend::GuiBackend`]：把 draw data 转换为每帧的 mesh 与绘制命令
//! - [`gui_pass::GuiPass`]：在 render graph 末尾把 UI 叠加到 swapchain 上
//!
//! 纹理通过 bindless 索引访问，imgui 的 `TextureId` 直接保存 bindless handle

pub mod gui_backend;
pub mod gui_host;
pub mod gui_mesh;
pub mod gui_pass;
pub mod gui_vertex_layout;
