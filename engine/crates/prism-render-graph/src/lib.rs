//! 每帧重新构建的 render graph
//!
//! - 资源全部由外部创建，graph 只负责跟踪 layout
//! - pass 的插入顺序就是执行顺序
//! - 每个 pass 执行之前自动插入 image barrier，需要时开启 dynamic rendering
//!
//! ```ignore
//! let mut graph = RenderGraph::new();
//! graph.add_external_resource("HDR", image, view, format, extent, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
//! graph.add_swapchain_resource("Swapchain", sc_image, sc_view, sc_format, sc_extent);
//! graph.add_pass(RgPassDesc::raster("Geometry").write("HDR").clear_outputs(true), |cmd| { ... });
//! graph.add_pass(RgPassDesc::raster("Composite").read("HDR").write("Swapchain"), |cmd| { ... });
//! graph.execute(&cmd)?;
//! ```

pub mod graph;
pub mod pass;
pub mod planner;
pub mod resource;
pub mod resource_state;
