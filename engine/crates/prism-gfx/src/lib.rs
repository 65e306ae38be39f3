//! Vulkan GFX 抽象层
//!
//! 提供对 Vulkan API 的薄封装，包括设备管理、命令缓冲、资源、管线以及交换链。
//! 所有对象都通过显式的 [`gfx::Gfx`] 上下文创建，资源内部持有 `Rc<GfxDevice>`
//! 以及 `Rc<GfxMemAllocator>`，因此可以在 `Drop` 中自行释放。

pub mod basic {
    pub mod color;
}
pub mod commands {
    pub mod barrier;
    pub mod command_buffer;
    pub mod command_pool;
    pub mod command_queue;
    pub mod fence;
    pub mod semaphore;
    pub mod submit_info;
}
pub mod foundation {
    pub mod debug_messenger;
    pub mod device;
    pub mod instance;
    pub mod mem_allocator;
    pub mod physical_device;
}
pub mod resources {
    pub mod buffer;
    pub mod image;
    pub mod image_view;
    pub mod sampler;
}
pub mod pipelines {
    pub mod compute_pipeline;
    pub mod graphics_pipeline;
    pub mod pipeline_layout;
    pub mod shader;
}
pub mod swapchain {
    pub mod surface;
    pub mod swapchain;
}
pub mod gfx;
