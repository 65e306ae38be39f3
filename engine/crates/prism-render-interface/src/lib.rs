//! 渲染器与 GPU 之间的边界
//!
//! - [`bindless`]：全局唯一的 bindless descriptor set
//! - [`resource_registry`]：image/buffer/sampler/pipeline 的所有者
//! - [`frame_sync`]：frames in flight 的 fence 与 semaphore
//! - [`scene_gpu_state`]：按帧双缓冲的场景数据

pub mod bindless;
pub mod frame_counter;
pub mod frame_sync;
pub mod gpu_types;
pub mod material;
pub mod render_error;
pub mod resource_registry;
pub mod scene_gpu_state;
