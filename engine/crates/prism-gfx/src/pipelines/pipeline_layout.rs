use std::rc::Rc;

use ash::vk;

use crate::foundation::{debug_messenger::DebugType, device::GfxDevice};

/// 每个 pass 一个 pipeline layout：全局的 bindless set layout 加上一段 push constant
pub struct GfxPipelineLayout {
    handle: vk::PipelineLayout,
    push_constant_stages: vk::ShaderStageFlags,
    push_constant_size: u32,
    device: Rc<GfxDevice>,
}
// new & init
impl GfxPipelineLayout {
    pub fn new(
        device: Rc<GfxDevice>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_stages: vk::ShaderStageFlags,
        push_constant_size: u32,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let push_constant_ranges = if push_constant_size > 0 {
            vec![vk::PushConstantRange {
                stage_flags: push_constant_stages,
                offset: 0,
                size: push_constant_size,
            }]
        } else {
            vec![]
        };
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let handle = unsafe { device.create_pipeline_layout(&create_info, None)? };

        let layout = Self {
            handle,
            push_constant_stages,
            push_constant_size,
            device,
        };
        layout.device.set_debug_name(&layout, debug_name);
        Ok(layout)
    }
}
impl Drop for GfxPipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.handle, None);
        }
    }
}
// getters
impl GfxPipelineLayout {
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    #[inline]
    pub fn push_constant_stages(&self) -> vk::ShaderStageFlags {
        self.push_constant_stages
    }

    #[inline]
    pub fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }
}
impl DebugType for GfxPipelineLayout {
    fn debug_type_name() -> &'static str {
        "GfxPipelineLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
