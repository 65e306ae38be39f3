use std::rc::Rc;

use ash::vk;

use crate::foundation::{debug_messenger::DebugType, device::GfxDevice};

/// 持有 `Rc<GfxDevice>`，在 drop 时自动销毁
pub struct GfxFence {
    fence: vk::Fence,
    device: Rc<GfxDevice>,
}

impl DebugType for GfxFence {
    fn debug_type_name() -> &'static str {
        "GfxFence"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.fence
    }
}

// new & init
impl GfxFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(device: Rc<GfxDevice>, signaled: bool, debug_name: &str) -> anyhow::Result<Self> {
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None)? };

        let fence = Self { fence, device };
        fence.device.set_debug_name(&fence, debug_name);
        Ok(fence)
    }
}
impl Drop for GfxFence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

// tools
impl GfxFence {
    /// 阻塞等待 fence，没有超时
    #[inline]
    pub fn wait(&self) -> anyhow::Result<()> {
        unsafe {
            self.device.wait_for_fences(std::slice::from_ref(&self.fence), true, u64::MAX)?;
        }
        Ok(())
    }

    #[inline]
    pub fn reset(&self) -> anyhow::Result<()> {
        unsafe {
            self.device.reset_fences(std::slice::from_ref(&self.fence))?;
        }
        Ok(())
    }
}
