use std::rc::Rc;

use ash::vk;

use crate::foundation::{debug_messenger::DebugType, device::GfxDevice};

/// 创建 image view 所需的信息
#[derive(Clone, Copy, Debug)]
pub struct GfxImageViewDesc {
    pub view_type: vk::ImageViewType,
    pub format: vk::Format,
    pub aspect: vk::ImageAspectFlags,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}
impl GfxImageViewDesc {
    /// 覆盖所有 mip 和 layer
    #[inline]
    pub fn whole(view_type: vk::ImageViewType, format: vk::Format, aspect: vk::ImageAspectFlags) -> Self {
        Self {
            view_type,
            format,
            aspect,
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        }
    }

    /// 2D array 中的单独一层，例如 CSM 的某个 cascade
    #[inline]
    pub fn single_layer(format: vk::Format, aspect: vk::ImageAspectFlags, layer: u32) -> Self {
        Self {
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: layer,
            layer_count: 1,
        }
    }
}

pub struct GfxImageView {
    handle: vk::ImageView,
    desc: GfxImageViewDesc,
    device: Rc<GfxDevice>,
}
// new & init
impl GfxImageView {
    pub fn new(
        device: Rc<GfxDevice>,
        image: vk::Image,
        desc: GfxImageViewDesc,
        name: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(desc.view_type)
            .format(desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: desc.aspect,
                base_mip_level: desc.base_mip_level,
                level_count: desc.level_count,
                base_array_layer: desc.base_array_layer,
                layer_count: desc.layer_count,
            });
        let handle = unsafe { device.create_image_view(&create_info, None)? };

        let view = Self { handle, desc, device };
        view.device.set_debug_name(&view, name);
        Ok(view)
    }
}
impl Drop for GfxImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.handle, None);
        }
    }
}
// getters
impl GfxImageView {
    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }

    #[inline]
    pub fn desc(&self) -> &GfxImageViewDesc {
        &self.desc
    }
}
impl DebugType for GfxImageView {
    fn debug_type_name() -> &'static str {
        "GfxImageView"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
