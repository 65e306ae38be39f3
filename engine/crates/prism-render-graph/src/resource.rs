use ash::vk;
use prism_gfx::resources::image::VulkanFormatUtils;

/// 一帧结束时资源应当处于的 layout
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TerminalLayout {
    /// swapchain image，转换为 PRESENT_SRC
    Present,
    /// 跨帧复用的 render target，转换为 SHADER_READ_ONLY
    ShaderRead,
}

/// 外部创建、由 graph 跟踪 layout 的 image
///
/// 同一个 vk::Image 的不同 layer 可以注册为不同的资源，例如 CSM 的每个 cascade
#[derive(Clone)]
pub struct RgImageResource {
    pub name: String,
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub base_layer: u32,
    pub layer_count: u32,

    pub initial_layout: vk::ImageLayout,
    pub clear_value: Option<vk::ClearValue>,
    pub terminal: TerminalLayout,
}

impl RgImageResource {
    #[inline]
    pub fn is_depth(&self) -> bool {
        VulkanFormatUtils::is_depth_format(self.format)
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        VulkanFormatUtils::aspect_from_format(self.format)
    }

    /// 未设置时：color 为品红色，方便发现漏画的区域；depth 为 1
    pub fn effective_clear_value(&self) -> vk::ClearValue {
        self.clear_value.unwrap_or(if self.is_depth() {
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            }
        } else {
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [1.0, 0.0, 1.0, 1.0],
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(format: vk::Format) -> RgImageResource {
        RgImageResource {
            name: "test".to_string(),
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            format,
            extent: vk::Extent2D { width: 4, height: 4 },
            base_layer: 0,
            layer_count: 1,
            initial_layout: vk::ImageLayout::UNDEFINED,
            clear_value: None,
            terminal: TerminalLayout::ShaderRead,
        }
    }

    #[test]
    fn default_clear_values() {
        let depth = resource(vk::Format::D32_SFLOAT);
        assert!(depth.is_depth());
        assert_eq!(unsafe { depth.effective_clear_value().depth_stencil.depth }, 1.0);

        let color = resource(vk::Format::R16G16B16A16_SFLOAT);
        assert_eq!(unsafe { color.effective_clear_value().color.float32 }, [1.0, 0.0, 1.0, 1.0]);
    }
}
