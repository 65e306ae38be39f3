use ash::vk;

/// 资源最近一次被访问的方式，用于推导 barrier 的 src stage/access
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RgAccess {
    /// 本帧内还没有被访问过
    None,
    ColorAttachment,
    DepthAttachment,
    StorageWrite,
    TransferWrite,
    TransferRead,
    ShaderRead,
    Present,
}

impl RgAccess {
    /// 作为 barrier 的 src 时使用的 stage 与 access
    pub fn src_mask(self) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
        match self {
            Self::None | Self::Present => (vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE),
            Self::ColorAttachment => {
                (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
            }
            Self::DepthAttachment => (
                vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ),
            Self::StorageWrite => (vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_STORAGE_WRITE),
            Self::TransferWrite => (vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE),
            // 读之后的写只需要执行依赖
            Self::TransferRead => (vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::NONE),
            Self::ShaderRead => (
                vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER,
                vk::AccessFlags2::NONE,
            ),
        }
    }

    /// 作为 barrier 的 dst 时使用的 stage 与 access
    pub fn dst_mask(self) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
        match self {
            Self::None | Self::Present => (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE),
            Self::ColorAttachment => (
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            ),
            Self::DepthAttachment => (
                vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ),
            Self::StorageWrite => (
                vk::PipelineStageFlags2::COMPUTE_SHADER,
                vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE,
            ),
            Self::TransferWrite => (vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE),
            Self::TransferRead => (vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ),
            Self::ShaderRead => (
                vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER,
                vk::AccessFlags2::SHADER_SAMPLED_READ,
            ),
        }
    }

    /// 该访问方式所要求的 image layout
    pub fn layout(self) -> vk::ImageLayout {
        match self {
            Self::None => vk::ImageLayout::UNDEFINED,
            Self::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::DepthAttachment => vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            Self::StorageWrite => vk::ImageLayout::GENERAL,
            Self::TransferWrite => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Self::TransferRead => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            Self::ShaderRead => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    /// 外部资源进入 graph 时，根据其 layout 推断上一帧的访问方式
    pub fn from_layout(layout: vk::ImageLayout) -> Self {
        match layout {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => Self::ColorAttachment,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL | vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => {
                Self::DepthAttachment
            }
            vk::ImageLayout::GENERAL => Self::StorageWrite,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL => Self::TransferWrite,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL => Self::TransferRead,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL => Self::ShaderRead,
            vk::ImageLayout::PRESENT_SRC_KHR => Self::Present,
            _ => Self::None,
        }
    }

    #[inline]
    pub fn is_write(self) -> bool {
        matches!(self, Self::ColorAttachment | Self::DepthAttachment | Self::StorageWrite | Self::TransferWrite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_accesses_have_write_masks() {
        for access in [RgAccess::ColorAttachment, RgAccess::DepthAttachment, RgAccess::StorageWrite, RgAccess::TransferWrite] {
            assert!(access.is_write());
            assert_ne!(access.src_mask().1, vk::AccessFlags2::NONE);
        }
        assert!(!RgAccess::ShaderRead.is_write());
    }

    #[test]
    fn layouts() {
        assert_eq!(RgAccess::DepthAttachment.layout(), vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        assert_eq!(RgAccess::StorageWrite.layout(), vk::ImageLayout::GENERAL);
        assert_eq!(RgAccess::Present.layout(), vk::ImageLayout::PRESENT_SRC_KHR);
    }
}
