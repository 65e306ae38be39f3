use std::rc::Rc;

use ash::vk;
use vk_mem::Alloc;

use crate::{
    commands::{barrier::GfxImageBarrier, command_buffer::GfxCommandBuffer},
    foundation::{debug_messenger::DebugType, device::GfxDevice, mem_allocator::GfxMemAllocator},
    gfx::Gfx,
    resources::{
        buffer::GfxBuffer,
        image_view::{GfxImageView, GfxImageViewDesc},
    },
};

/// Vulkan 格式相关的工具类
pub struct VulkanFormatUtils;
impl VulkanFormatUtils {
    /// 计算指定 Vulkan 格式下每个像素需要的字节数
    ///
    /// 只覆盖上传路径会用到的格式
    pub fn pixel_size_in_bytes(format: vk::Format) -> Option<usize> {
        match format {
            vk::Format::R8_UNORM => Some(1),
            vk::Format::R8G8B8A8_UNORM
            | vk::Format::R8G8B8A8_SRGB
            | vk::Format::B8G8R8A8_UNORM
            | vk::Format::B8G8R8A8_SRGB
            | vk::Format::R16G16_SFLOAT
            | vk::Format::R32_SFLOAT
            | vk::Format::D32_SFLOAT => Some(4),
            vk::Format::R16G16B16A16_SFLOAT => Some(8),
            vk::Format::R32G32B32A32_SFLOAT => Some(16),
            _ => None,
        }
    }

    /// 根据 format 推断 aspect
    pub fn aspect_from_format(format: vk::Format) -> vk::ImageAspectFlags {
        match format {
            vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
                vk::ImageAspectFlags::DEPTH
            }
            vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
            _ => vk::ImageAspectFlags::COLOR,
        }
    }

    #[inline]
    pub fn is_depth_format(format: vk::Format) -> bool {
        Self::aspect_from_format(format).contains(vk::ImageAspectFlags::DEPTH)
    }

    /// 完整 mip 链的层数：`floor(log2(max(w, h))) + 1`
    #[inline]
    pub fn mip_count(width: u32, height: u32) -> u32 {
        let max_dim = width.max(height).max(1);
        max_dim.ilog2() + 1
    }
}

pub struct GfxImageCreateInfo {
    inner: vk::ImageCreateInfo<'static>,
    view_type: vk::ImageViewType,
}
impl GfxImageCreateInfo {
    #[inline]
    pub fn new_image_2d_info(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            inner: vk::ImageCreateInfo {
                image_type: vk::ImageType::TYPE_2D,
                format,
                extent: extent.into(),
                mip_levels: 1,
                array_layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                tiling: vk::ImageTiling::OPTIMAL,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                // 这里只能是 UNDEFINED 或者 PREINITIALIZED
                initial_layout: vk::ImageLayout::UNDEFINED,
                ..Default::default()
            },
            view_type: vk::ImageViewType::TYPE_2D,
        }
    }

    /// 2D array，默认 view 的类型是 TYPE_2D_ARRAY
    #[inline]
    pub fn new_image_2d_array_info(
        extent: vk::Extent2D,
        layers: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        let mut info = Self::new_image_2d_info(extent, format, usage);
        info.inner.array_layers = layers;
        info.view_type = vk::ImageViewType::TYPE_2D_ARRAY;
        info
    }

    /// cube map，6 个 layer
    #[inline]
    pub fn new_image_cube_info(size: u32, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        let mut info = Self::new_image_2d_info(vk::Extent2D { width: size, height: size }, format, usage);
        info.inner.array_layers = 6;
        info.inner.flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
        info.view_type = vk::ImageViewType::CUBE;
        info
    }

    /// builder
    ///
    /// 使用完整的 mip 链，需要额外的 TRANSFER_SRC 用于 blit
    #[inline]
    pub fn with_full_mips(mut self) -> Self {
        self.inner.mip_levels = VulkanFormatUtils::mip_count(self.inner.extent.width, self.inner.extent.height);
        self.inner.usage |= vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
        self
    }

    #[inline]
    pub fn as_info(&self) -> vk::ImageCreateInfo<'_> {
        self.inner
    }
}

/// 由 VMA 分配的 image，同时持有一个覆盖所有 mip 和 layer 的默认 view
pub struct GfxImage {
    handle: vk::Image,
    allocation: vk_mem::Allocation,
    default_view: Option<GfxImageView>,

    extent: vk::Extent2D,
    format: vk::Format,
    mip_levels: u32,
    array_layers: u32,
    usage: vk::ImageUsageFlags,
    aspect: vk::ImageAspectFlags,
    view_type: vk::ImageViewType,

    name: String,

    device: Rc<GfxDevice>,
    allocator: Rc<GfxMemAllocator>,
}
// new & init
impl GfxImage {
    pub fn new(gfx: &Gfx, image_info: &GfxImageCreateInfo, debug_name: &str) -> anyhow::Result<Self> {
        let allocator = gfx.allocator().clone();
        let alloc_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (handle, allocation) = unsafe { allocator.create_image(&image_info.as_info(), &alloc_info)? };

        let info = image_info.as_info();
        let aspect = VulkanFormatUtils::aspect_from_format(info.format);
        let mut image = Self {
            handle,
            allocation,
            default_view: None,
            extent: vk::Extent2D {
                width: info.extent.width,
                height: info.extent.height,
            },
            format: info.format,
            mip_levels: info.mip_levels,
            array_layers: info.array_layers,
            usage: info.usage,
            aspect,
            view_type: image_info.view_type,
            name: debug_name.to_string(),
            device: gfx.device().clone(),
            allocator,
        };
        image.device.set_debug_name(&image, debug_name);

        // view 创建失败时，image 随 drop 一起释放
        let view = GfxImageView::new(
            image.device.clone(),
            handle,
            GfxImageViewDesc::whole(image.view_type, image.format, aspect),
            format!("{debug_name}-view"),
        )?;
        image.default_view = Some(view);
        Ok(image)
    }
}
impl DebugType for GfxImage {
    fn debug_type_name() -> &'static str {
        "GfxImage"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
impl Drop for GfxImage {
    fn drop(&mut self) {
        log::debug!("Destroying GfxImage: {}", self.name);
        // view 需要先于 image 销毁
        self.default_view = None;
        unsafe {
            self.allocator.destroy_image(self.handle, &mut self.allocation);
        }
    }
}
// getters
impl GfxImage {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    /// 默认 view 在构造时一定会被创建
    #[inline]
    pub fn default_view(&self) -> vk::ImageView {
        self.default_view.as_ref().map_or(vk::ImageView::null(), |v| v.handle())
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[inline]
    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    #[inline]
    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.usage
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    #[inline]
    pub fn view_type(&self) -> vk::ImageViewType {
        self.view_type
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
// tools
impl GfxImage {
    /// 为某个 layer 创建单独的 view
    pub fn create_layer_view(&self, layer: u32, name: impl AsRef<str>) -> anyhow::Result<GfxImageView> {
        anyhow::ensure!(layer < self.array_layers, "layer {} out of range for {}", layer, self.name);
        GfxImageView::new(
            self.device.clone(),
            self.handle,
            GfxImageViewDesc::single_layer(self.format, self.aspect, layer),
            name,
        )
    }

    /// 同步上传 mip 0 的数据，并生成剩余的 mip，最终所有 mip 处于 SHADER_READ_ONLY_OPTIMAL
    ///
    /// `data` 需要包含所有 layer 的 mip 0 数据，layer 依次紧密排列
    pub fn upload_sync(&self, gfx: &Gfx, data: &[u8]) -> anyhow::Result<()> {
        let _span = tracy_client::span!("GfxImage::upload_sync");

        let Some(pixel_size) = VulkanFormatUtils::pixel_size_in_bytes(self.format) else {
            anyhow::bail!("unsupported upload format {:?} for {}", self.format, self.name);
        };
        let expected = pixel_size * self.width() as usize * self.height() as usize * self.array_layers as usize;
        anyhow::ensure!(
            data.len() == expected,
            "image {} expects {} bytes, got {}",
            self.name,
            expected,
            data.len()
        );

        let stage_buffer =
            GfxBuffer::new_stage_buffer(gfx, data.len() as vk::DeviceSize, format!("{}-stage-buffer", self.name))?;
        stage_buffer.transfer_data_by_mmap(0, data)?;

        gfx.one_time_exec(
            |cmd| {
                self.record_upload(cmd, &stage_buffer);
                Ok(())
            },
            &format!("{}-upload", self.name),
        )
    }

    /// # 实现步骤
    /// 1. 所有 mip 转换到 TRANSFER_DST
    /// 2. 将 staging buffer 的数据复制到 mip 0
    /// 3. 逐级 blit：mip i-1 转为 TRANSFER_SRC，blit 到 mip i，然后转为 SHADER_READ
    /// 4. 最后一级 mip 转为 SHADER_READ
    fn record_upload(&self, cmd: &GfxCommandBuffer, stage_buffer: &GfxBuffer) {
        let to_shader_read = |barrier: GfxImageBarrier, old_layout: vk::ImageLayout, src_access: vk::AccessFlags2| {
            barrier
                .src_mask(vk::PipelineStageFlags2::TRANSFER, src_access)
                .dst_mask(
                    vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER,
                    vk::AccessFlags2::SHADER_SAMPLED_READ,
                )
                .layout_transfer(old_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        };
        let base_barrier = GfxImageBarrier::new().image(self.handle).image_aspect_flag(self.aspect);

        cmd.image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[base_barrier
                .src_mask(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::empty())
                .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
                .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)],
        );

        let buffer_image_copy = vk::BufferImageCopy2::default()
            .image_extent(self.extent.into())
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: self.aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: self.array_layers,
            });
        cmd.cmd_copy_buffer_to_image(
            &vk::CopyBufferToImageInfo2::default()
                .src_buffer(stage_buffer.vk_buffer())
                .dst_image(self.handle)
                .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .regions(std::slice::from_ref(&buffer_image_copy)),
        );

        let mut mip_width = self.width() as i32;
        let mut mip_height = self.height() as i32;
        for mip in 1..self.mip_levels {
            let src_mip = base_barrier.mip_range(mip - 1, 1);
            cmd.image_memory_barrier(
                vk::DependencyFlags::empty(),
                &[src_mip
                    .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
                    .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ)
                    .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)],
            );

            let next_width = (mip_width / 2).max(1);
            let next_height = (mip_height / 2).max(1);
            let blit = vk::ImageBlit2::default()
                .src_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: self.aspect,
                    mip_level: mip - 1,
                    base_array_layer: 0,
                    layer_count: self.array_layers,
                })
                .src_offsets([vk::Offset3D::default(), vk::Offset3D { x: mip_width, y: mip_height, z: 1 }])
                .dst_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: self.aspect,
                    mip_level: mip,
                    base_array_layer: 0,
                    layer_count: self.array_layers,
                })
                .dst_offsets([vk::Offset3D::default(), vk::Offset3D { x: next_width, y: next_height, z: 1 }]);
            cmd.cmd_blit_image(
                &vk::BlitImageInfo2::default()
                    .src_image(self.handle)
                    .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                    .dst_image(self.handle)
                    .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .regions(std::slice::from_ref(&blit))
                    .filter(vk::Filter::LINEAR),
            );

            cmd.image_memory_barrier(
                vk::DependencyFlags::empty(),
                &[to_shader_read(src_mip, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::AccessFlags2::TRANSFER_READ)],
            );

            mip_width = next_width;
            mip_height = next_height;
        }

        let last_mip = base_barrier.mip_range(self.mip_levels - 1, 1);
        cmd.image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[to_shader_read(last_mip, vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::AccessFlags2::TRANSFER_WRITE)],
        );
    }

    /// 同步地将整张 image 转换到某个 layout，用于初始化阶段
    pub fn transition_sync(&self, gfx: &Gfx, new_layout: vk::ImageLayout) -> anyhow::Result<()> {
        gfx.one_time_exec(
            |cmd| {
                cmd.image_memory_barrier(
                    vk::DependencyFlags::empty(),
                    &[GfxImageBarrier::new()
                        .image(self.handle)
                        .image_aspect_flag(self.aspect)
                        .src_mask(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::empty())
                        .dst_mask(vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::MEMORY_READ)
                        .layout_transfer(vk::ImageLayout::UNDEFINED, new_layout)],
                );
                Ok(())
            },
            &format!("{}-transition", self.name),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_count_follows_log2_of_max_dimension() {
        assert_eq!(VulkanFormatUtils::mip_count(1, 1), 1);
        assert_eq!(VulkanFormatUtils::mip_count(2, 1), 2);
        assert_eq!(VulkanFormatUtils::mip_count(1024, 1024), 11);
        assert_eq!(VulkanFormatUtils::mip_count(1024, 512), 11);
        assert_eq!(VulkanFormatUtils::mip_count(1000, 3), 10);
        assert_eq!(VulkanFormatUtils::mip_count(0, 0), 1);
    }

    #[test]
    fn aspect_is_inferred_from_format() {
        assert_eq!(VulkanFormatUtils::aspect_from_format(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            VulkanFormatUtils::aspect_from_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            VulkanFormatUtils::aspect_from_format(vk::Format::R16G16B16A16_SFLOAT),
            vk::ImageAspectFlags::COLOR
        );
        assert!(VulkanFormatUtils::is_depth_format(vk::Format::D32_SFLOAT));
        assert!(!VulkanFormatUtils::is_depth_format(vk::Format::R8_UNORM));
    }

    #[test]
    fn pixel_sizes_for_upload_formats() {
        assert_eq!(VulkanFormatUtils::pixel_size_in_bytes(vk::Format::R8G8B8A8_SRGB), Some(4));
        assert_eq!(VulkanFormatUtils::pixel_size_in_bytes(vk::Format::R32G32B32A32_SFLOAT), Some(16));
        assert_eq!(VulkanFormatUtils::pixel_size_in_bytes(vk::Format::BC7_SRGB_BLOCK), None);
    }

    #[test]
    fn full_mips_adds_transfer_usage() {
        let info = GfxImageCreateInfo::new_image_2d_info(
            vk::Extent2D { width: 256, height: 128 },
            vk::Format::R8G8B8A8_SRGB,
            vk::ImageUsageFlags::SAMPLED,
        )
        .with_full_mips();
        assert_eq!(info.as_info().mip_levels, 9);
        assert!(info.as_info().usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
    }

    #[test]
    fn cube_info_has_six_layers() {
        let info = GfxImageCreateInfo::new_image_cube_info(64, vk::Format::R16G16B16A16_SFLOAT, vk::ImageUsageFlags::SAMPLED);
        assert_eq!(info.as_info().array_layers, 6);
        assert!(info.as_info().flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE));
    }
}
