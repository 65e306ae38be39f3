use std::rc::Rc;

use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{command_queue::GfxCommandQueue, semaphore::GfxSemaphore},
    foundation::device::GfxDevice,
    gfx::Gfx,
    resources::image_view::{GfxImageView, GfxImageViewDesc},
    swapchain::surface::GfxSurface,
};

pub struct GfxSwapchain {
    swapchain_handle: vk::SwapchainKHR,

    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<GfxImageView>,

    color_format: vk::Format,
    swapchain_extent: vk::Extent2D,

    device: Rc<GfxDevice>,
}

// new & init
impl GfxSwapchain {
    pub fn new(gfx: &Gfx, surface: &GfxSurface, window_physical_extent: vk::Extent2D) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("GfxSwapchain::new");

        let surface_capabilities = surface.capabilities()?;
        let surface_format = Self::choose_surface_format(&surface.formats()?)
            .context("surface does not report any format")?;
        let present_mode = Self::choose_present_mode(&surface.present_modes()?);

        // 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
        let extent = Self::calculate_swapchain_extent(&surface_capabilities, window_physical_extent);
        log::info!(
            "create swapchain: window extent {}x{}, final extent {}x{}, format {:?}, present mode {:?}",
            window_physical_extent.width,
            window_physical_extent.height,
            extent.width,
            extent.height,
            surface_format.format,
            present_mode
        );

        let device = gfx.device().clone();
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(Self::calculate_image_count(&surface_capabilities))
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            // TRANSFER_DST 用于关闭 FXAA 时从 LDR 图像 blit
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true);

        let swapchain_handle = unsafe {
            device.swapchain().create_swapchain(&create_info, None).context("failed to create swapchain")?
        };
        device.set_object_debug_name(swapchain_handle, "main");

        let swapchain_images = unsafe { device.swapchain().get_swapchain_images(swapchain_handle)? };
        let swapchain_image_views: Vec<GfxImageView> = swapchain_images
            .iter()
            .enumerate()
            .map(|(idx, image)| {
                device.set_object_debug_name(*image, format!("swapchain-{idx}"));
                GfxImageView::new(
                    device.clone(),
                    *image,
                    GfxImageViewDesc::whole(
                        vk::ImageViewType::TYPE_2D,
                        surface_format.format,
                        vk::ImageAspectFlags::COLOR,
                    ),
                    format!("swapchain-{idx}"),
                )
            })
            .try_collect()?;

        Ok(Self {
            swapchain_handle,
            swapchain_images,
            swapchain_image_views,
            color_format: surface_format.format,
            swapchain_extent: extent,
            device,
        })
    }
}

// getters
impl GfxSwapchain {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain_extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.color_format
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.swapchain_images.len()
    }

    #[inline]
    pub fn image(&self, index: u32) -> vk::Image {
        self.swapchain_images[index as usize]
    }

    #[inline]
    pub fn image_view(&self, index: u32) -> vk::ImageView {
        self.swapchain_image_views[index as usize].handle()
    }
}

// tools
impl GfxSwapchain {
    /// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
    pub fn calculate_swapchain_extent(
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        window_physical_extent: vk::Extent2D,
    ) -> vk::Extent2D {
        let surface_extent = surface_capabilities.current_extent;
        if surface_extent.width == u32::MAX || surface_extent.height == u32::MAX {
            let width = window_physical_extent
                .width
                .clamp(surface_capabilities.min_image_extent.width, surface_capabilities.max_image_extent.width);
            let height = window_physical_extent
                .height
                .clamp(surface_capabilities.min_image_extent.height, surface_capabilities.max_image_extent.height);
            vk::Extent2D { width, height }
        } else {
            surface_extent
        }
    }

    /// max_image_count == 0，表示不限制 image 数量
    pub fn calculate_image_count(surface_capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
        if surface_capabilities.max_image_count == 0 {
            surface_capabilities.min_image_count + 1
        } else {
            u32::min(surface_capabilities.max_image_count, surface_capabilities.min_image_count + 1)
        }
    }

    /// gamma 校正在 composite pass 中完成，因此优先选择 UNORM 格式
    pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
        let preferred = [vk::Format::B8G8R8A8_UNORM, vk::Format::R8G8B8A8_UNORM];
        formats
            .iter()
            .find(|f| preferred.contains(&f.format) && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .or_else(|| formats.first())
            .copied()
    }

    pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
        if modes.contains(&vk::PresentModeKHR::MAILBOX) {
            vk::PresentModeKHR::MAILBOX
        } else {
            // FIFO 是规范保证一定支持的
            vk::PresentModeKHR::FIFO
        }
    }
}

// update
impl GfxSwapchain {
    /// 返回 `None` 表示 swapchain 已经过期，需要重建
    pub fn acquire_next_image(&self, semaphore: &GfxSemaphore) -> anyhow::Result<Option<u32>> {
        let result = unsafe {
            self.device.swapchain().acquire_next_image(
                self.swapchain_handle,
                u64::MAX,
                semaphore.handle(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, is_suboptimal)) => {
                if is_suboptimal {
                    log::debug!("swapchain acquire image index {} is not optimal", image_index);
                }
                Ok(Some(image_index))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::info!("swapchain is out of date when acquire next image");
                Ok(None)
            }
            Err(e) => Err(e).context("failed to acquire next swapchain image"),
        }
    }

    /// 返回值表示是否需要重建 swapchain
    pub fn present_image(
        &self,
        queue: &GfxCommandQueue,
        image_index: u32,
        wait_semaphore: &GfxSemaphore,
    ) -> anyhow::Result<bool> {
        let wait_semaphores = [wait_semaphore.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&self.swapchain_handle));

        let result = unsafe { self.device.swapchain().queue_present(queue.handle(), &present_info) };
        match result {
            Ok(is_suboptimal) => Ok(is_suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::info!("swapchain is out of date when present image");
                Ok(true)
            }
            Err(e) => Err(e).context("failed to present swapchain image"),
        }
    }
}

impl Drop for GfxSwapchain {
    fn drop(&mut self) {
        // image view 需要在 swapchain 之前销毁
        self.swapchain_image_views.clear();
        unsafe {
            self.device.swapchain().destroy_swapchain(self.swapchain_handle, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        }
    }

    #[test]
    fn extent_follows_window_when_surface_is_flexible() {
        let extent = GfxSwapchain::calculate_swapchain_extent(
            &caps((u32::MAX, u32::MAX)),
            vk::Extent2D {
                width: 1600,
                height: 900,
            },
        );
        assert_eq!((extent.width, extent.height), (1600, 900));

        let clamped = GfxSwapchain::calculate_swapchain_extent(
            &caps((u32::MAX, u32::MAX)),
            vk::Extent2D {
                width: 8000,
                height: 0,
            },
        );
        assert_eq!((clamped.width, clamped.height), (4096, 1));
    }

    #[test]
    fn extent_uses_surface_extent_when_fixed() {
        let extent = GfxSwapchain::calculate_swapchain_extent(
            &caps((1280, 720)),
            vk::Extent2D {
                width: 1600,
                height: 900,
            },
        );
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn image_count_is_min_plus_one_within_max() {
        let mut c = caps((1, 1));
        assert_eq!(GfxSwapchain::calculate_image_count(&c), 3);
        c.max_image_count = 2;
        assert_eq!(GfxSwapchain::calculate_image_count(&c), 2);
    }

    #[test]
    fn prefers_unorm_bgra() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let chosen = GfxSwapchain::choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert!(GfxSwapchain::choose_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        assert_eq!(GfxSwapchain::choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]), vk::PresentModeKHR::FIFO);
        assert_eq!(
            GfxSwapchain::choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
    }
}
