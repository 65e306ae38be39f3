use std::ffi::CStr;

use anyhow::Context;
use ash::vk;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

pub struct GfxSurface {
    handle: vk::SurfaceKHR,
    pf: ash::khr::surface::Instance,

    /// 查询 capabilities 时需要使用
    pdevice: vk::PhysicalDevice,
}

// new & init
impl GfxSurface {
    pub fn new(
        gfx: &Gfx,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
    ) -> anyhow::Result<Self> {
        let surface_pf = ash::khr::surface::Instance::new(gfx.vk_entry(), gfx.instance().ash_instance());

        let handle = unsafe {
            ash_window::create_surface(
                gfx.vk_entry(),
                gfx.instance().ash_instance(),
                raw_display_handle,
                raw_window_handle,
                None,
            )
            .context("failed to create window surface")?
        };

        let surface = Self {
            handle,
            pf: surface_pf,
            pdevice: gfx.physical_device().vk_handle(),
        };
        gfx.device().set_debug_name(&surface, "main");

        // 只使用一个 queue，因此需要 graphics queue 同时支持 present
        let present_supported = unsafe {
            surface.pf.get_physical_device_surface_support(surface.pdevice, gfx.gfx_queue_family_index(), handle)?
        };
        anyhow::ensure!(present_supported, "graphics queue family does not support present to this surface");

        Ok(surface)
    }

    /// 创建 surface 所需要的 instance extensions，需要在创建 [`Gfx`] 时传入
    pub fn required_instance_extensions(
        raw_display_handle: raw_window_handle::RawDisplayHandle,
    ) -> anyhow::Result<Vec<&'static CStr>> {
        let exts = ash_window::enumerate_required_extensions(raw_display_handle)
            .context("unsupported display for vulkan surface")?;
        // ash_window 返回的是静态字符串
        Ok(exts.iter().map(|ext| unsafe { CStr::from_ptr(*ext) }).collect())
    }
}

// getters
impl GfxSurface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    pub fn capabilities(&self) -> anyhow::Result<vk::SurfaceCapabilitiesKHR> {
        let caps = unsafe { self.pf.get_physical_device_surface_capabilities(self.pdevice, self.handle)? };
        Ok(caps)
    }

    pub fn formats(&self) -> anyhow::Result<Vec<vk::SurfaceFormatKHR>> {
        let formats = unsafe { self.pf.get_physical_device_surface_formats(self.pdevice, self.handle)? };
        Ok(formats)
    }

    pub fn present_modes(&self) -> anyhow::Result<Vec<vk::PresentModeKHR>> {
        let modes = unsafe { self.pf.get_physical_device_surface_present_modes(self.pdevice, self.handle)? };
        Ok(modes)
    }
}

impl Drop for GfxSurface {
    fn drop(&mut self) {
        unsafe { self.pf.destroy_surface(self.handle, None) }
    }
}

impl DebugType for GfxSurface {
    fn debug_type_name() -> &'static str {
        "GfxSurface"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
