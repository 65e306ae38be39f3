use std::{
    cell::Cell,
    ffi::{CStr, CString},
    ops::Deref,
};

use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::foundation::debug_messenger::DebugType;

/// Vulkan 逻辑设备封装
///
/// 包含核心设备 API 以及扩展的函数指针。这些函数指针在应用生命周期中保持不变，
/// 可以通过 `Rc<GfxDevice>` 在各个资源之间共享。
///
/// 同步2 以及动态渲染都使用 1.3 core 的接口
pub struct GfxDevice {
    /// 核心 Vulkan 设备 API
    pub(crate) device: ash::Device,
    /// 调试工具扩展 API
    pub(crate) debug_utils: ash::ext::debug_utils::Device,
    /// 交换链扩展 API
    pub(crate) swapchain: ash::khr::swapchain::Device,

    destroyed: Cell<bool>,
}

// new & init
impl GfxDevice {
    pub fn new(
        instance: &ash::Instance,
        pdevice: vk::PhysicalDevice,
        queue_create_info: &[vk::DeviceQueueCreateInfo],
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("GfxDevice::new");

        // device 所需的所有 extension
        let device_exts = Self::basic_device_exts().iter().map(|e| e.as_ptr()).collect_vec();
        log::info!("device exts: {}", Self::basic_device_exts().iter().map(|ext| format!("\n\t{:?}", ext)).join(""));

        // device 所需的所有 features
        let mut descriptor_indexing_features = Self::descriptor_indexing_features();
        let mut sync2_features = vk::PhysicalDeviceSynchronization2Features::default().synchronization2(true);
        let mut dynamic_rendering_features =
            vk::PhysicalDeviceDynamicRenderingFeatures::default().dynamic_rendering(true);
        let mut draw_parameters_features =
            vk::PhysicalDeviceShaderDrawParametersFeatures::default().shader_draw_parameters(true);
        let mut all_features = vk::PhysicalDeviceFeatures2::default()
            .features(Self::physical_device_basic_features())
            .push_next(&mut descriptor_indexing_features)
            .push_next(&mut sync2_features)
            .push_next(&mut dynamic_rendering_features)
            .push_next(&mut draw_parameters_features);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(queue_create_info)
            .enabled_extension_names(&device_exts)
            .push_next(&mut all_features);

        let device = unsafe {
            instance.create_device(pdevice, &device_create_info, None).context("failed to create logical device")?
        };

        let debug_utils = ash::ext::debug_utils::Device::new(instance, &device);
        let swapchain = ash::khr::swapchain::Device::new(instance, &device);

        Ok(Self {
            device,
            debug_utils,
            swapchain,
            destroyed: Cell::new(false),
        })
    }

    /// 必要的 physical device core features
    fn physical_device_basic_features() -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .fragment_stores_and_atomics(true)
            .independent_blend(true)
            .multi_draw_indirect(true)
            // indirect 命令中的 first_instance 用于索引 instance buffer
            .draw_indirect_first_instance(true)
    }

    /// bindless 所需的 descriptor indexing features
    fn descriptor_indexing_features() -> vk::PhysicalDeviceDescriptorIndexingFeatures<'static> {
        vk::PhysicalDeviceDescriptorIndexingFeatures::default()
            .descriptor_binding_partially_bound(true) // 即使一些 descriptor 是 invalid
            .runtime_descriptor_array(true)
            .descriptor_binding_variable_descriptor_count(true)
            .descriptor_binding_sampled_image_update_after_bind(true)
            .descriptor_binding_storage_image_update_after_bind(true)
            .descriptor_binding_storage_buffer_update_after_bind(true)
            .shader_sampled_image_array_non_uniform_indexing(true)
            .shader_storage_buffer_array_non_uniform_indexing(true)
            .shader_storage_image_array_non_uniform_indexing(true)
    }

    /// 必要的 device extensions
    ///
    /// dynamic rendering 以及 synchronization2 已经提升到 core-1.3
    fn basic_device_exts() -> Vec<&'static CStr> {
        vec![ash::khr::swapchain::NAME]
    }
}

// destroy
impl GfxDevice {
    pub fn destroy(&self) {
        log::info!("destroying device");
        self.destroyed.set(true);
        unsafe {
            self.device.destroy_device(None);
        }
    }
}
impl Drop for GfxDevice {
    fn drop(&mut self) {
        debug_assert!(self.destroyed.get(), "GfxDevice must be destroyed before being dropped.");
    }
}

// getters
impl GfxDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::Device {
        self.device.handle()
    }
    #[inline]
    pub fn debug_utils(&self) -> &ash::ext::debug_utils::Device {
        &self.debug_utils
    }
    #[inline]
    pub fn swapchain(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain
    }
}

// tools
impl GfxDevice {
    /// 名字中的 `\0` 会导致设置失败，此时只记录日志
    pub fn set_object_debug_name<T: vk::Handle>(&self, handle: T, name: impl AsRef<str>) {
        let Ok(name) = CString::new(name.as_ref()) else {
            log::warn!("invalid debug name: {}", name.as_ref());
            return;
        };
        let result = unsafe {
            self.debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default().object_name(name.as_c_str()).object_handle(handle),
            )
        };
        if let Err(e) = result {
            log::warn!("failed to set debug name {:?}: {:?}", name, e);
        }
    }

    pub fn set_debug_name<T: DebugType>(&self, handle: &T, name: impl AsRef<str>) {
        self.set_object_debug_name(handle.vk_handle(), format!("{}::{}", T::debug_type_name(), name.as_ref()));
    }

    #[inline]
    pub fn wait_idle(&self) -> anyhow::Result<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Deref for GfxDevice {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.device
    }
}
impl DebugType for GfxDevice {
    fn debug_type_name() -> &'static str {
        "GfxDevice"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.device.handle()
    }
}
