use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::commands::command_queue::GfxQueueFamily;

/// 表示一张物理显卡
pub struct GfxPhysicalDevice {
    pub(crate) vk_handle: vk::PhysicalDevice,

    /// 当前 gpu 的基础属性
    pub(crate) basic_props: vk::PhysicalDeviceProperties,

    /// 全能的 queue family：graphics, compute, transfer
    pub(crate) gfx_queue_family: GfxQueueFamily,
}

// new & init
impl GfxPhysicalDevice {
    /// 优先选择独立显卡，如果没有则选择第一个可用的显卡
    ///
    /// 只考虑存在全能 queue family 的显卡
    pub fn new_discrete_physical_device(instance: &ash::Instance) -> anyhow::Result<Self> {
        let pdevices = unsafe { instance.enumerate_physical_devices()? };
        pdevices
            .iter()
            .filter_map(|pdevice| Self::new(*pdevice, instance))
            .find_or_first(Self::is_discrete_gpu)
            .context("no physical device with a graphics queue family")
    }

    fn new(pdevice: vk::PhysicalDevice, instance: &ash::Instance) -> Option<Self> {
        let basic_props = unsafe { instance.get_physical_device_properties(pdevice) };
        let device_name = basic_props.device_name_as_c_str().unwrap_or(c"unknown");
        log::info!("found gpu: {:?}, type: {:?}", device_name, basic_props.device_type);

        let queue_family_props = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        log::debug!("physical device: queue family props:\n{:#?}", queue_family_props);

        let gfx_flags = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER;
        let gfx_queue_family = queue_family_props
            .iter()
            .enumerate()
            .find(|(_, props)| props.queue_flags.contains(gfx_flags))
            .map(|(family_idx, props)| GfxQueueFamily {
                name: "gfx".to_string(),
                queue_family_index: family_idx as u32,
                queue_flags: props.queue_flags,
                queue_count: props.queue_count,
            })?;

        Some(Self {
            vk_handle: pdevice,
            basic_props,
            gfx_queue_family,
        })
    }
}

// getters
impl GfxPhysicalDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::PhysicalDevice {
        self.vk_handle
    }

    #[inline]
    pub fn is_discrete_gpu(&self) -> bool {
        self.basic_props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    #[inline]
    pub fn gfx_queue_family(&self) -> &GfxQueueFamily {
        &self.gfx_queue_family
    }

    #[inline]
    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.basic_props.limits.max_sampler_anisotropy
    }

    #[inline]
    pub fn max_push_constants_size(&self) -> u32 {
        self.basic_props.limits.max_push_constants_size
    }

    pub fn device_name(&self) -> String {
        self.basic_props.device_name_as_c_str().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
    }
}
