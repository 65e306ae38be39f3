use std::{
    collections::HashSet,
    ffi::{CStr, CString, c_char},
};

use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::foundation::debug_messenger::GfxDebugMsger;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct GfxInstance {
    /// 仅仅是函数指针，以及一个裸的 handle
    ///
    /// 生命周期由 Gfx 手动控制
    pub(crate) ash_instance: ash::Instance,
}

// new & init
impl GfxInstance {
    /// 设置所需的 layers 和 extensions，创建 vk instance
    pub fn new(vk_entry: &ash::Entry, app_name: &str, extra_instance_exts: &[&'static CStr]) -> anyhow::Result<Self> {
        let app_name = CString::new(app_name)?;
        let engine_name = c"prism";
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3) // 版本过低时，有些函数无法正确加载
            .application_name(app_name.as_ref())
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let enabled_extensions = Self::get_extensions(vk_entry, extra_instance_exts)?;
        log::info!(
            "instance extensions: {}",
            enabled_extensions.iter().map(|ext| format!("\n\t{:?}", unsafe { CStr::from_ptr(*ext) })).join("")
        );

        let enabled_layers = Self::get_layers(vk_entry)?;
        log::info!(
            "instance layers: {}",
            enabled_layers.iter().map(|layer| format!("\n\t{:?}", unsafe { CStr::from_ptr(*layer) })).join("")
        );

        // 为 instance info 添加 debug messenger
        let mut debug_utils_messenger_ci = GfxDebugMsger::debug_utils_messenger_ci();
        let instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&enabled_extensions)
            .enabled_layer_names(&enabled_layers)
            .push_next(&mut debug_utils_messenger_ci);

        let ash_instance =
            unsafe { vk_entry.create_instance(&instance_ci, None).context("failed to create vulkan instance")? };

        Ok(Self { ash_instance })
    }
}

// destroy
impl GfxInstance {
    pub fn destroy(self) {
        log::info!("Destroying GfxInstance");
        unsafe {
            self.ash_instance.destroy_instance(None);
        }
    }
}

// getters
impl GfxInstance {
    #[inline]
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.ash_instance
    }

    #[inline]
    pub fn vk_instance(&self) -> vk::Instance {
        self.ash_instance.handle()
    }
}

// 构造过程
impl GfxInstance {
    /// instance 所需的，且受支持的 extension
    fn get_extensions(vk_entry: &ash::Entry, extra_instance_exts: &[&'static CStr]) -> anyhow::Result<Vec<*const c_char>> {
        let all_ext_props = unsafe { vk_entry.enumerate_instance_extension_properties(None)? };
        let supported = |ext: &CStr| {
            all_ext_props.iter().any(|props| props.extension_name_as_c_str().is_ok_and(|name| name == ext))
        };

        let mut enabled_extensions: HashSet<&'static CStr> = HashSet::new();
        for ext in extra_instance_exts.iter().copied().chain(Self::basic_instance_exts()) {
            anyhow::ensure!(supported(ext), "required instance extension {:?} is missing", ext);
            enabled_extensions.insert(ext);
        }

        Ok(enabled_extensions.iter().map(|ext| ext.as_ptr()).collect_vec())
    }

    /// debug 构建下，如果 validation layer 可用就开启
    ///
    /// 也可以用 vulkan configurator 在外部控制
    fn get_layers(vk_entry: &ash::Entry) -> anyhow::Result<Vec<*const c_char>> {
        if !cfg!(debug_assertions) {
            return Ok(Vec::new());
        }

        let all_layer_props = unsafe { vk_entry.enumerate_instance_layer_properties()? };
        let has_validation =
            all_layer_props.iter().any(|props| props.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER));
        if has_validation {
            Ok(vec![VALIDATION_LAYER.as_ptr()])
        } else {
            log::warn!("validation layer is not available");
            Ok(Vec::new())
        }
    }

    /// 必须要开启的 instance extensions
    fn basic_instance_exts() -> Vec<&'static CStr> {
        // debug utils 提供 debug messenger、object name 以及 command buffer label
        vec![ash::ext::debug_utils::NAME]
    }
}
