use std::ffi::CStr;

use ash::vk;

/// 可以设置 debug name 的 Vulkan 对象
pub trait DebugType {
    fn debug_type_name() -> &'static str;
    fn vk_handle(&self) -> impl vk::Handle;
}

/// 将 validation layer 的消息转发到 `log`
pub struct GfxDebugMsger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

// new & init
impl GfxDebugMsger {
    pub fn new(vk_entry: &ash::Entry, instance: &ash::Instance) -> anyhow::Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(vk_entry, instance);
        let create_info = Self::debug_utils_messenger_ci();
        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None)? };

        Ok(Self { loader, messenger })
    }

    /// 用于创建 debug messenger 的结构体
    ///
    /// 也会被挂到 instance 的 p_next 上，用于捕获 instance 创建过程中的消息
    pub fn debug_utils_messenger_ci() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vk_debug_callback))
    }
}

// destroy
impl GfxDebugMsger {
    pub fn destroy(self) {
        // 触发 drop 进行销毁
    }
}
impl Drop for GfxDebugMsger {
    fn drop(&mut self) {
        log::info!("Destroying GfxDebugMsger");
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

/// validation 消息的等级，对应到 `log` 的等级
pub fn severity_to_log_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Info
    } else {
        log::Level::Debug
    }
}

/// validation layer 的消息可能是 json 格式
///
/// 提取 json 里面的 MainMessage 字段，这个字段里面有换行符，需要单独输出
fn format_validation_message(message_type: vk::DebugUtilsMessageTypeFlagsEXT, msg: &str) -> String {
    let mut json_value = serde_json::from_str::<serde_json::Value>(msg).ok();
    let json_obj = json_value.as_mut().and_then(|v| v.as_object_mut());

    match json_obj {
        Some(obj) => {
            let main_msg = obj.remove("MainMessage");
            let main_msg = main_msg.as_ref().and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let rest = serde_json::to_string_pretty(&obj).unwrap_or_default();
            format!("[{:?}]\n{}\n{}", message_type, rest, main_msg)
        }
        None => format!("[{:?}] {}", message_type, msg),
    }
}

/// debug messenger 的回调函数
/// # Safety
/// 由 Vulkan loader 调用，p_callback_data 在回调期间有效
unsafe extern "system" fn vk_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = unsafe { *p_callback_data };
    let msg = if callback_data.p_message.is_null() {
        std::borrow::Cow::from("")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let level = severity_to_log_level(message_severity);
    log::log!(level, "{}", format_validation_message(message_type, msg.as_ref()));

    // 只有 layer developer 才需要返回 True
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_maps_to_log_levels() {
        assert_eq!(severity_to_log_level(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR), log::Level::Error);
        assert_eq!(severity_to_log_level(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING), log::Level::Warn);
        assert_eq!(severity_to_log_level(vk::DebugUtilsMessageSeverityFlagsEXT::INFO), log::Level::Info);
        assert_eq!(severity_to_log_level(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE), log::Level::Debug);
    }

    #[test]
    fn json_message_extracts_main_message() {
        let msg = r#"{"MainMessage":"line1\nline2","VUID":"VUID-x"}"#;
        let formatted = format_validation_message(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION, msg);
        assert!(formatted.ends_with("line1\nline2"));
        assert!(formatted.contains("VUID-x"));
    }

    #[test]
    fn plain_message_is_kept() {
        let formatted = format_validation_message(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL, "plain text");
        assert!(formatted.contains("plain text"));
    }
}
