use std::{ffi::CStr, rc::Rc};

use anyhow::Context;
use ash::vk;

use crate::{
    basic::color::LabelColor,
    commands::{
        command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, command_queue::GfxCommandQueue,
        fence::GfxFence, submit_info::GfxSubmitInfo,
    },
    foundation::{
        debug_messenger::GfxDebugMsger, device::GfxDevice, instance::GfxInstance, mem_allocator::GfxMemAllocator,
        physical_device::GfxPhysicalDevice,
    },
};

/// Vulkan 上下文
///
/// 持有 instance、physical device、device、allocator 以及 graphics queue。
/// 不是全局单例，需要显式地传递给各个子系统。
///
/// 所有通过它创建的资源都持有 `Rc<GfxDevice>`/`Rc<GfxMemAllocator>`，
/// 调用 [`Gfx::destroy`] 之前需要先释放这些资源。
pub struct Gfx {
    /// vk 基础函数的接口
    ///
    /// 在 drop 之后，会卸载 dll，因此需要确保该字段最后 drop
    vk_entry: ash::Entry,

    instance: GfxInstance,
    physical_device: GfxPhysicalDevice,

    /// 多个组件需要共享相同的设备函数指针（queue、command buffer、资源等），
    /// 使用 Rc 确保在所有引用者销毁前设备不被销毁
    device: Rc<GfxDevice>,
    allocator: Rc<GfxMemAllocator>,

    debug_msger: Option<GfxDebugMsger>,

    gfx_queue: GfxCommandQueue,

    /// 用于一次性提交的命令，例如资源上传
    transient_pool: GfxCommandPool,
}

// new & init
impl Gfx {
    /// # param
    /// * instance_extra_exts - 例如 surface 所需的 instance extension
    pub fn new(app_name: &str, instance_extra_exts: &[&'static CStr]) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("Gfx::new");

        let vk_entry = unsafe { ash::Entry::load() }.context("failed to load vulkan entry")?;
        let instance = GfxInstance::new(&vk_entry, app_name, instance_extra_exts)?;
        let physical_device = GfxPhysicalDevice::new_discrete_physical_device(instance.ash_instance())?;
        log::info!("selected gpu: {}", physical_device.device_name());

        // 只使用一个全能的 queue family，graphics/compute/transfer 都在这个 queue 上
        let queue_priorities = [1.0];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(physical_device.gfx_queue_family.queue_family_index)
            .queue_priorities(&queue_priorities)];

        let device =
            Rc::new(GfxDevice::new(instance.ash_instance(), physical_device.vk_handle, &queue_create_infos)?);
        let allocator =
            Rc::new(GfxMemAllocator::new(instance.ash_instance(), physical_device.vk_handle, &device.device)?);

        let gfx_queue = GfxCommandQueue {
            vk_queue: unsafe { device.get_device_queue(physical_device.gfx_queue_family.queue_family_index, 0) },
            queue_family: physical_device.gfx_queue_family.clone(),
            device: device.clone(),
        };
        log::info!("gfx queue's queue family:\n{:#?}", gfx_queue.queue_family);

        let debug_msger = match GfxDebugMsger::new(&vk_entry, instance.ash_instance()) {
            Ok(msger) => Some(msger),
            Err(e) => {
                log::warn!("failed to create debug messenger: {e:#}");
                None
            }
        };

        let transient_pool = GfxCommandPool::new(
            device.clone(),
            &physical_device.gfx_queue_family,
            vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            "gfx-transient",
        )?;

        // 在 device 以及 debug_utils 之前创建的 vk::Handle
        device.set_object_debug_name(instance.vk_instance(), "GfxInstance");
        device.set_object_debug_name(physical_device.vk_handle, "GfxPhysicalDevice");
        device.set_object_debug_name(device.vk_handle(), "GfxDevice");
        device.set_debug_name(&gfx_queue, "gfx");

        Ok(Self {
            vk_entry,
            instance,
            physical_device,
            device,
            allocator,
            debug_msger,
            gfx_queue,
            transient_pool,
        })
    }
}

// destroy
impl Gfx {
    /// 需要在所有资源都释放之后调用
    pub fn destroy(self) {
        let Self {
            vk_entry,
            instance,
            physical_device: _,
            device,
            allocator,
            debug_msger,
            gfx_queue,
            transient_pool,
        } = self;

        if let Err(e) = device.wait_idle() {
            log::error!("wait idle before destroy failed: {e:#}");
        }

        drop(transient_pool);
        drop(gfx_queue);

        if Rc::strong_count(&allocator) > 1 {
            log::error!("allocator is still referenced by {} objects", Rc::strong_count(&allocator) - 1);
        }
        drop(allocator);

        if Rc::strong_count(&device) > 1 {
            log::error!("device is still referenced by {} objects", Rc::strong_count(&device) - 1);
        }
        device.destroy();
        drop(device);

        drop(debug_msger);
        instance.destroy();
        drop(vk_entry);
    }
}

// getters
impl Gfx {
    #[inline]
    pub fn vk_entry(&self) -> &ash::Entry {
        &self.vk_entry
    }

    #[inline]
    pub fn instance(&self) -> &GfxInstance {
        &self.instance
    }

    #[inline]
    pub fn physical_device(&self) -> &GfxPhysicalDevice {
        &self.physical_device
    }

    #[inline]
    pub fn device(&self) -> &Rc<GfxDevice> {
        &self.device
    }

    #[inline]
    pub fn allocator(&self) -> &Rc<GfxMemAllocator> {
        &self.allocator
    }

    #[inline]
    pub fn gfx_queue(&self) -> &GfxCommandQueue {
        &self.gfx_queue
    }

    #[inline]
    pub fn gfx_queue_family_index(&self) -> u32 {
        self.gfx_queue.queue_family.queue_family_index
    }
}

// tools
impl Gfx {
    /// 录制并提交一次性的命令，阻塞等待执行完成
    ///
    /// 只应该在初始化、资源上传或者 resize 这类低频场景下使用
    pub fn one_time_exec<R>(
        &self,
        func: impl FnOnce(&GfxCommandBuffer) -> anyhow::Result<R>,
        name: &str,
    ) -> anyhow::Result<R> {
        let _span = tracy_client::span!("Gfx::one_time_exec");

        let command_buffer = GfxCommandBuffer::new(&self.transient_pool, name)?;
        command_buffer.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, name)?;
        command_buffer.begin_label(name, LabelColor::COLOR_UPLOAD);
        let result = func(&command_buffer);
        command_buffer.end_label();
        command_buffer.end()?;

        let result = match result {
            Ok(r) => {
                let fence = GfxFence::new(self.device.clone(), false, name)?;
                self.gfx_queue.submit(&[GfxSubmitInfo::new(&[&command_buffer])], Some(&fence))?;
                fence.wait()?;
                Ok(r)
            }
            Err(e) => Err(e),
        };

        unsafe {
            self.device.free_command_buffers(self.transient_pool.handle(), &[command_buffer.vk_handle()]);
        }
        result
    }

    #[inline]
    pub fn wait_idle(&self) -> anyhow::Result<()> {
        self.device.wait_idle()
    }
}
