use std::{ptr, rc::Rc};

use ash::vk;
use vk_mem::Alloc;

use crate::{
    foundation::{debug_messenger::DebugType, device::GfxDevice, mem_allocator::GfxMemAllocator},
    gfx::Gfx,
};

/// 由 VMA 分配的 buffer
///
/// host visible 的 buffer 在创建时就 map，直到销毁才 unmap
pub struct GfxBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,

    /// 在初始化阶段写死
    map_ptr: Option<*mut u8>,

    debug_name: String,

    device: Rc<GfxDevice>,
    allocator: Rc<GfxMemAllocator>,
}
impl DebugType for GfxBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
impl Drop for GfxBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.map_ptr.is_some() {
                self.allocator.unmap_memory(&mut self.allocation);
            }
            self.allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}
// new & init
impl GfxBuffer {
    /// - align: 当 buffer 处于一个大的 memory block 中时，align 用来指定 buffer 的起始 offset,
    ///   其实地址的内存对齐，默认对齐到 8 字节
    /// - 优先使用 device memory
    pub fn new(
        gfx: &Gfx,
        buffer_size: vk::DeviceSize,
        buffer_usage: vk::BufferUsageFlags,
        align: Option<vk::DeviceSize>,
        mem_map: bool,
        name: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(buffer_size > 0, "buffer {} has zero size", name.as_ref());

        let buffer_ci = vk::BufferCreateInfo::default()
            .size(buffer_size)
            .usage(buffer_usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: if mem_map {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };

        let allocator = gfx.allocator().clone();
        let align = align.unwrap_or(8);
        let (buffer, mut alloc) = unsafe { allocator.create_buffer_with_alignment(&buffer_ci, &alloc_ci, align)? };

        let mut map_ptr = None;
        if mem_map {
            match unsafe { allocator.map_memory(&mut alloc) } {
                Ok(ptr) => map_ptr = Some(ptr),
                Err(e) => {
                    unsafe { allocator.destroy_buffer(buffer, &mut alloc) };
                    return Err(e.into());
                }
            }
        }

        let buffer = Self {
            handle: buffer,
            allocation: alloc,
            size: buffer_size,
            usage: buffer_usage,
            map_ptr,
            debug_name: name.as_ref().to_string(),
            device: gfx.device().clone(),
            allocator,
        };
        buffer.device.set_debug_name(&buffer, name);
        Ok(buffer)
    }

    /// 专门用于 CPU -> GPU 传输的 buffer
    #[inline]
    pub fn new_stage_buffer(gfx: &Gfx, size: vk::DeviceSize, debug_name: impl AsRef<str>) -> anyhow::Result<Self> {
        Self::new(gfx, size, vk::BufferUsageFlags::TRANSFER_SRC, None, true, debug_name)
    }

    /// CPU 每帧通过 memcpy 写入的 storage buffer
    #[inline]
    pub fn new_mapped_ssbo(
        gfx: &Gfx,
        size: vk::DeviceSize,
        extra_usage: vk::BufferUsageFlags,
        debug_name: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        Self::new(gfx, size, vk::BufferUsageFlags::STORAGE_BUFFER | extra_usage, None, true, debug_name)
    }

    /// 只能通过 transfer 写入的 device local buffer
    #[inline]
    pub fn new_device_local(
        gfx: &Gfx,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        debug_name: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        Self::new(gfx, size, usage | vk::BufferUsageFlags::TRANSFER_DST, None, false, debug_name)
    }
}
// getters
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}
// tools
impl GfxBuffer {
    /// 通过 mem map 的方式将 data 写入到 buffer 的 `offset` 处
    ///
    /// 整段数据一次性 memcpy，写入之后 flush
    pub fn transfer_data_by_mmap<T: bytemuck::Pod>(&self, offset: vk::DeviceSize, data: &[T]) -> anyhow::Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let Some(map_ptr) = self.map_ptr else {
            anyhow::bail!("buffer {} is not host visible", self.debug_name);
        };
        anyhow::ensure!(
            offset + bytes.len() as vk::DeviceSize <= self.size,
            "write of {} bytes at {} overflows buffer {} ({} bytes)",
            bytes.len(),
            offset,
            self.debug_name,
            self.size
        );
        if bytes.is_empty() {
            return Ok(());
        }

        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), map_ptr.add(offset as usize), bytes.len());
        }
        self.allocator.flush_allocation(&self.allocation, offset, bytes.len() as vk::DeviceSize)?;
        Ok(())
    }

    /// 创建一个临时的 stage buffer，先将数据放入 stage buffer，再 transfer 到 self
    ///
    /// sync 表示这个函数是同步等待的，会阻塞运行
    ///
    /// # Note
    /// * 用于传输大块数据，例如顶点和索引
    pub fn transfer_data_sync<T: bytemuck::Pod>(&self, gfx: &Gfx, data: &[T]) -> anyhow::Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.is_empty() {
            return Ok(());
        }
        anyhow::ensure!(bytes.len() as vk::DeviceSize <= self.size, "upload overflows buffer {}", self.debug_name);

        let stage_buffer =
            Self::new_stage_buffer(gfx, bytes.len() as vk::DeviceSize, format!("{}-stage-buffer", self.debug_name))?;
        stage_buffer.transfer_data_by_mmap(0, bytes)?;

        gfx.one_time_exec(
            |cmd| {
                cmd.cmd_copy_buffer(
                    &stage_buffer,
                    self,
                    &[vk::BufferCopy {
                        size: bytes.len() as vk::DeviceSize,
                        ..Default::default()
                    }],
                );
                Ok(())
            },
            &format!("{}-transfer-data", self.debug_name),
        )
    }
}
