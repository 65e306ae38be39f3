use std::rc::Rc;

use anyhow::Context;
use ash::vk;
use itertools::Itertools;
use prism_gfx::foundation::device::GfxDevice;

use crate::render_error::RenderError;

/// bindless 数组中的索引，通过 push constant 传递给 shader
///
/// 0 保留为 "未设置"，不会被分配出去
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BindlessHandle(pub u32);
impl BindlessHandle {
    pub const NULL: Self = Self(0);

    #[inline]
    pub fn index(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// 各个 storage buffer 数组所在的 binding，与 shader 中的声明保持一致
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StorageBufferBinding {
    Scene = 1,
    Material = 2,
    Light = 3,
    Instance = 6,
    Indirect = 7,
    Cluster = 8,
    ClusterGrid = 9,
    LightIndex = 10,
    ClusterAtomic = 11,
    SsaoKernel = 13,
}
impl StorageBufferBinding {
    pub const ALL: [Self; 10] = [
        Self::Scene,
        Self::Material,
        Self::Light,
        Self::Instance,
        Self::Indirect,
        Self::Cluster,
        Self::ClusterGrid,
        Self::LightIndex,
        Self::ClusterAtomic,
        Self::SsaoKernel,
    ];

    #[inline]
    pub fn binding(self) -> u32 {
        self as u32
    }

    fn name(self) -> &'static str {
        match self {
            Self::Scene => "scene buffers",
            Self::Material => "material buffers",
            Self::Light => "light buffers",
            Self::Instance => "instance buffers",
            Self::Indirect => "indirect buffers",
            Self::Cluster => "cluster buffers",
            Self::ClusterGrid => "cluster grid buffers",
            Self::LightIndex => "light index buffers",
            Self::ClusterAtomic => "cluster atomic buffers",
            Self::SsaoKernel => "ssao kernel buffers",
        }
    }
}

pub struct BindlessBindings;
impl BindlessBindings {
    pub const TEXTURES: u32 = 0;
    pub const TEXTURE_ARRAYS: u32 = 4;
    pub const STORAGE_IMAGES: u32 = 5;
    pub const CUBES: u32 = 12;

    pub const MAX_IMAGES: u32 = 16384;
    pub const MAX_BUFFERS: u32 = 1024;
}

/// 单个 bindless 数组的索引分配器
///
/// 索引单调递增，不回收；0 保留
#[derive(Debug)]
pub struct BindlessSlotAllocator {
    what: &'static str,
    next: u32,
    capacity: u32,
}
impl BindlessSlotAllocator {
    pub fn new(what: &'static str, capacity: u32) -> Self {
        Self { what, next: 1, capacity }
    }

    pub fn allocate(&mut self) -> Result<BindlessHandle, RenderError> {
        if self.next >= self.capacity {
            return Err(RenderError::ResourceExhausted {
                what: self.what,
                capacity: self.capacity,
            });
        }
        let handle = BindlessHandle(self.next);
        self.next += 1;
        Ok(handle)
    }

    /// 已经分配出去的数量
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.next - 1
    }
}

/// image 类 descriptor 所在的数组
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BindlessImageKind {
    Texture,
    TextureArray,
    Storage,
    Cube,
}
impl BindlessImageKind {
    pub fn binding(self) -> u32 {
        match self {
            Self::Texture => BindlessBindings::TEXTURES,
            Self::TextureArray => BindlessBindings::TEXTURE_ARRAYS,
            Self::Storage => BindlessBindings::STORAGE_IMAGES,
            Self::Cube => BindlessBindings::CUBES,
        }
    }

    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            Self::Storage => vk::DescriptorType::STORAGE_IMAGE,
            _ => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }

    /// storage image 在 compute 中读写，保持 GENERAL
    pub fn image_layout(self) -> vk::ImageLayout {
        match self {
            Self::Storage => vk::ImageLayout::GENERAL,
            _ => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

/// 全局唯一的 bindless descriptor set
///
/// | binding | 类型 | 用途 |
/// |---|---|---|
/// | 0 | sampler2D[] | 普通纹理 |
/// | 1,2,3,6..11,13 | StorageBuffer[] | 场景数据 |
/// | 4 | sampler2DArray[] | shadow map |
/// | 5 | image2D[] | compute 输出 |
/// | 12 | samplerCube[] | 环境贴图 |
///
/// 所有 binding 都是 PARTIALLY_BOUND + UPDATE_AFTER_BIND，注册可以发生在任意时刻
pub struct BindlessDescriptorTable {
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,

    textures: BindlessSlotAllocator,
    texture_arrays: BindlessSlotAllocator,
    storage_images: BindlessSlotAllocator,
    cubes: BindlessSlotAllocator,
    /// 与 [`StorageBufferBinding::ALL`] 一一对应
    buffers: Vec<BindlessSlotAllocator>,

    device: Rc<GfxDevice>,
}

// new & init
impl BindlessDescriptorTable {
    pub fn new(device: Rc<GfxDevice>) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("BindlessDescriptorTable::new");

        let layout_bindings = Self::layout_bindings();
        let binding_flags = vec![
            vk::DescriptorBindingFlags::PARTIALLY_BOUND | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND;
            layout_bindings.len()
        ];
        let mut binding_flags_ci =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
        let layout_ci = vk::DescriptorSetLayoutCreateInfo::default()
            .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            .bindings(&layout_bindings)
            .push_next(&mut binding_flags_ci);
        let layout = unsafe {
            device.create_descriptor_set_layout(&layout_ci, None).context("failed to create bindless layout")?
        };
        device.set_object_debug_name(layout, "bindless");

        let pool_sizes = Self::pool_sizes();
        let pool_ci = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND)
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { device.create_descriptor_pool(&pool_ci, None).context("failed to create bindless pool")? };
        device.set_object_debug_name(pool, "bindless");

        let set_layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool).set_layouts(&set_layouts);
        let set = unsafe { device.allocate_descriptor_sets(&alloc_info).context("failed to allocate bindless set")?[0] };
        device.set_object_debug_name(set, "bindless");

        Ok(Self {
            layout,
            pool,
            set,
            textures: BindlessSlotAllocator::new("bindless textures", BindlessBindings::MAX_IMAGES),
            texture_arrays: BindlessSlotAllocator::new("bindless texture arrays", BindlessBindings::MAX_IMAGES),
            storage_images: BindlessSlotAllocator::new("bindless storage images", BindlessBindings::MAX_IMAGES),
            cubes: BindlessSlotAllocator::new("bindless cubes", BindlessBindings::MAX_IMAGES),
            buffers: StorageBufferBinding::ALL
                .iter()
                .map(|b| BindlessSlotAllocator::new(b.name(), BindlessBindings::MAX_BUFFERS))
                .collect(),
            device,
        })
    }

    pub fn layout_bindings() -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT | vk::ShaderStageFlags::COMPUTE;
        let binding = |binding: u32, ty: vk::DescriptorType, count: u32| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(count)
                .stage_flags(stages)
        };

        let mut bindings = vec![
            binding(
                BindlessBindings::TEXTURES,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                BindlessBindings::MAX_IMAGES,
            ),
            binding(
                BindlessBindings::TEXTURE_ARRAYS,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                BindlessBindings::MAX_IMAGES,
            ),
            binding(BindlessBindings::STORAGE_IMAGES, vk::DescriptorType::STORAGE_IMAGE, BindlessBindings::MAX_IMAGES),
            binding(BindlessBindings::CUBES, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, BindlessBindings::MAX_IMAGES),
        ];
        bindings.extend(
            StorageBufferBinding::ALL
                .iter()
                .map(|b| binding(b.binding(), vk::DescriptorType::STORAGE_BUFFER, BindlessBindings::MAX_BUFFERS)),
        );
        bindings.sort_by_key(|b| b.binding);
        bindings
    }

    fn pool_sizes() -> Vec<vk::DescriptorPoolSize> {
        vec![
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: BindlessBindings::MAX_IMAGES * 3,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count: BindlessBindings::MAX_IMAGES,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: BindlessBindings::MAX_BUFFERS * StorageBufferBinding::ALL.len() as u32,
            },
        ]
    }
}

impl Drop for BindlessDescriptorTable {
    fn drop(&mut self) {
        unsafe {
            // set 随 pool 一起释放
            self.device.destroy_descriptor_pool(self.pool, None);
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

// getters
impl BindlessDescriptorTable {
    #[inline]
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.set
    }

    #[inline]
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

// register
impl BindlessDescriptorTable {
    /// sampled 2D 纹理，binding 0
    #[inline]
    pub fn register_image(&mut self, view: vk::ImageView, sampler: vk::Sampler) -> anyhow::Result<BindlessHandle> {
        self.register(BindlessImageKind::Texture, view, sampler)
    }

    /// 2D array 纹理（shadow map），binding 4
    #[inline]
    pub fn register_image_array(
        &mut self,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> anyhow::Result<BindlessHandle> {
        self.register(BindlessImageKind::TextureArray, view, sampler)
    }

    /// 分配 `kind` 对应数组中的下一个索引并立即写入 descriptor
    ///
    /// storage image 不使用 sampler，传 `vk::Sampler::null()` 即可
    pub fn register(
        &mut self,
        kind: BindlessImageKind,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> anyhow::Result<BindlessHandle> {
        let handle = self.image_allocator_mut(kind).allocate()?;
        self.write_image(kind, handle, view, sampler);
        Ok(handle)
    }

    pub fn register_buffer(
        &mut self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
        binding: StorageBufferBinding,
    ) -> anyhow::Result<BindlessHandle> {
        let handle = self.buffer_allocator_mut(binding).allocate()?;
        let buffer_info = [vk::DescriptorBufferInfo {
            buffer,
            offset,
            range,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(binding.binding())
            .dst_array_element(handle.index())
            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
            .buffer_info(&buffer_info);
        unsafe { self.device.update_descriptor_sets(std::slice::from_ref(&write), &[]) };
        Ok(handle)
    }

    /// 在原有的索引上写入新的 image，用于 resize 之后保持 handle 不变
    #[inline]
    pub fn rewrite_image(&self, handle: BindlessHandle, view: vk::ImageView, sampler: vk::Sampler) {
        self.write_image(BindlessImageKind::Texture, handle, view, sampler);
    }
}

// tools
impl BindlessDescriptorTable {
    fn write_image(&self, kind: BindlessImageKind, handle: BindlessHandle, view: vk::ImageView, sampler: vk::Sampler) {
        debug_assert!(!handle.is_null());
        let image_info = [vk::DescriptorImageInfo {
            sampler,
            image_view: view,
            image_layout: kind.image_layout(),
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(kind.binding())
            .dst_array_element(handle.index())
            .descriptor_type(kind.descriptor_type())
            .image_info(&image_info);
        unsafe { self.device.update_descriptor_sets(std::slice::from_ref(&write), &[]) };
    }

    fn image_allocator_mut(&mut self, kind: BindlessImageKind) -> &mut BindlessSlotAllocator {
        match kind {
            BindlessImageKind::Texture => &mut self.textures,
            BindlessImageKind::TextureArray => &mut self.texture_arrays,
            BindlessImageKind::Storage => &mut self.storage_images,
            BindlessImageKind::Cube => &mut self.cubes,
        }
    }

    fn buffer_slot(binding: StorageBufferBinding) -> usize {
        StorageBufferBinding::ALL.iter().position(|b| *b == binding).unwrap_or_default()
    }

    fn buffer_allocator_mut(&mut self, binding: StorageBufferBinding) -> &mut BindlessSlotAllocator {
        &mut self.buffers[Self::buffer_slot(binding)]
    }

    /// 当前所有 binding 的使用情况，用于日志
    pub fn usage_summary(&self) -> String {
        let images = [&self.textures, &self.texture_arrays, &self.storage_images, &self.cubes];
        images
            .into_iter()
            .chain(self.buffers.iter())
            .map(|a| format!("{}: {}", a.what, a.allocated()))
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_start_at_one_and_grow() {
        let mut alloc = BindlessSlotAllocator::new("test", 8);
        let a = alloc.allocate().unwrap();
        let b = alloc.allocate().unwrap();
        assert_eq!(a, BindlessHandle(1));
        assert_eq!(b, BindlessHandle(2));
        assert_eq!(alloc.allocated(), 2);
        assert!(BindlessHandle::default().is_null());
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut alloc = BindlessSlotAllocator::new("tiny", 3);
        assert!(alloc.allocate().is_ok());
        assert!(alloc.allocate().is_ok());
        let err = alloc.allocate().unwrap_err();
        assert!(matches!(err, RenderError::ResourceExhausted { what: "tiny", capacity: 3 }));
        // 失败之后计数不变
        assert_eq!(alloc.allocated(), 2);
    }

    #[test]
    fn image_kinds_match_layout_bindings() {
        let bindings = BindlessDescriptorTable::layout_bindings();
        for kind in [
            BindlessImageKind::Texture,
            BindlessImageKind::TextureArray,
            BindlessImageKind::Storage,
            BindlessImageKind::Cube,
        ] {
            let binding = &bindings[kind.binding() as usize];
            assert_eq!(binding.binding, kind.binding());
            assert_eq!(binding.descriptor_type, kind.descriptor_type());
        }
        assert_eq!(BindlessImageKind::Cube.binding(), 12);
        assert_eq!(BindlessImageKind::Storage.binding(), 5);
        assert_eq!(BindlessImageKind::Storage.image_layout(), vk::ImageLayout::GENERAL);
        assert_eq!(BindlessImageKind::Cube.image_layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn layout_covers_fourteen_bindings_in_order() {
        let bindings = BindlessDescriptorTable::layout_bindings();
        let indices: Vec<u32> = bindings.iter().map(|b| b.binding).collect();
        assert_eq!(indices, (0..14).collect::<Vec<u32>>());
        assert_eq!(bindings[5].descriptor_type, vk::DescriptorType::STORAGE_IMAGE);
        assert_eq!(bindings[12].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(bindings[13].descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(bindings[13].descriptor_count, BindlessBindings::MAX_BUFFERS);
    }
}
