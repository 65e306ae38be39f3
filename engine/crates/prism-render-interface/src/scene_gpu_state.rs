use std::cmp::Ordering;

use ash::vk;
use glam::{Mat4, UVec2, Vec3};
use itertools::Itertools;
use prism_gfx::{gfx::Gfx, resources::buffer::GfxBuffer};

use crate::{
    bindless::{BindlessDescriptorTable, BindlessHandle, StorageBufferBinding},
    frame_counter::{FrameCounter, FrameLabel},
    frame_sync::FrameWrite,
    gpu_types::{
        AlphaMode, CLUSTER_COUNT, Cluster, DrawIndexedIndirectCommand, LIGHT_INDEX_LIST_STRIDE, Light,
        MAX_LIGHTS, MAX_MATERIALS, MAX_MESH_INSTANCES, MaterialGpu, MeshInstance, SceneData,
    },
    material::Material,
};

/// 等待排序的 instance，以及与之对应的 draw 参数
#[derive(Copy, Clone, Debug)]
pub struct PendingInstance {
    pub instance: MeshInstance,
    pub index_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
}

/// 排序之后的 instance 与 indirect command，两者一一对应
#[derive(Default, Debug)]
pub struct SortedInstances {
    pub instances: Vec<MeshInstance>,
    pub commands: Vec<DrawIndexedIndirectCommand>,
    /// `[0, opaque_count)` 为不透明物体
    pub opaque_count: u32,
}

/// 不透明物体（包括 alpha mask）从近到远，半透明物体从远到近
///
/// 第 i 个 command 的 `first_instance = i`，shader 通过它索引 instance buffer
pub fn sort_instances(pending: &[PendingInstance], materials: &[MaterialGpu], camera_pos: Vec3) -> SortedInstances {
    let distance = |p: &PendingInstance| p.instance.bounding_sphere.truncate().distance(camera_pos);
    let is_blend = |p: &PendingInstance| {
        materials
            .get(p.instance.material_index as usize)
            .is_some_and(|m| m.alpha_mode() == AlphaMode::Blend)
    };

    let (mut opaques, mut blends): (Vec<_>, Vec<_>) =
        pending.iter().map(|p| (distance(p), p)).partition(|(_, p)| !is_blend(p));
    opaques.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    blends.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    let opaque_count = opaques.len() as u32;
    let (instances, commands) = opaques
        .into_iter()
        .chain(blends)
        .enumerate()
        .map(|(i, (_, p))| {
            let command = DrawIndexedIndirectCommand {
                index_count: p.index_count,
                instance_count: 1,
                first_index: p.first_index,
                vertex_offset: p.vertex_offset,
                first_instance: i as u32,
            };
            (p.instance, command)
        })
        .unzip();

    SortedInstances {
        instances,
        commands,
        opaque_count,
    }
}

/// 追加之前的容量检查
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// `first` 为 true 表示这是本轮第一次溢出，需要输出 warning
    Rejected { first: bool },
}

/// 当前已有 `len` 个元素时，能否再追加一个
///
/// 溢出只在第一次时报告，`warned` 由调用者在清空时复位
pub fn try_reserve(len: usize, capacity: usize, warned: &mut bool) -> Admission {
    if len < capacity {
        return Admission::Accepted;
    }
    let first = !*warned;
    *warned = true;
    Admission::Rejected { first }
}

/// 某一帧的 bindless buffer handle
#[derive(Copy, Clone, Debug, Default)]
pub struct FrameBufferHandles {
    pub scene: BindlessHandle,
    pub instance: BindlessHandle,
    pub indirect: BindlessHandle,
    pub light: BindlessHandle,
    pub cluster_grid: BindlessHandle,
    pub light_index: BindlessHandle,
    pub cluster_atomic: BindlessHandle,
}

/// 属于某个 frame slot 的 buffer，只能在该 slot 的 fence signal 之后写入
struct FrameBuffers {
    scene: GfxBuffer,
    instances: GfxBuffer,
    indirect: GfxBuffer,
    lights: GfxBuffer,

    /// 由 cluster cull pass 每帧重写
    cluster_grid: GfxBuffer,
    light_index: GfxBuffer,
    cluster_atomic: GfxBuffer,

    handles: FrameBufferHandles,

    pending: Vec<PendingInstance>,
    instance_count: u32,
    opaque_count: u32,
    overflow_logged: bool,
}
impl FrameBuffers {
    fn new(gfx: &Gfx, bindless: &mut BindlessDescriptorTable, label: FrameLabel) -> anyhow::Result<Self> {
        let mapped = |size: usize, extra: vk::BufferUsageFlags, name: &str| {
            GfxBuffer::new_mapped_ssbo(gfx, size as vk::DeviceSize, extra, format!("{name}-{label}"))
        };
        let device_local = |size: usize, name: &str| {
            GfxBuffer::new_device_local(
                gfx,
                size as vk::DeviceSize,
                vk::BufferUsageFlags::STORAGE_BUFFER,
                format!("{name}-{label}"),
            )
        };

        let scene = mapped(size_of::<SceneData>(), vk::BufferUsageFlags::empty(), "scene")?;
        let instances = mapped(size_of::<MeshInstance>() * MAX_MESH_INSTANCES, vk::BufferUsageFlags::empty(), "instances")?;
        let indirect = mapped(
            size_of::<DrawIndexedIndirectCommand>() * MAX_MESH_INSTANCES,
            vk::BufferUsageFlags::INDIRECT_BUFFER,
            "indirect",
        )?;
        let lights = mapped(size_of::<Light>() * MAX_LIGHTS, vk::BufferUsageFlags::empty(), "lights")?;
        let cluster_grid = device_local(size_of::<UVec2>() * CLUSTER_COUNT as usize, "cluster-grid")?;
        let light_index =
            device_local(size_of::<u32>() * (CLUSTER_COUNT * LIGHT_INDEX_LIST_STRIDE) as usize, "light-index")?;
        let cluster_atomic = device_local(size_of::<u32>() * 4, "cluster-atomic")?;

        let register = |bindless: &mut BindlessDescriptorTable, buffer: &GfxBuffer, binding| {
            bindless.register_buffer(buffer.vk_buffer(), 0, buffer.size(), binding)
        };
        let handles = FrameBufferHandles {
            scene: register(bindless, &scene, StorageBufferBinding::Scene)?,
            instance: register(bindless, &instances, StorageBufferBinding::Instance)?,
            indirect: register(bindless, &indirect, StorageBufferBinding::Indirect)?,
            light: register(bindless, &lights, StorageBufferBinding::Light)?,
            cluster_grid: register(bindless, &cluster_grid, StorageBufferBinding::ClusterGrid)?,
            light_index: register(bindless, &light_index, StorageBufferBinding::LightIndex)?,
            cluster_atomic: register(bindless, &cluster_atomic, StorageBufferBinding::ClusterAtomic)?,
        };

        Ok(Self {
            scene,
            instances,
            indirect,
            lights,
            cluster_grid,
            light_index,
            cluster_atomic,
            handles,
            pending: Vec::with_capacity(MAX_MESH_INSTANCES),
            instance_count: 0,
            opaque_count: 0,
            overflow_logged: false,
        })
    }
}

/// 场景在 GPU 上的状态
///
/// 每个 frame slot 各有一份 scene/instance/indirect/light buffer；material 与 cluster AABB 全局共享
pub struct SceneGpuState {
    frames: Vec<FrameBuffers>,

    material_buffer: GfxBuffer,
    material_handle: BindlessHandle,
    cluster_buffer: GfxBuffer,
    cluster_handle: BindlessHandle,

    lights: Vec<Light>,
    lights_overflow_logged: bool,
    materials: Vec<Material>,
    materials_overflow_logged: bool,
    materials_dirty: bool,
}

// new & init
impl SceneGpuState {
    pub fn new(gfx: &Gfx, bindless: &mut BindlessDescriptorTable) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("SceneGpuState::new");

        let frames = FrameCounter::frame_labels().iter().map(|label| FrameBuffers::new(gfx, bindless, *label)).try_collect()?;

        let material_buffer = GfxBuffer::new_mapped_ssbo(
            gfx,
            (size_of::<MaterialGpu>() * MAX_MATERIALS) as vk::DeviceSize,
            vk::BufferUsageFlags::empty(),
            "materials",
        )?;
        let material_handle = bindless.register_buffer(
            material_buffer.vk_buffer(),
            0,
            material_buffer.size(),
            StorageBufferBinding::Material,
        )?;

        let cluster_buffer = GfxBuffer::new_device_local(
            gfx,
            (size_of::<Cluster>() * CLUSTER_COUNT as usize) as vk::DeviceSize,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            "clusters",
        )?;
        let cluster_handle =
            bindless.register_buffer(cluster_buffer.vk_buffer(), 0, cluster_buffer.size(), StorageBufferBinding::Cluster)?;

        Ok(Self {
            frames,
            material_buffer,
            material_handle,
            cluster_buffer,
            cluster_handle,
            lights: Vec::new(),
            lights_overflow_logged: false,
            materials: Vec::new(),
            materials_overflow_logged: false,
            materials_dirty: false,
        })
    }
}

// lights
impl SceneGpuState {
    /// 超出容量时返回 `None`
    pub fn add_light(&mut self, light: Light) -> Option<usize> {
        if let Admission::Rejected { first } =
            try_reserve(self.lights.len(), MAX_LIGHTS, &mut self.lights_overflow_logged)
        {
            if first {
                log::warn!("Maximum lights reached");
            }
            return None;
        }
        self.lights.push(light);
        Some(self.lights.len() - 1)
    }

    pub fn update_light(&mut self, index: usize, light: Light) -> bool {
        match self.lights.get_mut(index) {
            Some(l) => {
                *l = light;
                true
            }
            None => false,
        }
    }

    pub fn remove_light(&mut self, index: usize) -> Option<Light> {
        (index < self.lights.len()).then(|| self.lights.remove(index))
    }

    pub fn clear_lights(&mut self) {
        self.lights.clear();
        self.lights_overflow_logged = false;
    }

    pub fn upload_lights(&self, write: &FrameWrite) -> anyhow::Result<()> {
        if self.lights.is_empty() {
            return Ok(());
        }
        self.frames[*write.frame()].lights.transfer_data_by_mmap(0, &self.lights)
    }
}

// materials
impl SceneGpuState {
    /// 超出容量时返回 `None`
    pub fn add_material(&mut self, material: Material) -> Option<u32> {
        if let Admission::Rejected { first } =
            try_reserve(self.materials.len(), MAX_MATERIALS, &mut self.materials_overflow_logged)
        {
            if first {
                log::warn!("Maximum materials reached");
            }
            return None;
        }
        self.materials.push(material);
        self.materials_dirty = true;
        Some(self.materials.len() as u32 - 1)
    }

    pub fn update_material(&mut self, index: u32, material: Material) -> bool {
        match self.materials.get_mut(index as usize) {
            Some(m) => {
                *m = material;
                self.materials_dirty = true;
                true
            }
            None => false,
        }
    }

    /// 切换模型时使用，之前返回的 material index 全部失效
    pub fn clear_materials(&mut self) {
        self.materials.clear();
        self.materials_overflow_logged = false;
        self.materials_dirty = true;
    }

    /// 只有在 material 发生变化之后才会整体 memcpy
    pub fn upload_materials(&mut self) -> anyhow::Result<()> {
        if !self.materials_dirty {
            return Ok(());
        }
        let _span = tracy_client::span!("SceneGpuState::upload_materials");
        if !self.materials.is_empty() {
            let table = self.materials.iter().map(|m| m.gpu).collect_vec();
            self.material_buffer.transfer_data_by_mmap(0, &table)?;
        }
        self.materials_dirty = false;
        Ok(())
    }
}

// instances
impl SceneGpuState {
    pub fn clear_instances(&mut self, frame: FrameLabel) {
        let buffers = &mut self.frames[*frame];
        buffers.pending.clear();
        buffers.overflow_logged = false;
    }

    /// 只记录在 CPU 端，超出容量时丢弃并返回 false
    #[allow(clippy::too_many_arguments)]
    pub fn add_instance(
        &mut self,
        frame: FrameLabel,
        transform: Mat4,
        material_index: u32,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
        center: Vec3,
        radius: f32,
    ) -> bool {
        let buffers = &mut self.frames[*frame];
        if let Admission::Rejected { first } =
            try_reserve(buffers.pending.len(), MAX_MESH_INSTANCES, &mut buffers.overflow_logged)
        {
            if first {
                log::warn!("Maximum mesh instances reached for frame {frame}");
            }
            return false;
        }
        buffers.pending.push(PendingInstance {
            instance: MeshInstance {
                transform,
                bounding_sphere: center.extend(radius),
                material_index,
                _padding: [0; 3],
            },
            index_count,
            first_index,
            vertex_offset,
        });
        true
    }

    /// 排序之后写入 instance buffer 与 indirect buffer
    pub fn sort_and_upload(&mut self, write: &FrameWrite, camera_pos: Vec3) -> anyhow::Result<()> {
        let _span = tracy_client::span!("SceneGpuState::sort_and_upload");
        let material_table = self.materials.iter().map(|m| m.gpu).collect_vec();
        let buffers = &mut self.frames[*write.frame()];
        let sorted = sort_instances(&buffers.pending, &material_table, camera_pos);

        if !sorted.instances.is_empty() {
            buffers.instances.transfer_data_by_mmap(0, &sorted.instances)?;
            buffers.indirect.transfer_data_by_mmap(0, &sorted.commands)?;
        }
        buffers.instance_count = sorted.instances.len() as u32;
        buffers.opaque_count = sorted.opaque_count;
        Ok(())
    }

    pub fn upload_scene(&self, write: &FrameWrite, scene_data: &SceneData) -> anyhow::Result<()> {
        self.frames[*write.frame()].scene.transfer_data_by_mmap(0, std::slice::from_ref(scene_data))
    }

    /// 将本帧 buffer 的 bindless handle 以及光源数量写入 scene data
    pub fn fill_scene_handles(&self, frame: FrameLabel, scene_data: &mut SceneData) {
        let handles = &self.frames[*frame].handles;
        scene_data.scene_handle = handles.scene.index();
        scene_data.instance_handle = handles.instance.index();
        scene_data.indirect_handle = handles.indirect.index();
        scene_data.light_handle = handles.light.index();
        scene_data.cluster_grid_handle = handles.cluster_grid.index();
        scene_data.light_index_handle = handles.light_index.index();
        scene_data.material_handle = self.material_handle.index();
        scene_data.cluster_handle = self.cluster_handle.index();
        scene_data.light_count = self.lights.len() as u32;
    }
}

// getters
impl SceneGpuState {
    #[inline]
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    #[inline]
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    #[inline]
    pub fn instance_count(&self, frame: FrameLabel) -> u32 {
        self.frames[*frame].instance_count
    }

    #[inline]
    pub fn opaque_count(&self, frame: FrameLabel) -> u32 {
        self.frames[*frame].opaque_count
    }

    #[inline]
    pub fn frame_handles(&self, frame: FrameLabel) -> FrameBufferHandles {
        self.frames[*frame].handles
    }

    #[inline]
    pub fn material_handle(&self) -> BindlessHandle {
        self.material_handle
    }

    #[inline]
    pub fn cluster_handle(&self) -> BindlessHandle {
        self.cluster_handle
    }

    #[inline]
    pub fn indirect_buffer(&self, frame: FrameLabel) -> &GfxBuffer {
        &self.frames[*frame].indirect
    }

    #[inline]
    pub fn cluster_buffer(&self) -> &GfxBuffer {
        &self.cluster_buffer
    }

    #[inline]
    pub fn cluster_grid_buffer(&self, frame: FrameLabel) -> &GfxBuffer {
        &self.frames[*frame].cluster_grid
    }

    #[inline]
    pub fn light_index_buffer(&self, frame: FrameLabel) -> &GfxBuffer {
        &self.frames[*frame].light_index
    }

    #[inline]
    pub fn cluster_atomic_buffer(&self, frame: FrameLabel) -> &GfxBuffer {
        &self.frames[*frame].cluster_atomic
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::*;

    fn pending(x: f32, material_index: u32, first_index: u32) -> PendingInstance {
        PendingInstance {
            instance: MeshInstance {
                transform: Mat4::from_translation(Vec3::new(x, 0.0, 0.0)),
                bounding_sphere: Vec4::new(x, 0.0, 0.0, 1.0),
                material_index,
                _padding: [0; 3],
            },
            index_count: 36,
            first_index,
            vertex_offset: 0,
        }
    }

    fn materials() -> Vec<MaterialGpu> {
        let opaque = MaterialGpu::default();
        let blend = MaterialGpu {
            alpha_mode: AlphaMode::Blend as u32,
            ..Default::default()
        };
        let mask = MaterialGpu {
            alpha_mode: AlphaMode::Mask as u32,
            ..Default::default()
        };
        vec![opaque, blend, mask]
    }

    #[test]
    fn opaques_front_to_back_blends_back_to_front() {
        let input = vec![
            pending(5.0, 1, 0),
            pending(3.0, 0, 1),
            pending(1.0, 1, 2),
            pending(9.0, 2, 3),
            pending(2.0, 0, 4),
        ];
        let sorted = sort_instances(&input, &materials(), Vec3::ZERO);

        assert_eq!(sorted.opaque_count, 3);
        let xs: Vec<f32> = sorted.instances.iter().map(|i| i.bounding_sphere.x).collect();
        assert_eq!(xs, vec![2.0, 3.0, 9.0, 5.0, 1.0]);
    }

    #[test]
    fn commands_match_instances() {
        let input = vec![pending(4.0, 0, 10), pending(1.0, 0, 20)];
        let sorted = sort_instances(&input, &materials(), Vec3::ZERO);

        assert_eq!(sorted.commands.len(), 2);
        for (i, cmd) in sorted.commands.iter().enumerate() {
            assert_eq!(cmd.first_instance, i as u32);
            assert_eq!(cmd.instance_count, 1);
            assert_eq!(cmd.index_count, 36);
        }
        assert_eq!(sorted.commands[0].first_index, 20);
        // transform 原样保留
        assert_eq!(sorted.instances[0].transform, input[1].instance.transform);
    }

    #[test]
    fn output_is_a_permutation() {
        let input: Vec<_> = (0..50).map(|i| pending((i * 7 % 13) as f32, (i % 3) as u32, i)).collect();
        let sorted = sort_instances(&input, &materials(), Vec3::new(0.0, 0.0, 2.0));

        let mut firsts: Vec<u32> = sorted.commands.iter().map(|c| c.first_index).collect();
        firsts.sort();
        assert_eq!(firsts, (0..50).collect::<Vec<u32>>());
    }

    #[test]
    fn unknown_material_counts_as_opaque() {
        let input = vec![pending(1.0, 99, 0)];
        let sorted = sort_instances(&input, &[], Vec3::ZERO);
        assert_eq!(sorted.opaque_count, 1);
    }

    #[test]
    fn last_slot_is_accepted_and_overflow_warns_once() {
        let mut warned = false;
        assert_eq!(try_reserve(MAX_MESH_INSTANCES - 1, MAX_MESH_INSTANCES, &mut warned), Admission::Accepted);
        assert!(!warned);

        assert_eq!(
            try_reserve(MAX_MESH_INSTANCES, MAX_MESH_INSTANCES, &mut warned),
            Admission::Rejected { first: true }
        );
        assert_eq!(
            try_reserve(MAX_MESH_INSTANCES + 1, MAX_MESH_INSTANCES, &mut warned),
            Admission::Rejected { first: false }
        );
        assert!(warned);
    }

    #[test]
    fn light_and_material_limits_fill_to_capacity() {
        for capacity in [MAX_LIGHTS, MAX_MATERIALS] {
            let mut warned = false;
            let mut len = 0;
            let mut first_rejections = 0;
            for _ in 0..capacity + 3 {
                match try_reserve(len, capacity, &mut warned) {
                    Admission::Accepted => len += 1,
                    Admission::Rejected { first } => first_rejections += first as usize,
                }
            }
            assert_eq!(len, capacity);
            assert_eq!(first_rejections, 1);
        }
    }

    #[test]
    fn overflow_warning_rearms_after_clear() {
        let mut warned = false;
        assert_eq!(try_reserve(4, 4, &mut warned), Admission::Rejected { first: true });
        // clear_instances / clear_lights 复位标记
        warned = false;
        assert_eq!(try_reserve(0, 4, &mut warned), Admission::Accepted);
        assert_eq!(try_reserve(4, 4, &mut warned), Admission::Rejected { first: true });
    }

    #[test]
    fn empty_input_emits_nothing() {
        let sorted = sort_instances(&[], &materials(), Vec3::ZERO);
        assert!(sorted.instances.is_empty());
        assert!(sorted.commands.is_empty());
        assert_eq!(sorted.opaque_count, 0);
    }
}
