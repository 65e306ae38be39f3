use std::rc::Rc;

use ash::vk;
use glam::Vec3;
use prism_gfx::{
    gfx::Gfx,
    resources::{buffer::GfxBuffer, image::GfxImage},
};
use prism_render_interface::{bindless::BindlessHandle, gpu_types::Vertex};

/// 可以单独绘制的一段索引
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Primitive {
    pub first_index: u32,
    pub index_count: u32,
    /// 材质在场景材质表中的索引
    pub material_index: u32,
    pub bounding_center: Vec3,
    pub bounding_radius: f32,
}

#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub name: String,
    pub primitives: Vec<Primitive>,
}

/// 包围 AABB 的球：球心为 AABB 中心，半径为中心到 max 角点的距离
pub fn bounding_sphere(positions: impl IntoIterator<Item = Vec3>) -> (Vec3, f32) {
    let (min, max) = positions
        .into_iter()
        .fold((Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)), |(min, max), p| (min.min(p), max.max(p)));
    if min.x > max.x {
        return (Vec3::ZERO, 0.0);
    }
    let center = (min + max) * 0.5;
    (center, max.distance(center))
}

/// 加载过程中在 CPU 端累积的几何数据
///
/// 所有 primitive 共享一个顶点数组与一个索引数组，索引在追加时已经加上了顶点偏移
#[derive(Default)]
pub struct ModelGeometry {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub meshes: Vec<Mesh>,
}
impl ModelGeometry {
    /// 追加一个 primitive，`indices` 是相对于 `vertices` 的局部索引
    pub fn push_primitive(&mut self, vertices: &[Vertex], indices: &[u32], material_index: u32) -> Primitive {
        let vertex_start = self.vertices.len() as u32;
        let first_index = self.indices.len() as u32;
        let (bounding_center, bounding_radius) = bounding_sphere(vertices.iter().map(|v| v.position));

        self.vertices.extend_from_slice(vertices);
        self.indices.extend(indices.iter().map(|i| vertex_start + i));

        Primitive {
            first_index,
            index_count: indices.len() as u32,
            material_index,
            bounding_center,
            bounding_radius,
        }
    }

    #[inline]
    pub fn primitive_count(&self) -> usize {
        self.meshes.iter().map(|m| m.primitives.len()).sum()
    }
}

/// 已经上传到 GPU 的模型
///
/// 顶点与索引 buffer 由模型独占；纹理可能被多个模型共享
pub struct Model {
    name: String,
    vertex_buffer: Option<GfxBuffer>,
    index_buffer: Option<GfxBuffer>,
    meshes: Vec<Mesh>,
    images: Vec<Rc<GfxImage>>,
    texture_handles: Vec<BindlessHandle>,
}
// new & init
impl Model {
    pub fn upload(
        gfx: &Gfx,
        name: impl Into<String>,
        geometry: ModelGeometry,
        images: Vec<Rc<GfxImage>>,
        texture_handles: Vec<BindlessHandle>,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("Model::upload");
        let name = name.into();

        let vertex_buffer = if geometry.vertices.is_empty() {
            None
        } else {
            let buffer = GfxBuffer::new_device_local(
                gfx,
                size_of_val(geometry.vertices.as_slice()) as vk::DeviceSize,
                vk::BufferUsageFlags::VERTEX_BUFFER,
                format!("{name}-vertex-buffer"),
            )?;
            buffer.transfer_data_sync(gfx, &geometry.vertices)?;
            Some(buffer)
        };
        let index_buffer = if geometry.indices.is_empty() {
            None
        } else {
            let buffer = GfxBuffer::new_device_local(
                gfx,
                size_of_val(geometry.indices.as_slice()) as vk::DeviceSize,
                vk::BufferUsageFlags::INDEX_BUFFER,
                format!("{name}-index-buffer"),
            )?;
            buffer.transfer_data_sync(gfx, &geometry.indices)?;
            Some(buffer)
        };

        log::info!(
            "Model {} uploaded: {} meshes, {} primitives, {} vertices, {} textures",
            name,
            geometry.meshes.len(),
            geometry.primitive_count(),
            geometry.vertices.len(),
            texture_handles.len()
        );

        Ok(Self {
            name,
            vertex_buffer,
            index_buffer,
            meshes: geometry.meshes,
            images,
            texture_handles,
        })
    }
}
// getters
impl Model {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    #[inline]
    pub fn vertex_buffer(&self) -> Option<&GfxBuffer> {
        self.vertex_buffer.as_ref()
    }

    #[inline]
    pub fn index_buffer(&self) -> Option<&GfxBuffer> {
        self.index_buffer.as_ref()
    }

    #[inline]
    pub fn images(&self) -> &[Rc<GfxImage>] {
        &self.images
    }

    #[inline]
    pub fn texture_handles(&self) -> &[BindlessHandle] {
        &self.texture_handles
    }

    /// 所有 mesh 的 primitive
    pub fn primitives(&self) -> impl Iterator<Item = &Primitive> {
        self.meshes.iter().flat_map(|m| m.primitives.iter())
    }

    /// 没有几何数据的模型不产生任何绘制
    #[inline]
    pub fn is_drawable(&self) -> bool {
        self.vertex_buffer.is_some() && self.index_buffer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec4};

    fn vertex(x: f32, y: f32, z: f32) -> Vertex {
        Vertex {
            position: Vec3::new(x, y, z),
            normal: Vec3::Z,
            uv: Vec2::ZERO,
            tangent: Vec4::ZERO,
            color: Vec4::ONE,
        }
    }

    #[test]
    fn sphere_of_aabb() {
        let (center, radius) = bounding_sphere([Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 2.0, 0.0)]);
        assert_eq!(center, Vec3::new(0.0, 1.0, 0.0));
        assert!((radius - 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn empty_sphere() {
        assert_eq!(bounding_sphere(std::iter::empty()), (Vec3::ZERO, 0.0));
    }

    #[test]
    fn primitives_are_offset() {
        let mut geometry = ModelGeometry::default();
        let tri = [vertex(0.0, 0.0, 0.0), vertex(1.0, 0.0, 0.0), vertex(0.0, 1.0, 0.0)];

        let a = geometry.push_primitive(&tri, &[0, 1, 2], 3);
        let b = geometry.push_primitive(&tri, &[2, 1, 0], 4);
        geometry.meshes.push(Mesh {
            name: "tris".to_string(),
            primitives: vec![a, b],
        });

        assert_eq!(a.first_index, 0);
        assert_eq!(b.first_index, 3);
        assert_eq!(b.index_count, 3);
        assert_eq!(b.material_index, 4);
        assert_eq!(&geometry.indices[3..], &[5, 4, 3]);
        assert_eq!(geometry.vertices.len(), 6);
        assert_eq!(geometry.primitive_count(), 2);
    }

    #[test]
    fn mesh_without_primitives_draws_nothing() {
        let mut geometry = ModelGeometry::default();
        geometry.meshes.push(Mesh::default());
        assert_eq!(geometry.primitive_count(), 0);
        assert!(geometry.vertices.is_empty());
    }
}
