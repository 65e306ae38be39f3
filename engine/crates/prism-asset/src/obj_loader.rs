//! Wavefront OBJ 的加载
//!
//! OBJ 只有 Blinn-Phong 风格的材质，按照常见的 PBR 扩展（`Pm`/`Pr`/`map_Pm`/`map_Pr`/`Ke`/`map_Ke`）读取，
//! 没有的字段使用默认值

use std::{collections::HashMap, path::Path, rc::Rc};

use anyhow::Context;
use glam::{Vec2, Vec3, Vec4};
use itertools::Itertools;
use prism_gfx::resources::image::GfxImage;
use prism_render_interface::{
    bindless::BindlessHandle,
    gpu_types::{AlphaMode, MaterialGpu, Vertex},
    material::Material,
};

use crate::{
    loader::{LoadContext, ModelLoader},
    model::{Mesh, Model, ModelGeometry},
    texture_cache::TextureKind,
    texture_path::resolve_texture_path,
};

pub struct ObjLoader;

impl ModelLoader for ObjLoader {
    fn name(&self) -> &'static str {
        "OBJ"
    }

    fn supports_extension(&self, extension: &str) -> bool {
        extension == ".obj"
    }

    fn load(&self, path: &Path, ctx: &mut LoadContext) -> anyhow::Result<Model> {
        let _span = tracy_client::span!("ObjLoader::load");

        let (models, materials) = tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS)
            .with_context(|| format!("failed to parse OBJ {}", path.display()))?;
        let materials = materials.unwrap_or_else(|e| {
            log::warn!("Failed to load MTL for {}: {}", path.display(), e);
            vec![]
        });

        let model_dir = path.parent().unwrap_or(Path::new("."));
        let mut textures = ObjTextures::default();
        let mut material_indices = materials
            .iter()
            .map(|material| {
                let gpu = material_gpu(material, |raw, kind| textures.load(ctx, model_dir, raw, kind));
                ctx.add_material(Material::new(material.name.clone(), gpu))
            })
            .collect_vec();
        if material_indices.is_empty() {
            material_indices.push(ctx.add_material(Material::new("Default", MaterialGpu::default())));
        }

        let mut geometry = ModelGeometry::default();
        for model in &models {
            let vertices = mesh_vertices(&model.mesh);
            let material_index = model
                .mesh
                .material_id
                .and_then(|i| material_indices.get(i))
                .copied()
                .unwrap_or(material_indices[0]);

            let primitives = if vertices.is_empty() || model.mesh.indices.is_empty() {
                vec![]
            } else {
                vec![geometry.push_primitive(&vertices, &model.mesh.indices, material_index)]
            };
            geometry.meshes.push(Mesh {
                name: model.name.clone(),
                primitives,
            });
        }

        let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        Model::upload(ctx.gfx, name, geometry, textures.images, textures.handles)
    }
}

/// 一个 OBJ 文件中引用到的纹理，同一个路径只注册一次
#[derive(Default)]
struct ObjTextures {
    images: Vec<Rc<GfxImage>>,
    handles: Vec<BindlessHandle>,
    by_path: HashMap<(String, TextureKind), BindlessHandle>,
}
impl ObjTextures {
    fn load(&mut self, ctx: &mut LoadContext, model_dir: &Path, raw: &str, kind: TextureKind) -> u32 {
        let key = (raw.to_string(), kind);
        if let Some(handle) = self.by_path.get(&key) {
            return handle.index();
        }

        let image = match resolve_texture_path(model_dir, raw) {
            Some(file) => ctx.textures.load(ctx.gfx, &file, kind),
            None => ctx.textures.missing(&model_dir.join(raw), kind),
        };
        let handle = match ctx.material_sampler() {
            Ok(sampler) => ctx.textures.register(ctx.bindless, &image, sampler),
            Err(e) => {
                log::error!("Failed to create material sampler: {:#}", e);
                BindlessHandle::NULL
            }
        };

        self.images.push(image);
        self.handles.push(handle);
        self.by_path.insert(key, handle);
        handle.index()
    }
}

/// MTL 中的材质转换为 GPU 材质，`load_texture` 返回纹理的 bindless 索引
fn material_gpu(material: &tobj::Material, mut load_texture: impl FnMut(&str, TextureKind) -> u32) -> MaterialGpu {
    let param = |key: &str| material.unknown_param.get(key).map(String::as_str);
    let param_f32 = |key: &str| param(key).and_then(|v| v.trim().parse::<f32>().ok());

    let [r, g, b] = material.diffuse.unwrap_or([1.0; 3]);
    let alpha = material.dissolve.unwrap_or(1.0);
    let emissive = param("Ke")
        .map(|v| v.split_whitespace().filter_map(|c| c.parse::<f32>().ok()).collect_vec())
        .filter(|c| c.len() == 3)
        .map_or(Vec4::new(0.0, 0.0, 0.0, 1.0), |c| Vec4::new(c[0], c[1], c[2], 1.0));

    let mut texture = |raw: Option<&str>, kind| raw.map_or(0, |raw| load_texture(raw, kind));
    let normal_raw = material
        .normal_texture
        .as_deref()
        .or_else(|| param("map_Bump"))
        .or_else(|| param("map_bump"))
        .or_else(|| param("bump"));
    let metal_rough_raw = param("map_Pm").or_else(|| param("map_Pr"));

    MaterialGpu {
        base_color_factor: Vec4::new(r, g, b, alpha),
        emissive_factor: emissive,
        metallic_factor: param_f32("Pm").unwrap_or(0.1),
        roughness_factor: param_f32("Pr").unwrap_or(0.5),
        alpha_cutoff: 0.5,
        alpha_mode: (if alpha < 1.0 { AlphaMode::Blend } else { AlphaMode::Opaque }) as u32,
        base_color_texture: texture(material.diffuse_texture.as_deref(), TextureKind::BaseColor),
        normal_texture: texture(normal_raw, TextureKind::Normal),
        metallic_roughness_texture: texture(metal_rough_raw, TextureKind::MetallicRoughness),
        emissive_texture: texture(param("map_Ke"), TextureKind::Emissive),
        occlusion_texture: texture(material.ambient_texture.as_deref(), TextureKind::Occlusion),
        ..Default::default()
    }
}

/// OBJ 的 uv 原点在左下角，转换为左上角
fn mesh_vertices(mesh: &tobj::Mesh) -> Vec<Vertex> {
    let count = mesh.positions.len() / 3;
    (0..count)
        .map(|i| {
            let vec3_at = |data: &[f32], default: Vec3| {
                data.get(i * 3..i * 3 + 3).map_or(default, Vec3::from_slice)
            };
            let uv = mesh.texcoords.get(i * 2..i * 2 + 2).map_or(Vec2::ZERO, |uv| Vec2::new(uv[0], 1.0 - uv[1]));
            Vertex {
                position: vec3_at(&mesh.positions, Vec3::ZERO),
                normal: vec3_at(&mesh.normals, Vec3::ZERO),
                uv,
                tangent: Vec4::ZERO,
                color: vec3_at(&mesh.vertex_color, Vec3::ONE).extend(1.0),
            }
        })
        .collect_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertices_flip_v_and_default_colour() {
        let mesh = tobj::Mesh {
            positions: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            normals: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            texcoords: vec![0.25, 0.0, 1.0, 0.75],
            indices: vec![0, 1, 0],
            ..Default::default()
        };
        let vertices = mesh_vertices(&mesh);
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[1].position, Vec3::new(3.0, 4.0, 5.0));
        assert_eq!(vertices[0].uv, Vec2::new(0.25, 1.0));
        assert_eq!(vertices[1].uv, Vec2::new(1.0, 0.25));
        assert_eq!(vertices[0].color, Vec4::ONE);
        assert_eq!(vertices[0].normal, Vec3::Z);
    }

    #[test]
    fn material_reads_pbr_extensions() {
        let mut material = tobj::Material {
            name: "painted".to_string(),
            diffuse: Some([0.5, 0.25, 1.0]),
            dissolve: Some(0.5),
            diffuse_texture: Some("albedo.png".to_string()),
            ..Default::default()
        };
        material.unknown_param.insert("Pm".to_string(), "0.9".to_string());
        material.unknown_param.insert("Pr".to_string(), "0.2".to_string());
        material.unknown_param.insert("Ke".to_string(), "1 0.5 0".to_string());
        material.unknown_param.insert("map_Bump".to_string(), "normal.png".to_string());

        let mut requested = vec![];
        let gpu = material_gpu(&material, |raw, kind| {
            requested.push((raw.to_string(), kind));
            requested.len() as u32
        });

        assert_eq!(gpu.base_color_factor, Vec4::new(0.5, 0.25, 1.0, 0.5));
        assert_eq!(gpu.alpha_mode(), AlphaMode::Blend);
        assert_eq!(gpu.metallic_factor, 0.9);
        assert_eq!(gpu.roughness_factor, 0.2);
        assert_eq!(gpu.emissive_factor, Vec4::new(1.0, 0.5, 0.0, 1.0));
        assert_eq!(gpu.base_color_texture, 1);
        assert_eq!(gpu.normal_texture, 2);
        assert_eq!(gpu.metallic_roughness_texture, 0);
        assert_eq!(
            requested,
            vec![
                ("albedo.png".to_string(), TextureKind::BaseColor),
                ("normal.png".to_string(), TextureKind::Normal)
            ]
        );
    }

    #[test]
    fn plain_material_defaults() {
        let gpu = material_gpu(&tobj::Material::default(), |_, _| unreachable!());
        assert_eq!(gpu.base_color_factor, Vec4::ONE);
        assert_eq!(gpu.alpha_mode(), AlphaMode::Opaque);
        assert_eq!(gpu.base_color_texture, 0);
    }
}
