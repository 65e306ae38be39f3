//! glTF 2.0 的加载
//!
//! 只读取 mesh 与材质，不处理 node 层级、skin、动画。
//! 格式参考 https://www.khronos.org/files/gltf20-reference-guide.pdf

use std::{path::Path, rc::Rc};

use anyhow::Context;
use ash::vk;
use glam::{Vec2, Vec3, Vec4};
use itertools::{Itertools, izip};
use prism_gfx::resources::{image::GfxImage, sampler::GfxSamplerDesc};
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

pub struct GltfLoader;

impl ModelLoader for GltfLoader {
    fn name(&self) -> &'static str {
        "glTF"
    }

    fn supports_extension(&self, extension: &str) -> bool {
        matches!(extension, ".gltf" | ".glb")
    }

    fn load(&self, path: &Path, ctx: &mut LoadContext) -> anyhow::Result<Model> {
        let _span = tracy_client::span!("GltfLoader::load");

        let gltf::Gltf { document, blob } =
            gltf::Gltf::open(path).with_context(|| format!("failed to parse glTF {}", path.display()))?;
        let base_dir = path.parent().unwrap_or(Path::new("."));
        let buffers = gltf::import_buffers(&document, Some(base_dir), blob).context("failed to load glTF buffers")?;

        let images = Self::load_images(&document, &buffers, base_dir, ctx);
        let texture_handles = Self::register_textures(&document, &images, ctx)?;
        let material_indices = Self::load_materials(&document, &texture_handles, ctx);
        let geometry = Self::load_geometry(&document, &buffers, &material_indices);

        let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        Model::upload(ctx.gfx, name, geometry, images, texture_handles)
    }
}
// tools
impl GltfLoader {
    /// 每张图片的用途由引用它的材质槽位决定，没有被引用的图片按 base color 处理
    fn image_kinds(document: &gltf::Document) -> Vec<TextureKind> {
        let mut kinds = vec![TextureKind::BaseColor; document.images().len()];
        let mut mark = |texture: gltf::Texture, kind: TextureKind| kinds[texture.source().index()] = kind;

        for material in document.materials() {
            let pbr = material.pbr_metallic_roughness();
            if let Some(info) = pbr.base_color_texture() {
                mark(info.texture(), TextureKind::BaseColor);
            }
            if let Some(info) = pbr.metallic_roughness_texture() {
                mark(info.texture(), TextureKind::MetallicRoughness);
            }
            if let Some(info) = material.normal_texture() {
                mark(info.texture(), TextureKind::Normal);
            }
            if let Some(info) = material.occlusion_texture() {
                mark(info.texture(), TextureKind::Occlusion);
            }
            if let Some(info) = material.emissive_texture() {
                mark(info.texture(), TextureKind::Emissive);
            }
        }
        kinds
    }

    /// 外部文件通过纹理缓存加载，内嵌的图片直接解码上传
    fn load_images(
        document: &gltf::Document,
        buffers: &[gltf::buffer::Data],
        base_dir: &Path,
        ctx: &mut LoadContext,
    ) -> Vec<Rc<GfxImage>> {
        let kinds = Self::image_kinds(document);
        document
            .images()
            .map(|image| {
                let kind = kinds[image.index()];
                match image.source() {
                    gltf::image::Source::Uri { uri, .. } if !uri.starts_with("data:") => {
                        let uri = percent_decode(uri);
                        match resolve_texture_path(base_dir, &uri) {
                            Some(file) => ctx.textures.load(ctx.gfx, &file, kind),
                            None => ctx.textures.missing(&base_dir.join(&uri), kind),
                        }
                    }
                    source => {
                        let name = format!("gltf-embedded-{}", image.index());
                        let decoded = gltf::image::Data::from_source(source, Some(base_dir), buffers)
                            .map_err(anyhow::Error::from)
                            .and_then(|data| {
                                let rgba = to_rgba8(data.format, &data.pixels)
                                    .with_context(|| format!("unsupported pixel format {:?}", data.format))?;
                                Ok((data.width, data.height, rgba))
                            });
                        match decoded {
                            Ok((width, height, rgba)) => {
                                ctx.textures.load_pixels(ctx.gfx, &name, width, height, &rgba, kind)
                            }
                            Err(e) => {
                                log::warn!("Failed to decode {}: {:#}", name, e);
                                ctx.textures.sentinel(kind.sentinel())
                            }
                        }
                    }
                }
            })
            .collect_vec()
    }

    /// glTF 中的 texture 是 image 与 sampler 的组合，每个组合在 bindless 中占一个位置
    fn register_textures(
        document: &gltf::Document,
        images: &[Rc<GfxImage>],
        ctx: &mut LoadContext,
    ) -> anyhow::Result<Vec<BindlessHandle>> {
        document
            .textures()
            .map(|texture| {
                let sampler = ctx.registry.create_sampler(&sampler_desc(&texture.sampler()))?;
                let image = &images[texture.source().index()];
                Ok(ctx.textures.register(ctx.bindless, image, sampler))
            })
            .collect()
    }

    fn load_materials(
        document: &gltf::Document,
        texture_handles: &[BindlessHandle],
        ctx: &mut LoadContext,
    ) -> Vec<u32> {
        let handle_of = |texture: gltf::Texture| texture_handles[texture.index()].index();

        let mut indices = document
            .materials()
            .enumerate()
            .map(|(i, material)| {
                let pbr = material.pbr_metallic_roughness();
                let [er, eg, eb] = material.emissive_factor();
                let alpha_mode = match material.alpha_mode() {
                    gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
                    gltf::material::AlphaMode::Mask => AlphaMode::Mask,
                    gltf::material::AlphaMode::Blend => AlphaMode::Blend,
                };

                let gpu = MaterialGpu {
                    base_color_factor: Vec4::from_array(pbr.base_color_factor()),
                    emissive_factor: Vec4::new(er, eg, eb, 1.0),
                    metallic_factor: pbr.metallic_factor(),
                    roughness_factor: pbr.roughness_factor(),
                    alpha_cutoff: material.alpha_cutoff().unwrap_or(0.5),
                    alpha_mode: alpha_mode as u32,
                    base_color_texture: pbr.base_color_texture().map_or(0, |t| handle_of(t.texture())),
                    normal_texture: material.normal_texture().map_or(0, |t| handle_of(t.texture())),
                    metallic_roughness_texture: pbr.metallic_roughness_texture().map_or(0, |t| handle_of(t.texture())),
                    emissive_texture: material.emissive_texture().map_or(0, |t| handle_of(t.texture())),
                    occlusion_texture: material.occlusion_texture().map_or(0, |t| handle_of(t.texture())),
                    double_sided: material.double_sided() as u32,
                    ..Default::default()
                };
                let name = material.name().map(str::to_string).unwrap_or_else(|| format!("material-{i}"));
                ctx.add_material(Material::new(name, gpu))
            })
            .collect_vec();

        if indices.is_empty() {
            indices.push(ctx.add_material(Material::new("Default", MaterialGpu::default())));
        }
        indices
    }

    fn load_geometry(document: &gltf::Document, buffers: &[gltf::buffer::Data], material_indices: &[u32]) -> ModelGeometry {
        let mut geometry = ModelGeometry::default();

        for mesh in document.meshes() {
            let mut primitives = vec![];
            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    log::warn!("Skip non-triangle primitive {:?} in mesh {:?}", primitive.mode(), mesh.name());
                    continue;
                }

                let reader = primitive.reader(|buffer| Some(buffers[buffer.index()].0.as_slice()));
                let Some(positions) = reader.read_positions() else {
                    log::warn!("Skip primitive without positions in mesh {:?}", mesh.name());
                    continue;
                };
                let positions = positions.map(Vec3::from_array).collect_vec();
                let count = positions.len();

                let normals = reader.read_normals().map_or_else(|| vec![[0.0; 3]; count], Iterator::collect);
                let tangents = reader.read_tangents().map_or_else(|| vec![[0.0; 4]; count], Iterator::collect);
                let uvs = reader.read_tex_coords(0).map_or_else(|| vec![[0.0; 2]; count], |uv| uv.into_f32().collect());
                let colors =
                    reader.read_colors(0).map_or_else(|| vec![[1.0; 4]; count], |c| c.into_rgba_f32().collect());
                let indices = reader
                    .read_indices()
                    .map_or_else(|| (0..count as u32).collect_vec(), |i| i.into_u32().collect_vec());

                let vertices = izip!(positions, normals, uvs, tangents, colors)
                    .map(|(position, normal, uv, tangent, color)| Vertex {
                        position,
                        normal: Vec3::from_array(normal),
                        uv: Vec2::from_array(uv),
                        tangent: Vec4::from_array(tangent),
                        color: Vec4::from_array(color),
                    })
                    .collect_vec();

                let material_index =
                    primitive.material().index().and_then(|i| material_indices.get(i)).unwrap_or(&material_indices[0]);
                primitives.push(geometry.push_primitive(&vertices, &indices, *material_index));
            }

            geometry.meshes.push(Mesh {
                name: mesh.name().unwrap_or_default().to_string(),
                primitives,
            });
        }
        geometry
    }
}

fn sampler_desc(sampler: &gltf::texture::Sampler) -> GfxSamplerDesc {
    use gltf::texture::{MagFilter, MinFilter, WrappingMode};

    let wrap = |mode: WrappingMode| match mode {
        WrappingMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        WrappingMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        WrappingMode::Repeat => vk::SamplerAddressMode::REPEAT,
    };
    let (min_filter, mipmap_mode) = match sampler.min_filter() {
        Some(MinFilter::Nearest | MinFilter::NearestMipmapNearest) => {
            (vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST)
        }
        Some(MinFilter::NearestMipmapLinear) => (vk::Filter::NEAREST, vk::SamplerMipmapMode::LINEAR),
        Some(MinFilter::LinearMipmapNearest) => (vk::Filter::LINEAR, vk::SamplerMipmapMode::NEAREST),
        Some(MinFilter::Linear | MinFilter::LinearMipmapLinear) | None => {
            (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR)
        }
    };
    let mag_filter = match sampler.mag_filter() {
        Some(MagFilter::Nearest) => vk::Filter::NEAREST,
        Some(MagFilter::Linear) | None => vk::Filter::LINEAR,
    };

    GfxSamplerDesc {
        mag_filter,
        min_filter,
        mipmap_mode,
        address_mode_u: wrap(sampler.wrap_s()),
        address_mode_v: wrap(sampler.wrap_t()),
        ..GfxSamplerDesc::material()
    }
}

/// 将 glTF 解码出的像素统一转换为 RGBA8，浮点格式不支持
fn to_rgba8(format: gltf::image::Format, pixels: &[u8]) -> Option<Vec<u8>> {
    use gltf::image::Format;

    let expand = |channels: usize, bytes_per_channel: usize| {
        // 16 位通道取高字节（小端存放）
        let stride = channels * bytes_per_channel;
        pixels
            .chunks_exact(stride)
            .flat_map(|px| {
                let c = |i: usize| if i < channels { px[i * bytes_per_channel + bytes_per_channel - 1] } else { 0 };
                match channels {
                    1 => [c(0), c(0), c(0), 255],
                    2 => [c(0), c(1), 0, 255],
                    3 => [c(0), c(1), c(2), 255],
                    _ => [c(0), c(1), c(2), c(3)],
                }
            })
            .collect_vec()
    };

    match format {
        Format::R8G8B8A8 => Some(pixels.to_vec()),
        Format::R8 => Some(expand(1, 1)),
        Format::R8G8 => Some(expand(2, 1)),
        Format::R8G8B8 => Some(expand(3, 1)),
        Format::R16 => Some(expand(1, 2)),
        Format::R16G16 => Some(expand(2, 2)),
        Format::R16G16B16 => Some(expand(3, 2)),
        Format::R16G16B16A16 => Some(expand(4, 2)),
        _ => None,
    }
}

/// uri 中的 `%XX` 转义
fn percent_decode(uri: &str) -> String {
    let bytes = uri.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let hex = bytes.get(i + 1..i + 3).and_then(|h| std::str::from_utf8(h).ok());
        match (bytes[i], hex.and_then(|h| u8::from_str_radix(h, 16).ok())) {
            (b'%', Some(value)) => {
                out.push(value);
                i += 3;
            }
            (b, _) => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gltf::image::Format;

    #[test]
    fn rgb_gets_opaque_alpha() {
        let rgba = to_rgba8(Format::R8G8B8, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(rgba, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn grey_is_splatted() {
        assert_eq!(to_rgba8(Format::R8, &[7]).unwrap(), vec![7, 7, 7, 255]);
    }

    #[test]
    fn sixteen_bit_keeps_high_byte() {
        let rgba = to_rgba8(Format::R16G16B16A16, &[0x00, 0xff, 0x34, 0x12, 0x00, 0x80, 0xff, 0xff]).unwrap();
        assert_eq!(rgba, vec![0xff, 0x12, 0x80, 0xff]);
    }

    #[test]
    fn float_formats_are_rejected() {
        assert!(to_rgba8(Format::R32G32B32A32FLOAT, &[0; 16]).is_none());
    }

    #[test]
    fn uri_unescape() {
        assert_eq!(percent_decode("my%20texture.png"), "my texture.png");
        assert_eq!(percent_decode("plain.png"), "plain.png");
        assert_eq!(percent_decode("bad%zz.png"), "bad%zz.png");
    }

    #[test]
    fn extensions() {
        assert!(GltfLoader.supports_extension(".gltf"));
        assert!(GltfLoader.supports_extension(".glb"));
        assert!(!GltfLoader.supports_extension(".obj"));
    }
}
