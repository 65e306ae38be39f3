use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    rc::Rc,
};

use ash::vk;
use prism_gfx::{
    gfx::Gfx,
    resources::image::{GfxImage, GfxImageCreateInfo},
};
use prism_render_interface::bindless::{BindlessDescriptorTable, BindlessHandle};

/// 纹理在材质中的用途，决定了格式以及缺失时的替代颜色
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    BaseColor,
    Normal,
    MetallicRoughness,
    Occlusion,
    Emissive,
}
impl TextureKind {
    /// 法线贴图存放的是向量，不能做 sRGB 解码
    #[inline]
    pub fn format(self) -> vk::Format {
        match self {
            Self::Normal => vk::Format::R8G8B8A8_UNORM,
            _ => vk::Format::R8G8B8A8_SRGB,
        }
    }

    #[inline]
    pub fn sentinel(self) -> Sentinel {
        match self {
            Self::BaseColor => Sentinel::Magenta,
            Self::Normal => Sentinel::FlatNormal,
            Self::MetallicRoughness | Self::Occlusion => Sentinel::White,
            Self::Emissive => Sentinel::Black,
        }
    }
}

/// 纹理缺失时使用的 1x1 纹理
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Sentinel {
    /// 显眼的品红色，提醒贴图丢失
    Magenta = 0,
    /// 切线空间中朝外的法线
    FlatNormal = 1,
    White = 2,
    Black = 3,
}
impl Sentinel {
    pub const ALL: [Self; 4] = [Self::Magenta, Self::FlatNormal, Self::White, Self::Black];

    #[inline]
    pub fn rgba(self) -> [u8; 4] {
        match self {
            Self::Magenta => [255, 0, 255, 255],
            Self::FlatNormal => [128, 128, 255, 255],
            Self::White => [255, 255, 255, 255],
            Self::Black => [0, 0, 0, 255],
        }
    }

    #[inline]
    pub fn format(self) -> vk::Format {
        match self {
            Self::FlatNormal => vk::Format::R8G8B8A8_UNORM,
            _ => vk::Format::R8G8B8A8_SRGB,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Magenta => "sentinel-magenta",
            Self::FlatNormal => "sentinel-flat-normal",
            Self::White => "sentinel-white",
            Self::Black => "sentinel-black",
        }
    }
}

/// 只记录第一次出现的路径，用于避免重复的日志
#[derive(Default)]
pub struct MissingPaths {
    seen: HashSet<PathBuf>,
}
impl MissingPaths {
    /// 第一次遇到这个路径时返回 true
    pub fn note(&mut self, path: &Path) -> bool {
        self.seen.insert(path.to_path_buf())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// 将图片文件的内容解码为 RGBA8
pub fn decode_rgba8(bytes: &[u8]) -> anyhow::Result<(u32, u32, Vec<u8>)> {
    let image = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = image.dimensions();
    Ok((width, height, image.into_raw()))
}

/// 纹理缓存
///
/// - 按照 (规范化路径, 格式) 缓存 image，同一张图被多个模型引用时只上传一次
/// - 找不到或者解码失败的纹理返回对应用途的 sentinel，每个路径只报一次 warning
/// - 相同 (view, sampler) 的组合在 bindless 表中只注册一次
pub struct TextureCache {
    sentinels: Vec<Rc<GfxImage>>,
    images: HashMap<(PathBuf, vk::Format), Rc<GfxImage>>,
    registered: HashMap<(vk::ImageView, vk::Sampler), BindlessHandle>,
    missing: MissingPaths,
}
// new & init
impl TextureCache {
    pub fn new(gfx: &Gfx) -> anyhow::Result<Self> {
        let sentinels = Sentinel::ALL
            .iter()
            .map(|s| Self::create_image(gfx, s.name(), 1, 1, &s.rgba(), s.format()).map(Rc::new))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            sentinels,
            images: HashMap::new(),
            registered: HashMap::new(),
            missing: MissingPaths::default(),
        })
    }
}
// getters
impl TextureCache {
    #[inline]
    pub fn sentinel(&self, sentinel: Sentinel) -> Rc<GfxImage> {
        self.sentinels[sentinel as usize].clone()
    }

    #[inline]
    pub fn cached_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }
}
// tools
impl TextureCache {
    /// 从文件加载纹理，失败时返回 sentinel
    pub fn load(&mut self, gfx: &Gfx, path: &Path, kind: TextureKind) -> Rc<GfxImage> {
        let _span = tracy_client::span!("TextureCache::load");
        let Ok(canonical) = path.canonicalize() else {
            return self.missing(path, kind);
        };

        let key = (canonical, kind.format());
        if let Some(image) = self.images.get(&key) {
            return image.clone();
        }

        let loaded = std::fs::read(&key.0)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| decode_rgba8(&bytes))
            .and_then(|(width, height, pixels)| {
                Self::create_image(gfx, &key.0.to_string_lossy(), width, height, &pixels, kind.format())
            });
        match loaded {
            Ok(image) => {
                log::info!("Loaded texture: {}", key.0.display());
                let image = Rc::new(image);
                self.images.insert(key, image.clone());
                image
            }
            Err(e) => {
                if self.missing.note(path) {
                    log::error!("Failed to load texture {}: {:#}", path.display(), e);
                }
                self.sentinel(kind.sentinel())
            }
        }
    }

    /// 已经解码好的 RGBA8 像素，例如 glb 中内嵌的图片，不进入缓存
    pub fn load_pixels(
        &mut self,
        gfx: &Gfx,
        name: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
        kind: TextureKind,
    ) -> Rc<GfxImage> {
        match Self::create_image(gfx, name, width, height, rgba, kind.format()) {
            Ok(image) => Rc::new(image),
            Err(e) => {
                log::error!("Failed to upload embedded texture {}: {:#}", name, e);
                self.sentinel(kind.sentinel())
            }
        }
    }

    /// 纹理路径无法解析时调用
    pub fn missing(&mut self, path: &Path, kind: TextureKind) -> Rc<GfxImage> {
        if self.missing.note(path) {
            log::warn!("Texture file not found: {}, using {:?} sentinel", path.display(), kind.sentinel());
        }
        self.sentinel(kind.sentinel())
    }

    /// 将 image 的默认 view 与 sampler 注册到 bindless 表
    ///
    /// 表满的时候记录日志并返回 [`BindlessHandle::NULL`]，shader 会使用默认值
    pub fn register(
        &mut self,
        bindless: &mut BindlessDescriptorTable,
        image: &GfxImage,
        sampler: vk::Sampler,
    ) -> BindlessHandle {
        let key = (image.default_view(), sampler);
        if let Some(&handle) = self.registered.get(&key) {
            return handle;
        }
        match bindless.register_image(key.0, sampler) {
            Ok(handle) => {
                self.registered.insert(key, handle);
                handle
            }
            Err(e) => {
                log::warn!("Failed to register texture {}: {:#}", image.name(), e);
                BindlessHandle::NULL
            }
        }
    }

    fn create_image(
        gfx: &Gfx,
        name: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
        format: vk::Format,
    ) -> anyhow::Result<GfxImage> {
        let info = GfxImageCreateInfo::new_image_2d_info(
            vk::Extent2D { width, height },
            format,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        )
        .with_full_mips();
        let image = GfxImage::new(gfx, &info, name)?;
        image.upload_sync(gfx, rgba)?;
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_colours() {
        assert_eq!(TextureKind::BaseColor.sentinel().rgba(), [255, 0, 255, 255]);
        assert_eq!(TextureKind::Normal.sentinel().rgba(), [128, 128, 255, 255]);
        assert_eq!(TextureKind::MetallicRoughness.sentinel().rgba(), [255, 255, 255, 255]);
        assert_eq!(TextureKind::Occlusion.sentinel(), Sentinel::White);
        assert_eq!(TextureKind::Emissive.sentinel().rgba(), [0, 0, 0, 255]);
    }

    #[test]
    fn only_normals_are_linear() {
        assert_eq!(TextureKind::Normal.format(), vk::Format::R8G8B8A8_UNORM);
        assert_eq!(Sentinel::FlatNormal.format(), vk::Format::R8G8B8A8_UNORM);
        for kind in [TextureKind::BaseColor, TextureKind::MetallicRoughness, TextureKind::Occlusion, TextureKind::Emissive]
        {
            assert_eq!(kind.format(), vk::Format::R8G8B8A8_SRGB);
        }
        // 数组下标与枚举值一致
        for (i, s) in Sentinel::ALL.iter().enumerate() {
            assert_eq!(*s as usize, i);
        }
    }

    #[test]
    fn missing_paths_logged_once() {
        let mut missing = MissingPaths::default();
        assert!(missing.note(Path::new("a.png")));
        assert!(!missing.note(Path::new("a.png")));
        assert!(missing.note(Path::new("b.png")));
        assert_eq!(missing.len(), 2);
    }

    #[test]
    fn decode_png() {
        let mut png = Vec::new();
        let source = image::RgbaImage::from_raw(2, 1, vec![255, 0, 0, 255, 0, 255, 0, 128]).unwrap();
        source.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png).unwrap();

        let (w, h, pixels) = decode_rgba8(&png).unwrap();
        assert_eq!((w, h), (2, 1));
        assert_eq!(pixels, vec![255, 0, 0, 255, 0, 255, 0, 128]);
        assert!(decode_rgba8(b"not an image").is_err());
    }
}
