use std::{collections::HashMap, rc::Rc};

use ash::vk;

use crate::foundation::device::GfxDevice;

/// sampler 的描述，作为去重的 key
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GfxSamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
    pub address_mode_w: vk::SamplerAddressMode,
    /// 0 表示不开启各向异性过滤
    pub max_anisotropy: u32,
    pub compare_op: Option<vk::CompareOp>,
    pub border_color: vk::BorderColor,
}
impl Default for GfxSamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            max_anisotropy: 0,
            compare_op: None,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        }
    }
}
// 常用的 sampler
impl GfxSamplerDesc {
    /// 普通材质纹理：线性过滤，repeat，16x 各向异性
    pub fn material() -> Self {
        Self {
            max_anisotropy: 16,
            ..Default::default()
        }
    }

    /// 全屏 pass 读取 HDR 等 render target
    pub fn linear_clamp() -> Self {
        Self {
            address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_w: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            ..Default::default()
        }
    }

    /// 噪声纹理
    pub fn nearest_repeat() -> Self {
        Self {
            mag_filter: vk::Filter::NEAREST,
            min_filter: vk::Filter::NEAREST,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
            ..Default::default()
        }
    }

    /// shadow map：超出范围的部分视为没有遮挡
    pub fn shadow() -> Self {
        Self {
            address_mode_u: vk::SamplerAddressMode::CLAMP_TO_BORDER,
            address_mode_v: vk::SamplerAddressMode::CLAMP_TO_BORDER,
            address_mode_w: vk::SamplerAddressMode::CLAMP_TO_BORDER,
            border_color: vk::BorderColor::FLOAT_OPAQUE_WHITE,
            ..Default::default()
        }
    }
}

/// 根据 desc 去重的 sampler 表，与 device 无关
#[derive(Default)]
pub struct SamplerTable {
    samplers: HashMap<GfxSamplerDesc, vk::Sampler>,
}
impl SamplerTable {
    /// 相同的 desc 只会调用一次 `create`
    pub fn get_or_create(
        &mut self,
        desc: &GfxSamplerDesc,
        create: impl FnOnce(&GfxSamplerDesc) -> anyhow::Result<vk::Sampler>,
    ) -> anyhow::Result<vk::Sampler> {
        if let Some(&sampler) = self.samplers.get(desc) {
            return Ok(sampler);
        }
        let sampler = create(desc)?;
        self.samplers.insert(*desc, sampler);
        Ok(sampler)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = vk::Sampler> + '_ {
        self.samplers.drain().map(|(_, sampler)| sampler)
    }
}

/// sampler 缓存，所有 sampler 在 drop 时一起销毁
pub struct GfxSamplerCache {
    table: SamplerTable,
    max_anisotropy_limit: f32,
    device: Rc<GfxDevice>,
}
// new & init
impl GfxSamplerCache {
    pub fn new(device: Rc<GfxDevice>, max_anisotropy_limit: f32) -> Self {
        Self {
            table: SamplerTable::default(),
            max_anisotropy_limit,
            device,
        }
    }
}
impl Drop for GfxSamplerCache {
    fn drop(&mut self) {
        self.clear();
    }
}
// destroy
impl GfxSamplerCache {
    /// 销毁所有 sampler，之后仍然可以继续创建
    pub fn clear(&mut self) {
        if self.table.is_empty() {
            return;
        }
        log::info!("Destroying {} samplers", self.table.len());
        for sampler in self.table.drain() {
            unsafe {
                self.device.destroy_sampler(sampler, None);
            }
        }
    }
}
// tools
impl GfxSamplerCache {
    pub fn get_sampler(&mut self, desc: &GfxSamplerDesc) -> anyhow::Result<vk::Sampler> {
        let device = &self.device;
        let limit = self.max_anisotropy_limit;
        self.table.get_or_create(desc, |desc| Self::create_vk_sampler(device, desc, limit))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn create_vk_sampler(
        device: &GfxDevice,
        desc: &GfxSamplerDesc,
        max_anisotropy_limit: f32,
    ) -> anyhow::Result<vk::Sampler> {
        let mut create_info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.mag_filter)
            .min_filter(desc.min_filter)
            .address_mode_u(desc.address_mode_u)
            .address_mode_v(desc.address_mode_v)
            .address_mode_w(desc.address_mode_w)
            .mipmap_mode(desc.mipmap_mode)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(desc.border_color);

        if desc.max_anisotropy > 0 {
            let anisotropy = (desc.max_anisotropy as f32).min(max_anisotropy_limit);
            create_info = create_info.anisotropy_enable(true).max_anisotropy(anisotropy);
        }

        if let Some(compare_op) = desc.compare_op {
            create_info = create_info.compare_enable(true).compare_op(compare_op);
        }

        let sampler = unsafe { device.create_sampler(&create_info, None)? };
        device.set_object_debug_name(sampler, format!("Sampler::{:?}", desc.address_mode_u));
        Ok(sampler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn same_desc_returns_same_sampler() {
        let mut table = SamplerTable::default();
        let mut created = 0u64;
        let mut create = |_: &GfxSamplerDesc| -> anyhow::Result<vk::Sampler> {
            created += 1;
            Ok(vk::Sampler::from_raw(created))
        };

        let a = table.get_or_create(&GfxSamplerDesc::linear_clamp(), &mut create).unwrap();
        let b = table.get_or_create(&GfxSamplerDesc::linear_clamp(), &mut create).unwrap();
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);

        let c = table.get_or_create(&GfxSamplerDesc::shadow(), &mut create).unwrap();
        assert_ne!(a, c);
        assert_eq!(table.len(), 2);
        assert_eq!(created, 2);
    }

    #[test]
    fn failed_creation_is_not_cached() {
        let mut table = SamplerTable::default();
        let result = table.get_or_create(&GfxSamplerDesc::default(), |_| anyhow::bail!("device lost"));
        assert!(result.is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn presets_differ() {
        assert_ne!(GfxSamplerDesc::linear_clamp(), GfxSamplerDesc::nearest_repeat());
        assert_eq!(GfxSamplerDesc::shadow().border_color, vk::BorderColor::FLOAT_OPAQUE_WHITE);
        assert_eq!(GfxSamplerDesc::nearest_repeat().mag_filter, vk::Filter::NEAREST);
    }
}
