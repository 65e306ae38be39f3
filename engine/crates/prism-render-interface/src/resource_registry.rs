use std::{path::PathBuf, rc::Rc};

use anyhow::Context;
use ash::vk;
use prism_gfx::{
    gfx::Gfx,
    pipelines::{
        compute_pipeline::GfxComputePipeline,
        graphics_pipeline::{GfxGraphicsPipeline, GfxGraphicsPipelineCreateInfo},
        pipeline_layout::GfxPipelineLayout,
    },
    resources::{
        buffer::GfxBuffer,
        image::{GfxImage, GfxImageCreateInfo},
        image_view::GfxImageView,
        sampler::{GfxSamplerCache, GfxSamplerDesc},
    },
};
use slotmap::SlotMap;

use crate::gpu_types::Vertex;

slotmap::new_key_type! {
    pub struct ImageHandle;
    pub struct ImageViewHandle;
    pub struct BufferHandle;
    pub struct PipelineLayoutHandle;
    pub struct GraphicsPipelineHandle;
    pub struct ComputePipelineHandle;
}

/// 单个 pipeline layout 的 push constant 上限
pub const MAX_PUSH_CONSTANT_SIZE: u32 = 96;

pub type SamplerSpecs = GfxSamplerDesc;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImageKind {
    Image2D,
    Image2DArray { layers: u32 },
    Cube,
}

#[derive(Clone, Debug)]
pub struct ImageSpecs {
    pub name: String,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub kind: ImageKind,
    /// 是否生成完整的 mip 链
    pub full_mips: bool,
}
impl ImageSpecs {
    pub fn image_2d(name: impl Into<String>, extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            name: name.into(),
            extent,
            format,
            usage,
            kind: ImageKind::Image2D,
            full_mips: false,
        }
    }

    fn create_info(&self) -> GfxImageCreateInfo {
        let info = match self.kind {
            ImageKind::Image2D => GfxImageCreateInfo::new_image_2d_info(self.extent, self.format, self.usage),
            ImageKind::Image2DArray { layers } => {
                GfxImageCreateInfo::new_image_2d_array_info(self.extent, layers, self.format, self.usage)
            }
            ImageKind::Cube => GfxImageCreateInfo::new_image_cube_info(self.extent.width, self.format, self.usage),
        };
        if self.full_mips { info.with_full_mips() } else { info }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemoryDomain {
    /// 持久映射，CPU 直接 memcpy
    HostVisible,
    /// 只能通过 staging buffer 写入
    DeviceLocal,
}

#[derive(Clone, Debug)]
pub struct BufferSpecs {
    pub name: String,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub memory: MemoryDomain,
}

#[derive(Clone, Debug)]
pub struct PipelineLayoutSpecs {
    pub name: String,
    pub push_constant_stages: vk::ShaderStageFlags,
    pub push_constant_size: u32,
}

#[derive(Clone, Debug, Default)]
pub enum VertexInput {
    /// 不使用 vertex buffer（全屏三角形、天空盒）
    #[default]
    None,
    /// 场景网格的 [`Vertex`]
    Mesh,
    Custom {
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    },
}

#[derive(Clone, Debug)]
pub struct GraphicsPipelineSpecs {
    pub name: String,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub vertex_input: VertexInput,
    pub color_formats: Vec<vk::Format>,
    pub depth_format: Option<vk::Format>,
    /// `None` 表示关闭深度测试
    pub depth_compare_op: Option<vk::CompareOp>,
    pub depth_write: bool,
    pub cull_mode: vk::CullModeFlags,
    /// 为空时所有 attachment 都不混合
    pub blend_states: Vec<vk::PipelineColorBlendAttachmentState>,
    pub layout: PipelineLayoutHandle,
}

#[derive(Clone, Debug)]
pub struct ComputePipelineSpecs {
    pub name: String,
    pub shader: PathBuf,
    pub layout: PipelineLayoutHandle,
}

/// GPU 资源的所有者
///
/// 对外只暴露 slotmap handle。销毁顺序：
/// pipelines → pipeline layouts → samplers → image views → images → buffers。
/// shader module 在 pipeline 创建完成后立即释放，descriptor pool/layout 由 bindless table 负责
pub struct ResourceRegistry {
    graphics_pipelines: SlotMap<GraphicsPipelineHandle, GfxGraphicsPipeline>,
    compute_pipelines: SlotMap<ComputePipelineHandle, GfxComputePipeline>,
    pipeline_layouts: SlotMap<PipelineLayoutHandle, Rc<GfxPipelineLayout>>,
    samplers: GfxSamplerCache,
    image_views: SlotMap<ImageViewHandle, GfxImageView>,
    images: SlotMap<ImageHandle, GfxImage>,
    buffers: SlotMap<BufferHandle, GfxBuffer>,

    /// 全局 bindless set layout，所有 pipeline layout 共用
    global_set_layout: vk::DescriptorSetLayout,
}

// new & init
impl ResourceRegistry {
    pub fn new(gfx: &Gfx, global_set_layout: vk::DescriptorSetLayout) -> Self {
        Self {
            graphics_pipelines: SlotMap::with_key(),
            compute_pipelines: SlotMap::with_key(),
            pipeline_layouts: SlotMap::with_key(),
            samplers: GfxSamplerCache::new(gfx.device().clone(), gfx.physical_device().max_sampler_anisotropy()),
            image_views: SlotMap::with_key(),
            images: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            global_set_layout,
        }
    }
}

// destroy
impl ResourceRegistry {
    /// 需要在 device idle 之后调用
    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    fn destroy_mut(&mut self) {
        let _span = tracy_client::span!("ResourceRegistry::destroy");
        self.graphics_pipelines.clear();
        self.compute_pipelines.clear();
        self.pipeline_layouts.clear();
        self.samplers.clear();
        self.image_views.clear();
        self.images.clear();
        self.buffers.clear();
    }
}
impl Drop for ResourceRegistry {
    fn drop(&mut self) {
        self.destroy_mut();
    }
}

// factories
impl ResourceRegistry {
    pub fn create_image(&mut self, gfx: &Gfx, specs: &ImageSpecs) -> anyhow::Result<ImageHandle> {
        let image = GfxImage::new(gfx, &specs.create_info(), &specs.name)
            .with_context(|| format!("failed to create image {}", specs.name))?;
        Ok(self.images.insert(image))
    }

    /// 接管一个已经创建好的 image，例如上传完数据的纹理
    pub fn register_image(&mut self, image: GfxImage) -> ImageHandle {
        self.images.insert(image)
    }

    /// 为 2D array 的某一层创建单独的 view，例如 CSM 的某个 cascade
    pub fn create_layer_view(&mut self, image: ImageHandle, layer: u32) -> anyhow::Result<ImageViewHandle> {
        let image = self.images.get(image).context("image handle is stale")?;
        let view = image.create_layer_view(layer, format!("{}-layer{}", image.name(), layer))?;
        Ok(self.image_views.insert(view))
    }

    pub fn create_buffer(&mut self, gfx: &Gfx, specs: &BufferSpecs) -> anyhow::Result<BufferHandle> {
        let buffer = match specs.memory {
            MemoryDomain::HostVisible => GfxBuffer::new(gfx, specs.size, specs.usage, None, true, &specs.name)?,
            MemoryDomain::DeviceLocal => GfxBuffer::new_device_local(gfx, specs.size, specs.usage, &specs.name)?,
        };
        Ok(self.buffers.insert(buffer))
    }

    /// 相同的 specs 返回同一个 sampler
    pub fn create_sampler(&mut self, specs: &SamplerSpecs) -> anyhow::Result<vk::Sampler> {
        self.samplers.get_sampler(specs)
    }

    pub fn create_pipeline_layout(
        &mut self,
        gfx: &Gfx,
        specs: &PipelineLayoutSpecs,
    ) -> anyhow::Result<PipelineLayoutHandle> {
        anyhow::ensure!(
            specs.push_constant_size <= MAX_PUSH_CONSTANT_SIZE,
            "push constant of {} is {} bytes, exceeds {}",
            specs.name,
            specs.push_constant_size,
            MAX_PUSH_CONSTANT_SIZE
        );
        anyhow::ensure!(
            specs.push_constant_size <= gfx.physical_device().max_push_constants_size(),
            "push constant of {} exceeds device limit",
            specs.name
        );

        let layout = GfxPipelineLayout::new(
            gfx.device().clone(),
            &[self.global_set_layout],
            specs.push_constant_stages,
            specs.push_constant_size,
            &specs.name,
        )?;
        Ok(self.pipeline_layouts.insert(Rc::new(layout)))
    }

    pub fn create_graphics_pipeline(
        &mut self,
        gfx: &Gfx,
        specs: &GraphicsPipelineSpecs,
    ) -> anyhow::Result<GraphicsPipelineHandle> {
        let _span = tracy_client::span!("ResourceRegistry::create_graphics_pipeline");
        let layout = self.pipeline_layouts.get(specs.layout).context("pipeline layout handle is stale")?.clone();

        let mut ci = GfxGraphicsPipelineCreateInfo::default();
        ci.vertex_shader_stage(&specs.vertex_shader)
            .fragment_shader_stage(&specs.fragment_shader)
            .attach_info(specs.color_formats.clone(), specs.depth_format)
            .depth_test(specs.depth_compare_op, specs.depth_write)
            .cull_mode(specs.cull_mode, vk::FrontFace::COUNTER_CLOCKWISE);
        match &specs.vertex_input {
            VertexInput::None => {}
            VertexInput::Mesh => {
                ci.vertex_binding(Vertex::binding_desc()).vertex_attribute(Vertex::attribute_desc());
            }
            VertexInput::Custom { bindings, attributes } => {
                ci.vertex_binding(bindings.clone()).vertex_attribute(attributes.clone());
            }
        }
        if !specs.blend_states.is_empty() {
            ci.color_blend(specs.blend_states.clone());
        }

        let pipeline = GfxGraphicsPipeline::new(gfx.device().clone(), &ci, layout, &specs.name)?;
        Ok(self.graphics_pipelines.insert(pipeline))
    }

    pub fn create_compute_pipeline(
        &mut self,
        gfx: &Gfx,
        specs: &ComputePipelineSpecs,
    ) -> anyhow::Result<ComputePipelineHandle> {
        let layout = self.pipeline_layouts.get(specs.layout).context("pipeline layout handle is stale")?.clone();
        let pipeline = GfxComputePipeline::new(gfx.device().clone(), &specs.shader, layout, &specs.name)?;
        Ok(self.compute_pipelines.insert(pipeline))
    }
}

// getters
impl ResourceRegistry {
    #[inline]
    pub fn image(&self, handle: ImageHandle) -> anyhow::Result<&GfxImage> {
        self.images.get(handle).context("image handle is stale")
    }

    #[inline]
    pub fn image_view(&self, handle: ImageViewHandle) -> anyhow::Result<&GfxImageView> {
        self.image_views.get(handle).context("image view handle is stale")
    }

    #[inline]
    pub fn buffer(&self, handle: BufferHandle) -> anyhow::Result<&GfxBuffer> {
        self.buffers.get(handle).context("buffer handle is stale")
    }

    #[inline]
    pub fn pipeline_layout(&self, handle: PipelineLayoutHandle) -> anyhow::Result<&GfxPipelineLayout> {
        self.pipeline_layouts.get(handle).map(|l| l.as_ref()).context("pipeline layout handle is stale")
    }

    #[inline]
    pub fn graphics_pipeline(&self, handle: GraphicsPipelineHandle) -> anyhow::Result<&GfxGraphicsPipeline> {
        self.graphics_pipelines.get(handle).context("graphics pipeline handle is stale")
    }

    #[inline]
    pub fn compute_pipeline(&self, handle: ComputePipelineHandle) -> anyhow::Result<&GfxComputePipeline> {
        self.compute_pipelines.get(handle).context("compute pipeline handle is stale")
    }
}

// remove
impl ResourceRegistry {
    /// 调用者需要保证 GPU 不再使用该 image，以及它的 layer view
    pub fn remove_image(&mut self, handle: ImageHandle) {
        self.images.remove(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_specs_pick_view_type_from_kind() {
        let extent = vk::Extent2D {
            width: 4096,
            height: 4096,
        };
        let mut specs = ImageSpecs::image_2d(
            "shadow",
            extent,
            vk::Format::D32_SFLOAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        );
        specs.kind = ImageKind::Image2DArray { layers: 4 };
        let info = specs.create_info();
        assert_eq!(info.as_info().array_layers, 4);
        assert_eq!(info.as_info().mip_levels, 1);

        specs.kind = ImageKind::Image2D;
        specs.full_mips = true;
        assert_eq!(specs.create_info().as_info().mip_levels, 13);

        specs.kind = ImageKind::Cube;
        assert!(specs.create_info().as_info().flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE));
    }
}
