use std::rc::Rc;

use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::{
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    pipelines::{
        pipeline_layout::GfxPipelineLayout,
        shader::{GfxShaderModule, GfxShaderStageInfo},
    },
};

pub struct GfxGraphicsPipeline {
    pipeline: vk::Pipeline,

    /// 多个 pipeline 可以使用同一个 pipeline layout
    pipeline_layout: Rc<GfxPipelineLayout>,
    device: Rc<GfxDevice>,
}
// new & init
impl GfxGraphicsPipeline {
    pub fn new(
        device: Rc<GfxDevice>,
        create_info: &GfxGraphicsPipelineCreateInfo,
        pipeline_layout: Rc<GfxPipelineLayout>,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("GfxGraphicsPipeline::new");

        // dynamic rendering 需要的 framebuffer 信息
        let mut attach_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&create_info.color_attach_formats)
            .depth_attachment_format(create_info.depth_attach_format);

        // shader module 在 pipeline 创建完成后即可释放
        let shader_modules: Vec<GfxShaderModule> = create_info
            .shader_stages
            .iter()
            .map(|stage| GfxShaderModule::load(device.clone(), &stage.path))
            .try_collect()
            .with_context(|| format!("failed to load shaders of pipeline {debug_name}"))?;
        let shader_stages_info = create_info
            .shader_stages
            .iter()
            .zip(shader_modules.iter())
            .map(|(stage, module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.stage)
                    .module(module.handle())
                    .name(stage.entry_point)
            })
            .collect_vec();

        let vertex_input_state_info = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&create_info.vertex_binding_desc)
            .vertex_attribute_descriptions(&create_info.vertex_attribute_desc);

        let input_assembly_info = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(create_info.primitive_topology)
            .primitive_restart_enable(false);

        // viewport 和 scissor 具体值由 dynamic 决定，但是数量由该 create info 决定
        let viewport_info = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };

        let msaa_info =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // 混合设置：需要为每个 color attachment 分别指定
        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&create_info.color_attach_blend_states);

        let dynamic_state_info =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&create_info.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages_info)
            .vertex_input_state(&vertex_input_state_info)
            .input_assembly_state(&input_assembly_info)
            .viewport_state(&viewport_info)
            .rasterization_state(&create_info.rasterize_state_info)
            .multisample_state(&msaa_info)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&create_info.depth_stencil_info)
            .layout(pipeline_layout.handle())
            .dynamic_state(&dynamic_state_info)
            .push_next(&mut attach_info);

        let pipeline = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
                .map_err(|(_, e)| e)
                .with_context(|| format!("failed to create graphics pipeline {debug_name}"))?[0]
        };

        let pipeline = Self {
            pipeline,
            pipeline_layout,
            device,
        };
        pipeline.device.set_debug_name(&pipeline, debug_name);
        Ok(pipeline)
    }
}
impl Drop for GfxGraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}
// getters
impl GfxGraphicsPipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> &GfxPipelineLayout {
        &self.pipeline_layout
    }
}
impl DebugType for GfxGraphicsPipeline {
    fn debug_type_name() -> &'static str {
        "GfxGraphicsPipeline"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.pipeline
    }
}

pub struct GfxGraphicsPipelineCreateInfo {
    /// dynamic render 需要的 framebuffer 信息
    color_attach_formats: Vec<vk::Format>,
    /// format = undefined 表示不使用这个 attachment
    depth_attach_format: vk::Format,

    shader_stages: Vec<GfxShaderStageInfo>,

    vertex_binding_desc: Vec<vk::VertexInputBindingDescription>,
    vertex_attribute_desc: Vec<vk::VertexInputAttributeDescription>,

    primitive_topology: vk::PrimitiveTopology,

    rasterize_state_info: vk::PipelineRasterizationStateCreateInfo<'static>,

    color_attach_blend_states: Vec<vk::PipelineColorBlendAttachmentState>,

    depth_stencil_info: vk::PipelineDepthStencilStateCreateInfo<'static>,

    dynamic_states: Vec<vk::DynamicState>,
}
impl Default for GfxGraphicsPipelineCreateInfo {
    fn default() -> Self {
        Self {
            color_attach_formats: vec![],
            depth_attach_format: vk::Format::UNDEFINED,

            shader_stages: vec![],

            vertex_binding_desc: vec![],
            vertex_attribute_desc: vec![],

            primitive_topology: vk::PrimitiveTopology::TRIANGLE_LIST,

            rasterize_state_info: vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(vk::PolygonMode::FILL)
                .line_width(1.0)
                .cull_mode(vk::CullModeFlags::BACK)
                // 按照 OpenGL 的传统，将 CCW 视为 front face
                .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
                .depth_bias_enable(false),

            color_attach_blend_states: vec![],

            depth_stencil_info: vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(true)
                .depth_write_enable(true)
                .depth_compare_op(vk::CompareOp::LESS)
                .depth_bounds_test_enable(false)
                .stencil_test_enable(false),
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }
}
// builder
impl GfxGraphicsPipelineCreateInfo {
    /// 同时为每个 color attachment 设置不混合的 blend state
    #[inline]
    pub fn attach_info(&mut self, color_attach_formats: Vec<vk::Format>, depth_format: Option<vk::Format>) -> &mut Self {
        self.color_attach_blend_states = vec![Self::opaque_blend_state(); color_attach_formats.len()];
        self.color_attach_formats = color_attach_formats;
        self.depth_attach_format = depth_format.unwrap_or(vk::Format::UNDEFINED);
        self
    }

    #[inline]
    pub fn vertex_shader_stage(&mut self, path: impl Into<std::path::PathBuf>) -> &mut Self {
        self.shader_stages.push(GfxShaderStageInfo::new(vk::ShaderStageFlags::VERTEX, path));
        self
    }

    #[inline]
    pub fn fragment_shader_stage(&mut self, path: impl Into<std::path::PathBuf>) -> &mut Self {
        self.shader_stages.push(GfxShaderStageInfo::new(vk::ShaderStageFlags::FRAGMENT, path));
        self
    }

    #[inline]
    pub fn vertex_binding(&mut self, bindings: Vec<vk::VertexInputBindingDescription>) -> &mut Self {
        self.vertex_binding_desc = bindings;
        self
    }

    #[inline]
    pub fn vertex_attribute(&mut self, attributes: Vec<vk::VertexInputAttributeDescription>) -> &mut Self {
        self.vertex_attribute_desc = attributes;
        self
    }

    /// 为每个 color attachment 指定 blend 操作，需要在 attach_info 之后调用
    #[inline]
    pub fn color_blend(&mut self, states: Vec<vk::PipelineColorBlendAttachmentState>) -> &mut Self {
        self.color_attach_blend_states = states;
        self
    }

    #[inline]
    pub fn cull_mode(&mut self, mode: vk::CullModeFlags, front_face: vk::FrontFace) -> &mut Self {
        self.rasterize_state_info.cull_mode = mode;
        self.rasterize_state_info.front_face = front_face;
        self
    }

    /// `None` 表示关闭深度测试
    #[inline]
    pub fn depth_test(&mut self, depth_test_op: Option<vk::CompareOp>, depth_write: bool) -> &mut Self {
        self.depth_stencil_info.depth_test_enable = depth_test_op.map_or(vk::FALSE, |_| vk::TRUE);
        self.depth_stencil_info.depth_compare_op = depth_test_op.unwrap_or(vk::CompareOp::NEVER);
        self.depth_stencil_info.depth_write_enable = if depth_write { vk::TRUE } else { vk::FALSE };
        self
    }
}
// tools
impl GfxGraphicsPipelineCreateInfo {
    /// 不进行混合，写入所有通道
    pub fn opaque_blend_state() -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
    }

    /// 标准的 alpha 混合，用于 UI
    pub fn alpha_blend_state() -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_info_sets_one_blend_state_per_color_target() {
        let mut info = GfxGraphicsPipelineCreateInfo::default();
        info.attach_info(
            vec![vk::Format::R16G16B16A16_SFLOAT, vk::Format::R16G16B16A16_SFLOAT, vk::Format::R16G16_SFLOAT],
            Some(vk::Format::D32_SFLOAT),
        );
        assert_eq!(info.color_attach_blend_states.len(), 3);
        assert_eq!(info.depth_attach_format, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn depth_test_none_disables_test() {
        let mut info = GfxGraphicsPipelineCreateInfo::default();
        info.depth_test(None, false);
        assert_eq!(info.depth_stencil_info.depth_test_enable, vk::FALSE);
        assert_eq!(info.depth_stencil_info.depth_write_enable, vk::FALSE);

        info.depth_test(Some(vk::CompareOp::LESS_OR_EQUAL), false);
        assert_eq!(info.depth_stencil_info.depth_test_enable, vk::TRUE);
        assert_eq!(info.depth_stencil_info.depth_compare_op, vk::CompareOp::LESS_OR_EQUAL);
    }
}
