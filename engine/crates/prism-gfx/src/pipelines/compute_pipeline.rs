use std::{path::Path, rc::Rc};

use anyhow::Context;
use ash::vk;

use crate::{
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    pipelines::{pipeline_layout::GfxPipelineLayout, shader::GfxShaderModule},
};

pub struct GfxComputePipeline {
    pipeline: vk::Pipeline,
    pipeline_layout: Rc<GfxPipelineLayout>,
    device: Rc<GfxDevice>,
}
// new & init
impl GfxComputePipeline {
    pub fn new(
        device: Rc<GfxDevice>,
        shader_path: &Path,
        pipeline_layout: Rc<GfxPipelineLayout>,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let shader_module = GfxShaderModule::load(device.clone(), shader_path)?;
        let stage_info = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader_module.handle())
            .name(c"main");
        let pipeline_info =
            vk::ComputePipelineCreateInfo::default().stage(stage_info).layout(pipeline_layout.handle());

        let pipeline = unsafe {
            device
                .create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
                .map_err(|(_, e)| e)
                .with_context(|| format!("failed to create compute pipeline {debug_name}"))?[0]
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
impl Drop for GfxComputePipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}
// getters
impl GfxComputePipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> &GfxPipelineLayout {
        &self.pipeline_layout
    }
}
impl DebugType for GfxComputePipeline {
    fn debug_type_name() -> &'static str {
        "GfxComputePipeline"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.pipeline
    }
}
