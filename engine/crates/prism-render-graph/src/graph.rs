use ash::vk;
use itertools::Itertools;
use prism_gfx::{
    basic::color::LabelColor,
    commands::{barrier::GfxImageBarrier, command_buffer::GfxCommandBuffer},
};
use prism_render_interface::render_error::RenderError;

use crate::{
    pass::{RgPassCallback, RgPassDesc},
    planner::{self, GraphPlan, PlannedBarrier, PlannedPass},
    resource::{RgImageResource, TerminalLayout},
};

/// 每帧构建一次、执行一次的 render graph
///
/// 生命周期 `'a` 限制了 pass 回调可以借用的数据，回调在 `execute` 内同步执行
#[derive(Default)]
pub struct RenderGraph<'a> {
    resources: Vec<RgImageResource>,
    passes: Vec<RgPassDesc>,
    callbacks: Vec<RgPassCallback<'a>>,
}
// new & init
impl<'a> RenderGraph<'a> {
    pub fn new() -> Self {
        Self {
            resources: vec![],
            passes: vec![],
            callbacks: vec![],
        }
    }
}
// 资源注册
impl<'a> RenderGraph<'a> {
    /// 跨帧复用的 render target，帧末尾回到 SHADER_READ_ONLY
    pub fn add_external_resource(
        &mut self,
        name: impl Into<String>,
        image: vk::Image,
        view: vk::ImageView,
        format: vk::Format,
        extent: vk::Extent2D,
        initial_layout: vk::ImageLayout,
    ) -> &mut Self {
        self.add_layer_resource(name, image, view, format, extent, 0, initial_layout)
    }

    /// image array 中的单个 layer，layout 按 layer 单独跟踪
    #[allow(clippy::too_many_arguments)]
    pub fn add_layer_resource(
        &mut self,
        name: impl Into<String>,
        image: vk::Image,
        layer_view: vk::ImageView,
        format: vk::Format,
        extent: vk::Extent2D,
        layer: u32,
        initial_layout: vk::ImageLayout,
    ) -> &mut Self {
        self.push_resource(RgImageResource {
            name: name.into(),
            image,
            view: layer_view,
            format,
            extent,
            base_layer: layer,
            layer_count: 1,
            initial_layout,
            clear_value: None,
            terminal: TerminalLayout::ShaderRead,
        })
    }

    /// swapchain image 每帧都从 UNDEFINED 开始，最终转换为 PRESENT_SRC
    pub fn add_swapchain_resource(
        &mut self,
        name: impl Into<String>,
        image: vk::Image,
        view: vk::ImageView,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> &mut Self {
        self.push_resource(RgImageResource {
            name: name.into(),
            image,
            view,
            format,
            extent,
            base_layer: 0,
            layer_count: 1,
            initial_layout: vk::ImageLayout::UNDEFINED,
            clear_value: None,
            terminal: TerminalLayout::Present,
        })
    }

    /// 为 loadOp 为 CLEAR 的 attachment 指定清除值
    pub fn set_clear_value(&mut self, name: &str, value: vk::ClearValue) -> &mut Self {
        match self.resources.iter_mut().find(|r| r.name == name) {
            Some(resource) => resource.clear_value = Some(value),
            None => log::warn!("set_clear_value: unknown resource `{name}`"),
        }
        self
    }

    fn push_resource(&mut self, resource: RgImageResource) -> &mut Self {
        if self.resources.iter().any(|r| r.name == resource.name) {
            log::warn!("resource `{}` registered twice, the later one wins", resource.name);
            self.resources.retain(|r| r.name != resource.name);
        }
        self.resources.push(resource);
        self
    }
}
// pass
impl<'a> RenderGraph<'a> {
    /// pass 按照添加的顺序执行
    pub fn add_pass(
        &mut self,
        desc: RgPassDesc,
        callback: impl FnOnce(&GfxCommandBuffer) -> anyhow::Result<()> + 'a,
    ) -> &mut Self {
        self.passes.push(desc);
        self.callbacks.push(Box::new(callback));
        self
    }

    #[inline]
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name.as_str()).collect_vec()
    }

    /// 只做规划，不录制命令
    pub fn plan(&self) -> anyhow::Result<GraphPlan> {
        planner::plan(&self.resources, &self.passes)
    }
}
// execute
impl<'a> RenderGraph<'a> {
    /// 按顺序录制所有 pass，graph 在执行之后被消耗
    ///
    /// 任意一个 pass 的回调失败时立即返回，之后的 pass 不会被录制
    pub fn execute(self, cmd: &GfxCommandBuffer) -> anyhow::Result<()> {
        let _span = tracy_client::span!("RenderGraph::execute");

        let plan = self.plan()?;
        let Self {
            resources,
            passes,
            callbacks,
        } = self;

        for ((desc, planned), callback) in passes.iter().zip(plan.passes.iter()).zip(callbacks) {
            let _span = tracy_client::span!("RenderGraph::pass");
            cmd.begin_label(&desc.name, LabelColor::COLOR_PASS);

            Self::emit_barriers(cmd, &resources, &planned.barriers);

            // attachment 尺寸已经在 plan 阶段检查过，begin_label 之后不会再提前返回
            if let Some(extent) = planned.render_area {
                Self::begin_rendering(cmd, &resources, planned, extent);
            }

            let result = callback(cmd);

            if planned.render_area.is_some() {
                cmd.cmd_end_rendering();
            }
            cmd.end_label();

            if let Err(source) = result {
                cmd.insert_label(&format!("{} failed", desc.name), LabelColor::COLOR_ERROR);
                return Err(RenderError::PassRecording {
                    pass: desc.name.clone(),
                    source,
                }
                .into());
            }
        }

        Self::emit_barriers(cmd, &resources, &plan.final_barriers);
        Ok(())
    }

    fn emit_barriers(cmd: &GfxCommandBuffer, resources: &[RgImageResource], barriers: &[PlannedBarrier]) {
        if barriers.is_empty() {
            return;
        }
        let image_barriers = barriers
            .iter()
            .map(|b| {
                let resource = &resources[b.resource];
                let (src_stage, src_access) = b.src_access.src_mask();
                let (dst_stage, dst_access) = b.dst_access.dst_mask();
                GfxImageBarrier::new()
                    .image(resource.image)
                    .image_aspect_flag(resource.aspect())
                    .layer_range(resource.base_layer, resource.layer_count)
                    .layout_transfer(b.old_layout, b.new_layout)
                    .src_mask(src_stage, src_access)
                    .dst_mask(dst_stage, dst_access)
            })
            .collect_vec();
        cmd.image_memory_barrier(vk::DependencyFlags::empty(), &image_barriers);
    }

    fn begin_rendering(
        cmd: &GfxCommandBuffer,
        resources: &[RgImageResource],
        planned: &PlannedPass,
        extent: vk::Extent2D,
    ) {
        let attachment_info = |index: usize| {
            let resource = &resources[index];
            vk::RenderingAttachmentInfo::default()
                .image_view(resource.view)
                .image_layout(if resource.is_depth() {
                    vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
                } else {
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
                })
                .load_op(planned.load_op)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(resource.effective_clear_value())
        };

        let color_attachments = planned.color_attachments.iter().map(|&i| attachment_info(i)).collect_vec();
        let depth_attachment = planned.depth_attachment.map(attachment_info);

        let mut render_info = vk::RenderingInfo::default()
            .layer_count(1)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .color_attachments(&color_attachments);
        if let Some(depth) = depth_attachment.as_ref() {
            render_info = render_info.depth_attachment(depth);
        }

        cmd.cmd_begin_rendering(&render_info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_targets<'a>() -> RenderGraph<'a> {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let mut graph = RenderGraph::new();
        graph
            .add_external_resource(
                "HDR",
                vk::Image::null(),
                vk::ImageView::null(),
                vk::Format::R16G16B16A16_SFLOAT,
                extent,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
            .add_swapchain_resource(
                "Swapchain",
                vk::Image::null(),
                vk::ImageView::null(),
                vk::Format::B8G8R8A8_UNORM,
                extent,
            );
        graph
    }

    #[test]
    fn passes_keep_insertion_order() {
        let mut graph = graph_with_targets();
        graph
            .add_pass(RgPassDesc::raster("Geometry").write("HDR").clear_outputs(true), |_| Ok(()))
            .add_pass(RgPassDesc::raster("Composite").read("HDR").write("Swapchain"), |_| Ok(()));
        assert_eq!(graph.pass_names(), vec!["Geometry", "Composite"]);
        let plan = graph.plan().unwrap();
        assert_eq!(plan.passes.len(), 2);
        assert_eq!(plan.final_barriers.len(), 1);
    }

    #[test]
    fn layer_resources_track_their_own_layer() {
        let mut graph = RenderGraph::new();
        for cascade in 0..4 {
            graph.add_layer_resource(
                format!("ShadowCascade{cascade}"),
                vk::Image::null(),
                vk::ImageView::null(),
                vk::Format::D32_SFLOAT,
                vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                cascade,
                vk::ImageLayout::UNDEFINED,
            );
        }
        graph.add_pass(RgPassDesc::raster("Shadow0").write("ShadowCascade0").clear_outputs(true), |_| Ok(()));
        let plan = graph.plan().unwrap();
        assert_eq!(plan.passes[0].depth_attachment, Some(0));
        assert_eq!(graph.resources[2].base_layer, 2);
        // 未被写入的 cascade 也要在帧末尾进入 shader read
        assert_eq!(plan.final_barriers.len(), 4);
    }

    #[test]
    fn clear_value_overrides_default() {
        let mut graph = graph_with_targets();
        graph.set_clear_value(
            "HDR",
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            },
        );
        assert_eq!(unsafe { graph.resources[0].effective_clear_value().color.float32 }, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn duplicate_registration_replaces() {
        let mut graph = graph_with_targets();
        graph.add_external_resource(
            "HDR",
            vk::Image::null(),
            vk::ImageView::null(),
            vk::Format::R8G8B8A8_UNORM,
            vk::Extent2D { width: 1, height: 1 },
            vk::ImageLayout::UNDEFINED,
        );
        assert_eq!(graph.resources.len(), 2);
        assert_eq!(graph.resources[1].format, vk::Format::R8G8B8A8_UNORM);
    }
}
