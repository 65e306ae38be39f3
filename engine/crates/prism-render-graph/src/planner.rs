//! 不依赖 device 的 barrier 规划
//!
//! 输入资源与 pass 的声明，输出每个 pass 之前需要的 barrier、attachment 以及帧末尾的 barrier

use std::collections::HashMap;

use anyhow::{Context, bail};
use ash::vk;

use crate::{
    pass::{PassKind, RgPassDesc},
    resource::{RgImageResource, TerminalLayout},
    resource_state::RgAccess,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlannedBarrier {
    /// 资源在 graph 中的索引
    pub resource: usize,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_access: RgAccess,
    pub dst_access: RgAccess,
}

#[derive(Clone, Debug, Default)]
pub struct PlannedPass {
    pub barriers: Vec<PlannedBarrier>,
    pub color_attachments: Vec<usize>,
    pub depth_attachment: Option<usize>,
    pub load_op: vk::AttachmentLoadOp,
    /// 所有 attachment 共同的尺寸；为 `None` 时不开启 dynamic rendering
    pub render_area: Option<vk::Extent2D>,
}

#[derive(Clone, Debug, Default)]
pub struct GraphPlan {
    pub passes: Vec<PlannedPass>,
    pub final_barriers: Vec<PlannedBarrier>,
}
impl GraphPlan {
    pub fn barrier_count(&self) -> usize {
        self.passes.iter().map(|p| p.barriers.len()).sum::<usize>() + self.final_barriers.len()
    }
}

#[derive(Copy, Clone, Debug)]
struct TrackedState {
    layout: vk::ImageLayout,
    access: RgAccess,
    written: bool,
}

pub fn plan(resources: &[RgImageResource], passes: &[RgPassDesc]) -> anyhow::Result<GraphPlan> {
    let lookup: HashMap<&str, usize> = resources.iter().enumerate().map(|(i, r)| (r.name.as_str(), i)).collect();
    let resolve = |pass: &str, name: &str| {
        lookup.get(name).copied().with_context(|| format!("pass `{pass}` uses unknown resource `{name}`"))
    };

    let mut states: Vec<TrackedState> = resources
        .iter()
        .map(|r| TrackedState {
            layout: r.initial_layout,
            access: RgAccess::from_layout(r.initial_layout),
            written: false,
        })
        .collect();

    let mut transition = |states: &mut Vec<TrackedState>, resource: usize, dst: RgAccess| {
        let state = &mut states[resource];
        let barrier = PlannedBarrier {
            resource,
            old_layout: state.layout,
            new_layout: dst.layout(),
            src_access: state.access,
            dst_access: dst,
        };
        state.layout = dst.layout();
        state.access = dst;
        barrier
    };

    let mut planned_passes = Vec::with_capacity(passes.len());
    for pass in passes {
        let reads: Vec<usize> = pass.reads.iter().map(|n| resolve(&pass.name, n)).collect::<anyhow::Result<_>>()?;
        let writes: Vec<usize> = pass.writes.iter().map(|n| resolve(&pass.name, n)).collect::<anyhow::Result<_>>()?;

        if let Some(both) = reads.iter().find(|r| writes.contains(r)) {
            bail!("pass `{}` reads and writes `{}` at the same time", pass.name, resources[*both].name);
        }

        let mut planned = PlannedPass {
            load_op: if pass.clear_outputs { vk::AttachmentLoadOp::CLEAR } else { vk::AttachmentLoadOp::LOAD },
            ..Default::default()
        };

        for &r in &reads {
            let dst = pass.kind.read_access();
            // 已经处于可读 layout 时，读之后的读不需要 barrier
            if states[r].layout != dst.layout() || states[r].access.is_write() {
                planned.barriers.push(transition(&mut states, r, dst));
            }
        }

        for &w in &writes {
            let resource = &resources[w];
            // 覆盖写（clear）只能有一个 pass；之后的 pass 只能以 LOAD 的方式叠加，例如 UI
            if states[w].written && pass.clear_outputs {
                bail!("resource `{}` is cleared by pass `{}` after being written", resource.name, pass.name);
            }
            let dst = pass.kind.write_access(resource.is_depth());
            planned.barriers.push(transition(&mut states, w, dst));
            states[w].written = true;

            if pass.kind == PassKind::Raster {
                if resource.is_depth() {
                    if planned.depth_attachment.replace(w).is_some() {
                        bail!("pass `{}` writes more than one depth attachment", pass.name);
                    }
                } else {
                    planned.color_attachments.push(w);
                }
            }
        }

        planned.render_area = render_area(&pass.name, resources, &planned)?;
        planned_passes.push(planned);
    }

    let final_barriers = resources
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            let dst = match r.terminal {
                TerminalLayout::Present => RgAccess::Present,
                TerminalLayout::ShaderRead => RgAccess::ShaderRead,
            };
            (states[i].layout != dst.layout()).then(|| transition(&mut states, i, dst))
        })
        .collect();

    Ok(GraphPlan {
        passes: planned_passes,
        final_barriers,
    })
}

/// 在录制任何命令之前检查 attachment 尺寸是否一致
fn render_area(
    pass: &str,
    resources: &[RgImageResource],
    planned: &PlannedPass,
) -> anyhow::Result<Option<vk::Extent2D>> {
    let mut extents =
        planned.color_attachments.iter().chain(planned.depth_attachment.iter()).map(|&i| resources[i].extent);
    let Some(extent) = extents.next() else {
        return Ok(None);
    };
    if extents.any(|e| e != extent) {
        bail!("pass `{pass}` has attachments with different extents");
    }
    Ok(Some(extent))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str, format: vk::Format, initial: vk::ImageLayout, terminal: TerminalLayout) -> RgImageResource {
        RgImageResource {
            name: name.to_string(),
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            format,
            extent: vk::Extent2D {
                width: 1600,
                height: 900,
            },
            base_layer: 0,
            layer_count: 1,
            initial_layout: initial,
            clear_value: None,
            terminal,
        }
    }

    fn frame_resources() -> Vec<RgImageResource> {
        let read = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        vec![
            image("HDR", vk::Format::R16G16B16A16_SFLOAT, read, TerminalLayout::ShaderRead),
            image("Depth", vk::Format::D32_SFLOAT, read, TerminalLayout::ShaderRead),
            image("LDR", vk::Format::B8G8R8A8_UNORM, read, TerminalLayout::ShaderRead),
            image("Swapchain", vk::Format::B8G8R8A8_UNORM, vk::ImageLayout::UNDEFINED, TerminalLayout::Present),
        ]
    }

    #[test]
    fn layouts_follow_passes_and_end_in_terminal_layout() {
        let resources = frame_resources();
        let passes = vec![
            RgPassDesc::raster("Geometry").write("HDR").write("Depth").clear_outputs(true),
            RgPassDesc::raster("Composite").read("HDR").read("Depth").write("LDR").clear_outputs(true),
            RgPassDesc::transfer("FinalCopy").read("LDR").write("Swapchain"),
            RgPassDesc::raster("UI").write("Swapchain"),
        ];
        let plan = plan(&resources, &passes).unwrap();

        let geometry = &plan.passes[0];
        assert_eq!(geometry.color_attachments, vec![0]);
        assert_eq!(geometry.depth_attachment, Some(1));
        assert_eq!(geometry.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(geometry.barriers[1].new_layout, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);

        let composite = &plan.passes[1];
        assert_eq!(composite.barriers.len(), 3);
        assert_eq!(composite.barriers[0].src_access, RgAccess::ColorAttachment);
        assert_eq!(composite.barriers[0].new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        let copy = &plan.passes[2];
        assert_eq!(copy.render_area, None);
        assert_eq!(copy.barriers[0].new_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        assert_eq!(copy.barriers[1].new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

        let ui = &plan.passes[3];
        assert_eq!(ui.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(ui.barriers[0].old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

        // LDR 回到 shader read，swapchain 进入 present
        let finals: Vec<(usize, vk::ImageLayout)> =
            plan.final_barriers.iter().map(|b| (b.resource, b.new_layout)).collect();
        assert_eq!(
            finals,
            vec![(2, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL), (3, vk::ImageLayout::PRESENT_SRC_KHR)]
        );
    }

    #[test]
    fn one_barrier_per_transition() {
        let resources = frame_resources();
        let passes = vec![
            RgPassDesc::raster("Geometry").write("HDR").clear_outputs(true),
            RgPassDesc::raster("A").read("HDR").write("LDR"),
            // HDR 已经是 shader read，不需要再次 barrier
            RgPassDesc::raster("B").read("HDR").write("Swapchain"),
        ];
        let plan = plan(&resources, &passes).unwrap();
        assert_eq!(plan.passes[2].barriers.len(), 1);
        // Geometry:1, A:2, B:1, final: LDR + Swapchain
        assert_eq!(plan.barrier_count(), 6);
        for b in plan.passes.iter().flat_map(|p| p.barriers.iter()).chain(plan.final_barriers.iter()) {
            assert!(b.old_layout != b.new_layout || b.dst_access.is_write());
        }
    }

    #[test]
    fn read_and_write_in_one_pass_is_rejected() {
        let resources = frame_resources();
        let passes = vec![RgPassDesc::raster("Bad").read("HDR").write("HDR")];
        let err = plan(&resources, &passes).unwrap_err();
        assert!(err.to_string().contains("reads and writes"));
    }

    #[test]
    fn second_clearing_writer_is_rejected() {
        let resources = frame_resources();
        let passes = vec![
            RgPassDesc::raster("First").write("HDR").clear_outputs(true),
            RgPassDesc::raster("Second").write("HDR").clear_outputs(true),
        ];
        assert!(plan(&resources, &passes).is_err());
    }

    #[test]
    fn unknown_resource_is_rejected() {
        let passes = vec![RgPassDesc::raster("Ghost").write("Nope")];
        let err = plan(&frame_resources(), &passes).unwrap_err();
        assert!(err.to_string().contains("unknown resource `Nope`"));
    }

    #[test]
    fn compute_writes_use_general() {
        let resources = frame_resources();
        let passes = vec![RgPassDesc::compute("Blur").read("HDR").write("LDR")];
        let plan = plan(&resources, &passes).unwrap();
        assert_eq!(plan.passes[0].render_area, None);
        // HDR 初始即为 shader read
        assert_eq!(plan.passes[0].barriers.len(), 1);
        assert_eq!(plan.passes[0].barriers[0].new_layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn render_area_comes_from_attachments() {
        let resources = frame_resources();
        let passes = vec![
            RgPassDesc::raster("Geometry").write("HDR").write("Depth").clear_outputs(true),
            RgPassDesc::compute("Blur").read("HDR").write("LDR"),
        ];
        let plan = plan(&resources, &passes).unwrap();
        assert_eq!(
            plan.passes[0].render_area,
            Some(vk::Extent2D {
                width: 1600,
                height: 900
            })
        );
        assert_eq!(plan.passes[1].render_area, None);
    }

    #[test]
    fn mismatched_attachment_extents_fail_at_planning() {
        let mut resources = frame_resources();
        resources[1].extent = vk::Extent2D {
            width: 800,
            height: 450,
        };
        let passes = vec![RgPassDesc::raster("Geometry").write("HDR").write("Depth").clear_outputs(true)];
        // execute 在 begin_label 之前调用 plan，这里失败时不会留下未关闭的 label
        let err = plan(&resources, &passes).unwrap_err();
        assert!(err.to_string().contains("pass `Geometry` has attachments with different extents"));
    }

    #[test]
    fn untouched_resources_keep_their_layout() {
        let resources = frame_resources();
        let plan = plan(&resources, &[]).unwrap();
        // 只有 swapchain 需要进入 present
        assert_eq!(plan.final_barriers.len(), 1);
        assert_eq!(plan.final_barriers[0].old_layout, vk::ImageLayout::UNDEFINED);
    }
}
