//! 参考 imgui-rs-vulkan-renderer

use ash::vk;
use prism_gfx::{
    gfx::Gfx,
    resources::{
        image::{GfxImage, GfxImageCreateInfo},
        sampler::GfxSamplerDesc,
    },
};
use prism_render_interface::{
    bindless::{BindlessDescriptorTable, BindlessHandle},
    frame_counter::{FrameCounter, FrameLabel},
    frame_sync::FrameWrite,
    resource_registry::{ImageHandle, ResourceRegistry},
};

use crate::{gui_host::GuiHost, gui_mesh::GuiMesh, gui_vertex_layout::GuiVertex};

/// 一条 imgui 绘制命令，offset 已经换算到合并后的 buffer 中
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GuiDrawCmd {
    pub scissor: vk::Rect2D,
    pub texture: BindlessHandle,
    pub index_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
}

/// 某一帧需要绘制的内容
#[derive(Clone, Debug, Default)]
pub struct GuiFrameData {
    pub commands: Vec<GuiDrawCmd>,
    pub display_pos: [f32; 2],
    pub display_size: [f32; 2],
}

/// 把 imgui 的 clip rect 换算为 framebuffer 上的 scissor，完全落在屏幕外时返回 None
pub fn scissor_rect(
    clip_rect: [f32; 4],
    clip_offset: [f32; 2],
    clip_scale: [f32; 2],
    framebuffer: [f32; 2],
) -> Option<vk::Rect2D> {
    let min_x = ((clip_rect[0] - clip_offset[0]) * clip_scale[0]).max(0.0);
    let min_y = ((clip_rect[1] - clip_offset[1]) * clip_scale[1]).max(0.0);
    let max_x = ((clip_rect[2] - clip_offset[0]) * clip_scale[0]).min(framebuffer[0]);
    let max_y = ((clip_rect[3] - clip_offset[1]) * clip_scale[1]).min(framebuffer[1]);
    if max_x <= min_x || max_y <= min_y {
        return None;
    }

    Some(vk::Rect2D {
        offset: vk::Offset2D {
            x: min_x as i32,
            y: min_y as i32,
        },
        extent: vk::Extent2D {
            width: (max_x - min_x) as u32,
            height: (max_y - min_y) as u32,
        },
    })
}

pub struct GuiBackend {
    /// 存放多帧 imgui 的 mesh 数据
    meshes: [GuiMesh; FrameCounter::fif_count()],
    frames: [GuiFrameData; FrameCounter::fif_count()],

    font_image: Option<ImageHandle>,
    font_handle: BindlessHandle,
}
impl Default for GuiBackend {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl GuiBackend {
    pub fn new() -> Self {
        Self {
            meshes: FrameCounter::frame_labels().map(GuiMesh::new),
            frames: Default::default(),
            font_image: None,
            font_handle: BindlessHandle::NULL,
        }
    }

    /// 上传字体图集并注册到 bindless 中
    pub fn register_font(
        &mut self,
        gfx: &Gfx,
        registry: &mut ResourceRegistry,
        bindless: &mut BindlessDescriptorTable,
        host: &mut GuiHost,
    ) -> anyhow::Result<()> {
        let _span = tracy_client::span!("GuiBackend::register_font");

        let (width, height, data) = host.build_font_atlas();
        let image = GfxImage::new(
            gfx,
            &GfxImageCreateInfo::new_image_2d_info(
                vk::Extent2D { width, height },
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            ),
            "imgui-fonts",
        )?;
        image.upload_sync(gfx, &data)?;

        let sampler = registry.create_sampler(&GfxSamplerDesc::linear_clamp())?;
        let handle = bindless.register_image(image.default_view(), sampler)?;
        host.set_font_texture(imgui::TextureId::new(handle.index() as usize));

        self.font_image = Some(registry.register_image(image));
        self.font_handle = handle;
        log::info!("imgui font atlas: {}x{}, bindless {}", width, height, handle.index());
        Ok(())
    }
}
// tools
impl GuiBackend {
    /// # Phase: Render
    ///
    /// 把 draw data 合并写入该帧的 mesh，并记录绘制命令
    pub fn prepare_render_data(&mut self, gfx: &Gfx, write: &FrameWrite, draw_data: &imgui::DrawData) -> anyhow::Result<()> {
        let _span = tracy_client::span!("GuiBackend::prepare_render_data");

        let mut vertices = Vec::with_capacity(draw_data.total_vtx_count as usize);
        let mut indices = Vec::with_capacity(draw_data.total_idx_count as usize);
        let mut commands = vec![];

        let clip_offset = draw_data.display_pos;
        let clip_scale = draw_data.framebuffer_scale;
        let framebuffer = [
            draw_data.display_size[0] * clip_scale[0],
            draw_data.display_size[1] * clip_scale[1],
        ];

        for draw_list in draw_data.draw_lists() {
            let base_vertex = vertices.len() as i32;
            let base_index = indices.len() as u32;
            vertices.extend(draw_list.vtx_buffer().iter().map(GuiVertex::from));
            indices.extend_from_slice(draw_list.idx_buffer());

            for command in draw_list.commands() {
                match command {
                    imgui::DrawCmd::Elements {
                        count,
                        cmd_params:
                            imgui::DrawCmdParams {
                                clip_rect,
                                texture_id,
                                vtx_offset,
                                idx_offset,
                                ..
                            },
                    } => {
                        let Some(scissor) = scissor_rect(clip_rect, clip_offset, clip_scale, framebuffer) else {
                            continue;
                        };
                        commands.push(GuiDrawCmd {
                            scissor,
                            texture: BindlessHandle(texture_id.id() as u32),
                            index_count: count as u32,
                            first_index: base_index + idx_offset as u32,
                            vertex_offset: base_vertex + vtx_offset as i32,
                        });
                    }
                    imgui::DrawCmd::ResetRenderState => {
                        log::warn!("imgui reset render state");
                    }
                    imgui::DrawCmd::RawCallback { .. } => {
                        log::warn!("imgui raw callback");
                    }
                }
            }
        }

        let frame_label = write.frame();
        self.meshes[*frame_label].upload(gfx, &vertices, &indices)?;
        self.frames[*frame_label] = GuiFrameData {
            commands,
            display_pos: draw_data.display_pos,
            display_size: draw_data.display_size,
        };
        Ok(())
    }
}
// getters
impl GuiBackend {
    #[inline]
    pub fn mesh(&self, frame_label: FrameLabel) -> &GuiMesh {
        &self.meshes[*frame_label]
    }

    #[inline]
    pub fn frame_data(&self, frame_label: FrameLabel) -> &GuiFrameData {
        &self.frames[*frame_label]
    }

    #[inline]
    pub fn font_handle(&self) -> BindlessHandle {
        self.font_handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scissor_is_clamped_to_framebuffer() {
        let rect = scissor_rect([-10.0, 5.0, 900.0, 50.0], [0.0, 0.0], [1.0, 1.0], [800.0, 600.0]).unwrap();
        assert_eq!(rect.offset, vk::Offset2D { x: 0, y: 5 });
        assert_eq!(rect.extent, vk::Extent2D { width: 800, height: 45 });
    }

    #[test]
    fn scissor_applies_offset_and_scale() {
        let rect = scissor_rect([110.0, 120.0, 210.0, 220.0], [100.0, 100.0], [2.0, 2.0], [1600.0, 1200.0]).unwrap();
        assert_eq!(rect.offset, vk::Offset2D { x: 20, y: 40 });
        assert_eq!(rect.extent, vk::Extent2D { width: 200, height: 200 });
    }

    #[test]
    fn offscreen_clip_rect_is_skipped() {
        assert!(scissor_rect([900.0, 0.0, 1000.0, 10.0], [0.0, 0.0], [1.0, 1.0], [800.0, 600.0]).is_none());
        assert!(scissor_rect([10.0, 10.0, 10.0, 20.0], [0.0, 0.0], [1.0, 1.0], [800.0, 600.0]).is_none());
    }
}
