use std::time::Duration;

/// 持有 imgui context，负责主题、字体与输入转发
///
/// imgui 的 context 是进程内唯一允许的全局状态
pub struct GuiHost {
    imgui_ctx: imgui::Context,
    hidpi_factor: f64,
}
// new & init
impl GuiHost {
    pub fn new(hidpi_factor: f64) -> Self {
        let mut imgui_ctx = imgui::Context::create();
        // disable automatic saving .ini file
        imgui_ctx.set_ini_filename(None);

        // theme
        {
            let style = imgui_ctx.style_mut();
            style.use_dark_colors();
            // WindowBg: 半透明深色背景
            style.colors[imgui::StyleColor::WindowBg as usize] = [0.1, 0.1, 0.1, 0.9];
        }

        let io = imgui_ctx.io_mut();
        io.display_size = [800.0, 600.0];
        io.font_global_scale = 1.0;
        io.config_flags |= imgui::ConfigFlags::DOCKING_ENABLE;

        let font_size = (13.0 * hidpi_factor) as f32;
        imgui_ctx.fonts().add_font(&[imgui::FontSource::DefaultFontData {
            config: Some(imgui::FontConfig {
                size_pixels: font_size,
                ..Default::default()
            }),
        }]);

        Self {
            imgui_ctx,
            hidpi_factor,
        }
    }

    /// 生成字体图集，返回 `(width, height, rgba8)`
    pub fn build_font_atlas(&mut self) -> (u32, u32, Vec<u8>) {
        let atlas = self.imgui_ctx.fonts().build_rgba32_texture();
        (atlas.width, atlas.height, atlas.data.to_vec())
    }

    /// 字体纹理上传之后，把 bindless 索引作为 texture id
    pub fn set_font_texture(&mut self, texture_id: imgui::TextureId) {
        self.imgui_ctx.fonts().tex_id = texture_id;
    }
}
// input
impl GuiHost {
    pub fn set_display_size(&mut self, physical_width: u32, physical_height: u32) {
        self.imgui_ctx.io_mut().display_size = [physical_width as f32, physical_height as f32];
    }

    pub fn on_mouse_moved(&mut self, physical_position: [f64; 2]) {
        self.imgui_ctx.io_mut().add_mouse_pos_event([physical_position[0] as f32, physical_position[1] as f32]);
    }

    pub fn on_mouse_button(&mut self, button: imgui::MouseButton, pressed: bool) {
        self.imgui_ctx.io_mut().add_mouse_button_event(button, pressed);
    }

    pub fn on_mouse_wheel(&mut self, delta: f64) {
        self.imgui_ctx.io_mut().add_mouse_wheel_event([0.0, delta as f32]);
    }

    /// 鼠标位于 UI 之上时，相机不应响应拖拽
    #[inline]
    pub fn want_capture_mouse(&self) -> bool {
        self.imgui_ctx.io().want_capture_mouse
    }
}
// update
impl GuiHost {
    /// 构建这一帧的 UI，并编译为 draw data
    pub fn build_frame(&mut self, duration: Duration, ui_func: impl FnOnce(&imgui::Ui)) -> &imgui::DrawData {
        let _span = tracy_client::span!("GuiHost::build_frame");
        self.imgui_ctx.io_mut().update_delta_time(duration);
        let ui = self.imgui_ctx.new_frame();
        ui_func(ui);
        self.imgui_ctx.render()
    }
}
// getters
impl GuiHost {
    #[inline]
    pub fn hidpi_factor(&self) -> f64 {
        self.hidpi_factor
    }
}
