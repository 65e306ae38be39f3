use std::path::PathBuf;

use anyhow::Context;
use ash::vk;
use prism_app::{
    config::Config,
    platform::input_event::{ElementState, InputEvent, KeyCode},
    render_app::{RenderApp, WindowInfo},
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowId},
};

use crate::winit_event_adapter::WinitEventAdapter;

pub struct WinitApp {
    /// window 创建之后才能初始化
    render_app: Option<RenderApp>,
    /// 需要在 render app 销毁之后再销毁，surface 依赖它
    window: Option<Window>,

    /// 初始化之前暂存，初始化时移交给 render app
    config: Option<Config>,
    model_path: PathBuf,

    /// 导致事件循环退出的错误
    fatal_error: Option<anyhow::Error>,
}
// 总的 main 函数
impl WinitApp {
    /// 整个程序的入口，返回时所有 GPU 资源都已经释放
    pub fn run(config: Config, model_path: PathBuf) -> anyhow::Result<()> {
        let event_loop = EventLoop::new().context("failed to create event loop")?;

        let mut app = Self {
            render_app: None,
            window: None,
            config: Some(config),
            model_path,
            fatal_error: None,
        };

        let run_result = event_loop.run_app(&mut app);
        log::info!("end run.");

        let fatal_error = app.fatal_error.take();
        app.destroy();

        run_result.context("event loop terminated abnormally")?;
        match fatal_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
// new & init
impl WinitApp {
    fn create_window(event_loop: &ActiveEventLoop, config: &Config) -> anyhow::Result<Window> {
        let mut window_attr = Window::default_attributes()
            .with_title("Prism")
            .with_inner_size(winit::dpi::PhysicalSize::new(
                config.general.window_width.max(1),
                config.general.window_height.max(1),
            ));
        if config.general.fullscreen {
            window_attr = window_attr.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        event_loop.create_window(window_attr).context("failed to create window")
    }

    /// 在 window 创建之后调用，初始化 Renderer 和 GUI，并加载模型
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let config = self.config.take().unwrap_or_default();
        let window = Self::create_window(event_loop, &config)?;

        let size = window.inner_size();
        let window_info = WindowInfo {
            raw_display_handle: window.display_handle().context("missing display handle")?.as_raw(),
            raw_window_handle: window.window_handle().context("missing window handle")?.as_raw(),
            extent: vk::Extent2D {
                width: size.width,
                height: size.height,
            },
            scale_factor: window.scale_factor(),
        };
        self.window = Some(window);

        let mut render_app = RenderApp::new(window_info, config)?;
        // 模型缺失不是致命错误，场景为空时仍然可以调节灯光与后处理
        if let Err(e) = render_app.set_model(&self.model_path) {
            log::error!("failed to load model {}: {:#}", self.model_path.display(), e);
        }
        self.render_app = Some(render_app);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("fatal: {:#}", error);
        self.fatal_error = Some(error);
        event_loop.exit();
    }
}
// destroy
impl WinitApp {
    fn destroy(mut self) {
        if let Some(render_app) = self.render_app.take() {
            render_app.destroy();
        }
        self.window = None;
    }
}
// 各种 winit 的事件处理
impl ApplicationHandler for WinitApp {
    // 建议在这里创建 window 和 Renderer
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        log::info!("winit event: resumed");

        if let Err(e) = self.init_after_window(event_loop) {
            self.fail(event_loop, e.context("initialization failed"));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(render_app) = self.render_app.as_mut() else {
            return;
        };

        let input_event = WinitEventAdapter::from_winit_event(&event);
        if let InputEvent::KeyboardInput {
            key_code: KeyCode::Escape,
            state: ElementState::Pressed,
        } = input_event
        {
            event_loop.exit();
            return;
        }
        render_app.handle_event(&input_event);

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = render_app.big_update() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
    }
}
