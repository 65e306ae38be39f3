use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::Context;
use ash::vk;
use glam::{Mat4, Vec4};
use prism_asset::{
    loader::{LoadContext, ModelLoaderRegistry},
    model::{Model, Primitive},
    texture_cache::TextureCache,
};
use prism_crate_tools::{init_log::init_log, resource::PrismPath};
use prism_gfx::{
    gfx::Gfx,
    swapchain::{surface::GfxSurface, swapchain::GfxSwapchain},
};
use prism_gui_backend::{gui_backend::GuiBackend, gui_host::GuiHost, gui_pass::GuiPass};
use prism_render_graph::graph::RenderGraph;
use prism_render_interface::{
    bindless::BindlessDescriptorTable,
    frame_counter::FrameCounter,
    frame_sync::{FrameSync, FrameWrite},
    gpu_types::{Light, MaterialGpu},
    material::Material,
    resource_registry::ResourceRegistry,
    scene_gpu_state::SceneGpuState,
};
use prism_renderer::{
    frame_data::SceneDataBuilder,
    render_targets::RgNames,
    renderer::{FrameInputs, Renderer},
    ui_params::UiParams,
};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    config::Config,
    control_panel::{ControlPanel, PanelChanges},
    perf_monitor::PerfMonitor,
    platform::{
        camera_controller::CameraController,
        input_event::{ElementState, InputEvent},
        input_manager::InputManager,
    },
};

pub fn panic_handler(info: &std::panic::PanicHookInfo) {
    log::error!("{}", info);
}

/// 材质表的 0 号材质，loader 在材质表满时也会退回到它
pub fn default_material() -> Material {
    Material::new("default", MaterialGpu::default())
}

/// 启动时放入场景的两盏灯：方向光（太阳）与蓝色点光源
pub fn default_lights() -> [Light; 2] {
    let sun = Light {
        position: Vec4::new(5.0, 8.0, 5.0, 1.0),
        direction: Vec4::new(0.0, -1.0, 0.0, 20.0),
        color: Vec4::new(1.0, 1.0, 1.0, 10.0),
        params: Vec4::ZERO,
    };
    let blue = Light {
        position: Vec4::new(-5.0, 2.0, -5.0, 0.0),
        direction: Vec4::new(0.0, 0.0, 0.0, 15.0),
        color: Vec4::new(0.2, 0.4, 1.0, 5.0),
        params: Vec4::ZERO,
    };
    [sun, blue]
}

/// 一个 primitive 对应一个 mesh instance
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct InstanceDesc {
    pub transform: Mat4,
    pub material_index: u32,
    pub index_count: u32,
    pub first_index: u32,
    /// 模型的索引已经偏移到合并后的 vertex buffer 中
    pub vertex_offset: i32,
    pub primitive: Primitive,
}
pub fn model_instances<'a>(primitives: impl IntoIterator<Item = &'a Primitive>) -> Vec<InstanceDesc> {
    primitives
        .into_iter()
        .filter(|p| p.index_count > 0)
        .map(|p| InstanceDesc {
            transform: Mat4::IDENTITY,
            material_index: p.material_index,
            index_count: p.index_count,
            first_index: p.first_index,
            vertex_offset: 0,
            primitive: *p,
        })
        .collect()
}

const NO_SWAPCHAIN: &str = "swapchain has not been created";

/// 窗口最小化时 extent 为 0，此时不创建 swapchain，也不渲染
#[inline]
fn is_drawable_extent(extent: vk::Extent2D) -> bool {
    extent.width > 0 && extent.height > 0
}

/// 创建 [`RenderApp`] 所需要的窗口信息
pub struct WindowInfo {
    pub raw_display_handle: RawDisplayHandle,
    pub raw_window_handle: RawWindowHandle,
    /// physical pixel
    pub extent: vk::Extent2D,
    pub scale_factor: f64,
}

/// 逐帧驱动：输入 → 相机 → UI → SceneData → 等待/获取 → 上传 → graph → 提交/呈现
///
/// 所有 GPU 对象都通过显式传递的 [`Gfx`] 创建，销毁顺序由 [`RenderApp::destroy`] 控制
pub struct RenderApp {
    gfx: Gfx,
    surface: GfxSurface,
    /// 重建时需要先销毁旧的 swapchain 再创建新的
    swapchain: Option<GfxSwapchain>,

    bindless: BindlessDescriptorTable,
    registry: ResourceRegistry,
    frame_sync: FrameSync,
    frame_counter: FrameCounter,

    scene: SceneGpuState,
    textures: TextureCache,
    loaders: ModelLoaderRegistry,
    model: Option<Model>,
    model_path: Option<PathBuf>,

    renderer: Renderer,
    scene_data_builder: SceneDataBuilder,

    gui_host: GuiHost,
    gui_backend: GuiBackend,
    gui_pass: GuiPass,
    control_panel: ControlPanel,
    perf_monitor: PerfMonitor,

    camera_controller: CameraController,
    input_manager: InputManager,
    ui_params: UiParams,
    config: Config,

    window_extent: vk::Extent2D,
    swapchain_dirty: bool,
    last_frame_time: Option<Instant>,
}

// new & init
impl RenderApp {
    pub fn init_env() {
        std::panic::set_hook(Box::new(panic_handler));

        init_log();

        tracy_client::Client::start();
        tracy_client::set_thread_name!("RenderThread");
    }

    pub fn new(window: WindowInfo, config: Config) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("RenderApp::new");

        let instance_exts = GfxSurface::required_instance_extensions(window.raw_display_handle)?;
        let gfx = Gfx::new("prism-viewer", &instance_exts).context("failed to initialize vulkan")?;
        let surface = GfxSurface::new(&gfx, window.raw_display_handle, window.raw_window_handle)?;
        let swapchain = GfxSwapchain::new(&gfx, &surface, window.extent)?;

        let mut bindless = BindlessDescriptorTable::new(gfx.device().clone())?;
        let mut registry = ResourceRegistry::new(&gfx, bindless.layout());
        let frame_sync = FrameSync::new(&gfx, swapchain.image_count())?;

        let mut scene = SceneGpuState::new(&gfx, &mut bindless)?;
        scene.add_material(default_material());
        for light in default_lights() {
            scene.add_light(light);
        }
        let textures = TextureCache::new(&gfx)?;

        let renderer = Renderer::new(
            &gfx,
            &mut registry,
            &mut bindless,
            swapchain.format(),
            swapchain.extent(),
            &PrismPath::textures_path("skybox.hdr"),
        )?;

        let mut gui_host = GuiHost::new(window.scale_factor);
        gui_host.set_display_size(swapchain.extent().width, swapchain.extent().height);
        let mut gui_backend = GuiBackend::new();
        gui_backend.register_font(&gfx, &mut registry, &mut bindless, &mut gui_host)?;
        let gui_pass = GuiPass::new(&gfx, &mut registry, swapchain.format())?;

        let mut ui_params = UiParams::default();
        config.apply_to(&mut ui_params);

        log::info!("bindless usage after init: {}", bindless.usage_summary());

        Ok(Self {
            gfx,
            surface,
            swapchain: Some(swapchain),

            bindless,
            registry,
            frame_sync,
            frame_counter: FrameCounter::new(),

            scene,
            textures,
            loaders: ModelLoaderRegistry::with_default_loaders(),
            model: None,
            model_path: None,

            renderer,
            scene_data_builder: SceneDataBuilder::default(),

            gui_host,
            gui_backend,
            gui_pass,
            control_panel: ControlPanel,
            perf_monitor: PerfMonitor::new(),

            camera_controller: CameraController::new(),
            input_manager: InputManager::new(),
            ui_params,
            config,

            window_extent: window.extent,
            swapchain_dirty: false,
            last_frame_time: None,
        })
    }
}

// scene
impl RenderApp {
    /// 替换当前模型
    ///
    /// 旧模型的 buffer 可能仍被在途的帧使用，因此先等待 GPU 空闲再释放；
    /// 旧模型注册的纹理在 bindless 中的槽位不会回收
    pub fn set_model(&mut self, path: &Path) -> anyhow::Result<()> {
        let _span = tracy_client::span!("RenderApp::set_model");

        self.gfx.wait_idle()?;
        if let Some(old) = self.model.take() {
            log::info!("releasing model `{}`", old.name());
            drop(old);
        }
        self.model_path = None;

        // 材质表与模型一一对应，0 号材质始终是默认材质
        self.scene.clear_materials();
        self.scene.add_material(default_material());
        self.ui_params.selected_material = 0;
        self.scene_data_builder.reset_history();

        let mut ctx = LoadContext {
            gfx: &self.gfx,
            bindless: &mut self.bindless,
            registry: &mut self.registry,
            scene: &mut self.scene,
            textures: &mut self.textures,
        };
        let model = self.loaders.load_model(path, &mut ctx)?;

        log::info!(
            "model `{}` ready: {} primitives, {} materials, textures cached {}, missing {}",
            model.name(),
            model.primitives().count(),
            self.scene.materials().len(),
            self.textures.cached_count(),
            self.textures.missing_count(),
        );
        if !model.is_drawable() {
            log::warn!("model `{}` has no drawable geometry", model.name());
        }
        self.model = model.is_drawable().then_some(model);
        self.model_path = Some(path.to_path_buf());
        Ok(())
    }

    #[inline]
    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

// input
impl RenderApp {
    pub fn handle_event(&mut self, event: &InputEvent) {
        match event {
            InputEvent::Resized {
                physical_width,
                physical_height,
            } => {
                self.on_resized(*physical_width, *physical_height);
            }
            InputEvent::MouseMoved { physical_position } => {
                self.gui_host.on_mouse_moved(*physical_position);
            }
            InputEvent::MouseButtonInput { button, state } => {
                if let Some(button) = button.to_imgui() {
                    self.gui_host.on_mouse_button(button, *state == ElementState::Pressed);
                }
            }
            InputEvent::MouseWheel { delta } => {
                self.gui_host.on_mouse_wheel(*delta);
            }
            _ => {}
        }

        self.input_manager.push_event(event.clone());
    }

    pub fn on_resized(&mut self, physical_width: u32, physical_height: u32) {
        let extent = vk::Extent2D {
            width: physical_width,
            height: physical_height,
        };
        if extent != self.window_extent {
            self.window_extent = extent;
            self.swapchain_dirty = true;
        }
    }
}

// update
impl RenderApp {
    /// 等待 GPU 空闲后重建 swapchain 以及所有与屏幕大小相关的资源
    fn rebuild_swapchain(&mut self) -> anyhow::Result<()> {
        let _span = tracy_client::span!("RenderApp::rebuild_swapchain");
        if !is_drawable_extent(self.window_extent) {
            return Ok(());
        }

        self.gfx.wait_idle()?;
        self.swapchain = None;
        let swapchain = GfxSwapchain::new(&self.gfx, &self.surface, self.window_extent)?;
        self.frame_sync.recreate_render_finished(swapchain.image_count())?;

        let extent = swapchain.extent();
        if extent != self.renderer.extent() {
            self.renderer.resize(&self.gfx, &mut self.registry, &self.bindless, extent)?;
            self.scene_data_builder.reset_history();
        }
        self.gui_host.set_display_size(extent.width, extent.height);
        self.swapchain = Some(swapchain);
        self.swapchain_dirty = false;

        log::info!("swapchain rebuilt: {}x{}", extent.width, extent.height);
        Ok(())
    }

    fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = self.last_frame_time.map(|last| now - last).unwrap_or_default();
        self.last_frame_time = Some(now);
        delta
    }

    /// 运行一帧，swapchain 失效或者录制失败时跳过这一帧
    pub fn big_update(&mut self) -> anyhow::Result<()> {
        let _span = tracy_client::span!("RenderApp::big_update");

        // 1. resize
        if self.swapchain_dirty {
            self.rebuild_swapchain()?;
        }
        if !is_drawable_extent(self.window_extent) || self.swapchain.is_none() {
            // 最小化时仍需消费输入，避免恢复时出现巨大的鼠标位移
            self.input_manager.process_events();
            self.last_frame_time = None;
            return Ok(());
        }

        // 2. input → camera
        let delta_time = self.tick();
        self.perf_monitor.update(delta_time);
        self.input_manager.process_events();
        {
            let extent = self.renderer.extent();
            self.camera_controller.update(
                self.input_manager.state(),
                glam::vec2(extent.width as f32, extent.height as f32),
                delta_time,
                !self.gui_host.want_capture_mouse(),
            );
        }

        // 3. wait & acquire
        let frame = self.frame_sync.current_frame();
        self.frame_sync.wait_frame()?;
        let swapchain = self.swapchain.as_ref().context(NO_SWAPCHAIN)?;
        let Some(image_index) = self.frame_sync.acquire_image(swapchain)? else {
            log::info!("swapchain out of date on acquire");
            self.swapchain_dirty = true;
            return Ok(());
        };

        // 4. UI：fence 已经 signal，可以覆盖这一帧的 UI mesh
        let write = self.frame_sync.writable_frame()?;
        let changes = self.build_ui(delta_time, &write)?;

        // 5. SceneData
        let camera = self.camera_controller.camera().matrices();
        self.renderer.begin_frame(camera.projection);
        let mut scene_data = self.scene_data_builder.build(
            &camera,
            self.frame_counter.frame_id(),
            self.renderer.extent(),
            self.scene.lights(),
            &self.ui_params,
        );
        self.renderer.fill_scene_handles(&mut scene_data);
        self.scene.fill_scene_handles(frame, &mut scene_data);

        // 6. upload
        {
            let _span = tracy_client::span!("RenderApp::upload_scene");
            self.scene.upload_lights(&write)?;
            if changes.material_edited {
                // 另一个 frame 可能仍在读取 material 表
                self.gfx.wait_idle()?;
            }
            self.scene.upload_materials()?;

            self.scene.clear_instances(frame);
            if let Some(model) = &self.model {
                for desc in model_instances(model.primitives()) {
                    self.scene.add_instance(
                        frame,
                        desc.transform,
                        desc.material_index,
                        desc.index_count,
                        desc.first_index,
                        desc.vertex_offset,
                        desc.primitive.bounding_center,
                        desc.primitive.bounding_radius,
                    );
                }
            }
            self.scene.sort_and_upload(&write, camera.position)?;
            self.scene.upload_scene(&write, &scene_data)?;
        }

        // 7. record
        if let Err(e) = self.record_frame(image_index, camera.view) {
            log::error!("frame {} aborted: {:#}", self.frame_counter.frame_name(), e);
            self.frame_sync.abort_frame(&self.gfx)?;
            // 已经获取的 image 只能通过重建 swapchain 归还
            self.swapchain_dirty = true;
            return Ok(());
        }

        // 8. submit & present
        self.frame_sync.submit(self.gfx.gfx_queue(), image_index)?;
        let swapchain = self.swapchain.as_ref().context(NO_SWAPCHAIN)?;
        let need_rebuild = self.frame_sync.present(swapchain, self.gfx.gfx_queue(), image_index)?;
        if need_rebuild {
            log::info!("swapchain out of date on present");
            self.swapchain_dirty = true;
        }

        self.frame_sync.advance();
        self.frame_counter.next_frame();
        tracy_client::frame_mark();
        Ok(())
    }

    /// 构建 UI 并写入当前帧的 UI mesh
    fn build_ui(&mut self, delta_time: Duration, write: &FrameWrite) -> anyhow::Result<PanelChanges> {
        let _span = tracy_client::span!("RenderApp::build_ui");

        let stats = *self.perf_monitor.stats();
        let perf_monitor = &self.perf_monitor;
        let control_panel = &mut self.control_panel;
        let ui_params = &mut self.ui_params;
        let scene = &mut self.scene;
        let model_path = self.model_path.as_deref();
        let frame_name = self.frame_counter.frame_name();

        let mut changes = PanelChanges::default();
        let draw_data = self.gui_host.build_frame(delta_time, |ui| {
            changes = control_panel.draw(ui, ui_params, scene, stats.avg_fps, stats.last_frame_ms);
            perf_monitor.draw_ui(ui);

            ui.window("Scene").size([300.0, 120.0], imgui::Condition::FirstUseEver).build(|| {
                match model_path {
                    Some(path) => ui.text(format!("Model: {}", path.display())),
                    None => ui.text_disabled("Model: <none>"),
                }
                ui.text(format!("Frame: {frame_name}"));
            });
        });
        self.gui_backend.prepare_render_data(&self.gfx, write, draw_data)?;
        Ok(changes)
    }

    fn record_frame(&mut self, image_index: u32, view: Mat4) -> anyhow::Result<()> {
        let _span = tracy_client::span!("RenderApp::record_frame");
        let frame = self.frame_sync.current_frame();
        let swapchain = self.swapchain.as_ref().context(NO_SWAPCHAIN)?;
        let bindless_set = self.bindless.descriptor_set();

        let mut graph = RenderGraph::new();
        let features = self.renderer.build_graph(
            &mut graph,
            &self.registry,
            bindless_set,
            FrameInputs {
                frame,
                scene: &self.scene,
                model: self.model.as_ref(),
                params: &self.ui_params,
                view,
                swapchain_image: swapchain.image(image_index),
                swapchain_view: swapchain.image_view(image_index),
                swapchain_format: swapchain.format(),
                swapchain_extent: swapchain.extent(),
            },
        )?;
        self.gui_pass.add_to_graph(
            &mut graph,
            &self.registry,
            bindless_set,
            &self.gui_backend,
            frame,
            RgNames::SWAPCHAIN,
            swapchain.extent(),
        );
        log::trace!("{} passes: {:?}", self.frame_counter.frame_name(), features.pass_names());

        let cmd = self.frame_sync.begin_recording()?;
        graph.execute(cmd)
    }
}

// destroy
impl RenderApp {
    /// 保存偏好设置，然后按依赖顺序释放所有 GPU 对象
    pub fn destroy(self) {
        let Self {
            gfx,
            surface,
            swapchain,
            bindless,
            registry,
            frame_sync,
            scene,
            textures,
            model,
            renderer,
            gui_backend,
            gui_pass,
            ui_params,
            mut config,
            window_extent,
            model_path,
            ..
        } = self;

        if let Err(e) = gfx.wait_idle() {
            log::error!("wait idle before destroy failed: {e:#}");
        }

        config.update_from(&ui_params);
        if is_drawable_extent(window_extent) {
            config.general.window_width = window_extent.width;
            config.general.window_height = window_extent.height;
        }
        if let Some(path) = model_path {
            config.general.last_model_path = path.to_string_lossy().into_owned();
        }
        if let Err(e) = config.save(&PrismPath::config_path()) {
            log::error!("failed to save config: {e:#}");
        }

        drop(model);
        drop(gui_pass);
        drop(gui_backend);
        drop(renderer);
        drop(textures);
        drop(scene);
        drop(frame_sync);
        registry.destroy();
        drop(bindless);
        drop(swapchain);
        drop(surface);

        gfx.destroy();
        log::info!("render app destroyed");
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    #[test]
    fn default_scene_lights() {
        let [sun, blue] = default_lights();
        assert!(sun.is_directional());
        assert_eq!(sun.position, Vec4::new(5.0, 8.0, 5.0, 1.0));
        assert_eq!(sun.color, Vec4::new(1.0, 1.0, 1.0, 10.0));
        assert_eq!(sun.direction.w, 20.0);

        assert!(!blue.is_directional());
        assert_eq!(blue.position, Vec4::new(-5.0, 2.0, -5.0, 0.0));
        assert_eq!(blue.color, Vec4::new(0.2, 0.4, 1.0, 5.0));
        assert_eq!(blue.direction.w, 15.0);
    }

    #[test]
    fn default_material_factors() {
        let material = default_material();
        assert_eq!(material.gpu.base_color_factor, Vec4::ONE);
        assert_eq!(material.gpu.metallic_factor, 0.5);
        assert_eq!(material.gpu.roughness_factor, 0.5);
        assert_eq!(material.gpu.alpha_cutoff, 0.5);
    }

    #[test]
    fn one_instance_per_non_empty_primitive() {
        let primitives = [
            Primitive {
                first_index: 0,
                index_count: 36,
                material_index: 1,
                bounding_center: Vec3::ZERO,
                bounding_radius: 1.0,
            },
            Primitive {
                first_index: 36,
                index_count: 0,
                material_index: 2,
                bounding_center: Vec3::ONE,
                bounding_radius: 0.5,
            },
            Primitive {
                first_index: 36,
                index_count: 6,
                material_index: 2,
                bounding_center: Vec3::X,
                bounding_radius: 2.0,
            },
        ];
        let instances = model_instances(&primitives);
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].material_index, 1);
        assert_eq!(instances[1].first_index, 36);
        assert_eq!(instances[1].index_count, 6);
        assert!(instances.iter().all(|i| i.transform == Mat4::IDENTITY && i.vertex_offset == 0));
    }

    #[test]
    fn zero_extent_is_not_drawable() {
        assert!(!is_drawable_extent(vk::Extent2D { width: 0, height: 600 }));
        assert!(is_drawable_extent(vk::Extent2D { width: 1, height: 1 }));
    }
}
