use glam::{Vec3, Vec4};
use imgui::{Drag, TreeNodeFlags};
use prism_render_interface::{gpu_types::Light, material::Material, scene_gpu_state::SceneGpuState};
use prism_renderer::ui_params::UiParams;

/// 控制面板在这一帧中对场景做出的修改
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PanelChanges {
    /// material 表被所有 frame 共享，上传之前需要等待 GPU 空闲
    pub material_edited: bool,
}

pub fn light_label(index: usize, light: &Light) -> String {
    let kind = if light.is_directional() { "Directional" } else { "Point" };
    if index == 0 {
        format!("Light {index} (Sun, {kind})")
    } else {
        format!("Light {index} ({kind})")
    }
}

pub fn material_label(index: usize, material: &Material) -> String {
    format!("{index}: {}", material.name)
}

/// 方向为零向量时保持原来的方向，range 保存在 w 中不受影响
pub fn with_direction(light: &Light, dir: [f32; 3]) -> Light {
    let dir = Vec3::from_array(dir).normalize_or_zero();
    if dir == Vec3::ZERO {
        return *light;
    }
    Light {
        direction: dir.extend(light.direction.w),
        ..*light
    }
}

/// 渲染参数与 Scene Inspector 面板
#[derive(Default)]
pub struct ControlPanel;

impl ControlPanel {
    pub fn draw(
        &mut self,
        ui: &imgui::Ui,
        params: &mut UiParams,
        scene: &mut SceneGpuState,
        fps: f32,
        frame_time_ms: f32,
    ) -> PanelChanges {
        let mut changes = PanelChanges::default();

        ui.window("Renderer Controls")
            .size([400.0, 600.0], imgui::Condition::FirstUseEver)
            .scroll_bar(false)
            .build(|| {
                let Some(_tab_bar) = ui.tab_bar("RendererTabs") else {
                    return;
                };
                if let Some(_tab) = ui.tab_item("Main") {
                    Self::draw_main(ui, params, fps, frame_time_ms);
                }
                if let Some(_tab) = ui.tab_item("Post-Process") {
                    Self::draw_post_process(ui, params);
                }
                if let Some(_tab) = ui.tab_item("Shadows") {
                    Self::draw_shadows(ui, params);
                }
                if let Some(_tab) = ui.tab_item("Scene Inspector") {
                    Self::draw_lights(ui, params, scene);
                    ui.separator();
                    changes.material_edited = Self::draw_materials(ui, params, scene);
                }
            });

        params.sanitize();
        changes
    }

    fn draw_main(ui: &imgui::Ui, params: &mut UiParams, fps: f32, frame_time_ms: f32) {
        const HEADER: [f32; 4] = [0.0, 1.0, 1.0, 1.0];

        ui.text_colored(HEADER, "Performance");
        ui.text(format!("FPS: {:.1} ({:.3} ms)", fps, frame_time_ms));
        ui.separator();

        ui.text_colored(HEADER, "Camera & Tonemapping");
        Drag::new("Exposure").speed(0.01).range(0.0, 10.0).build(ui, &mut params.exposure);
        Drag::new("Gamma").speed(0.01).range(0.5, 5.0).build(ui, &mut params.gamma);
        Drag::new("IBL Intensity").speed(0.01).range(0.0, 5.0).build(ui, &mut params.ibl_intensity);

        ui.separator();
        ui.checkbox("Show Skybox", &mut params.show_skybox);
        ui.checkbox("Enable Headlamp", &mut params.enable_headlamp);
        ui.checkbox("GPU Frustum Culling", &mut params.enable_gpu_culling);
        ui.checkbox("Cluster Light Culling", &mut params.enable_cluster_cull);
    }

    fn draw_post_process(ui: &imgui::Ui, params: &mut UiParams) {
        if ui.collapsing_header("Bloom", TreeNodeFlags::DEFAULT_OPEN) {
            // strength 为 0 时整个 bloom 链被跳过
            Drag::new("Strength").speed(0.001).range(0.0, 1.0).build(ui, &mut params.bloom_strength);
            Drag::new("Threshold").speed(0.1).range(0.0, 10.0).build(ui, &mut params.bloom_threshold);
            Drag::new("Softness").speed(0.01).range(0.0, 1.0).build(ui, &mut params.bloom_softness);
        }

        if ui.collapsing_header("SSAO", TreeNodeFlags::DEFAULT_OPEN) {
            ui.checkbox("Enable SSAO", &mut params.enable_ssao);
            Drag::new("Radius").speed(0.01).range(0.01, 2.0).build(ui, &mut params.ssao_radius);
            Drag::new("Bias").speed(0.001).range(0.0, 0.1).build(ui, &mut params.ssao_bias);
        }

        if ui.collapsing_header("Anti-Aliasing", TreeNodeFlags::DEFAULT_OPEN) {
            ui.checkbox("Enable FXAA", &mut params.enable_fxaa);
            ui.checkbox("Enable TAA", &mut params.enable_taa);
        }
    }

    fn draw_shadows(ui: &imgui::Ui, params: &mut UiParams) {
        ui.checkbox("Visualize CSM Cascades", &mut params.visualize_cascades);
        Drag::new("Shadow Bias")
            .speed(0.0001)
            .range(0.0, 0.05)
            .display_format("%.4f")
            .build(ui, &mut params.shadow_bias);
        Drag::new("Normal Bias")
            .speed(0.0001)
            .range(0.0, 0.05)
            .display_format("%.4f")
            .build(ui, &mut params.shadow_normal_bias);
        ui.slider("PCF Range", 0, UiParams::MAX_PCF_RANGE, &mut params.pcf_range);
        ui.slider("CSM Lambda", 0.0, 1.0, &mut params.csm_lambda);
    }

    /// 灯光每帧都会重新上传，这里只修改 CPU 端数组
    fn draw_lights(ui: &imgui::Ui, params: &mut UiParams, scene: &mut SceneGpuState) {
        if !ui.collapsing_header("Lights", TreeNodeFlags::DEFAULT_OPEN) {
            return;
        }
        let lights = scene.lights();
        if lights.is_empty() {
            ui.text_disabled("no lights");
            return;
        }

        let names = lights.iter().enumerate().map(|(i, l)| light_label(i, l)).collect::<Vec<_>>();
        params.selected_light = params.selected_light.min(lights.len() - 1);
        ui.combo_simple_string("Select Light", &mut params.selected_light, &names);

        if ui.button("Remove") {
            scene.remove_light(params.selected_light);
            return;
        }
        ui.same_line();
        if ui.button("Clear All") {
            scene.clear_lights();
            return;
        }

        let original = lights[params.selected_light];
        let mut light = original;
        let _id = ui.push_id("LightEditor");

        if light.is_directional() {
            let mut dir = light.direction.truncate().to_array();
            if Drag::new("Direction").speed(0.01).build_array(ui, &mut dir) {
                light = with_direction(&light, dir);
            }
        } else {
            let mut pos = light.position.truncate().to_array();
            if Drag::new("Position").speed(0.1).build_array(ui, &mut pos) {
                light.position = Vec3::from_array(pos).extend(light.position.w);
            }
        }

        let mut color = light.color.truncate().to_array();
        if ui.color_edit3("Color", &mut color) {
            light.color = Vec3::from_array(color).extend(light.color.w);
        }
        Drag::new("Intensity").speed(0.1).range(0.0, 100.0).build(ui, &mut light.color.w);
        if !light.is_directional() {
            Drag::new("Range").speed(0.1).range(0.0, 100.0).build(ui, &mut light.direction.w);
        }

        if light != original {
            scene.update_light(params.selected_light, light);
        }
    }

    /// 返回是否修改了材质
    fn draw_materials(ui: &imgui::Ui, params: &mut UiParams, scene: &mut SceneGpuState) -> bool {
        if !ui.collapsing_header("Materials", TreeNodeFlags::DEFAULT_OPEN) {
            return false;
        }
        let materials = scene.materials();
        if materials.is_empty() {
            ui.text_disabled("no materials");
            return false;
        }

        let names = materials.iter().enumerate().map(|(i, m)| material_label(i, m)).collect::<Vec<_>>();
        params.selected_material = params.selected_material.min(materials.len() - 1);
        ui.combo_simple_string("Select Material", &mut params.selected_material, &names);

        let original = materials[params.selected_material].clone();
        let mut material = original.clone();
        let _id = ui.push_id("MaterialEditor");

        let mut base_color = material.gpu.base_color_factor.to_array();
        if ui.color_edit4("Base Color", &mut base_color) {
            material.gpu.base_color_factor = Vec4::from_array(base_color);
        }
        ui.slider("Metallic", 0.0, 1.0, &mut material.gpu.metallic_factor);
        ui.slider("Roughness", 0.0, 1.0, &mut material.gpu.roughness_factor);
        Drag::new("Alpha Cutoff").speed(0.01).range(0.0, 1.0).build(ui, &mut material.gpu.alpha_cutoff);

        if material != original {
            return scene.update_material(params.selected_material as u32, material);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sun() -> Light {
        Light {
            position: Vec4::new(5.0, 8.0, 5.0, 1.0),
            direction: Vec4::new(0.0, -1.0, 0.0, 20.0),
            color: Vec4::new(1.0, 1.0, 1.0, 10.0),
            params: Vec4::ZERO,
        }
    }

    #[test]
    fn direction_is_normalized_and_keeps_range() {
        let light = with_direction(&sun(), [0.0, -2.0, 2.0]);
        assert!((light.direction.truncate().length() - 1.0).abs() < 1e-5);
        assert_eq!(light.direction.w, 20.0);
        assert_eq!(light.color, sun().color);
    }

    #[test]
    fn zero_direction_is_rejected() {
        assert_eq!(with_direction(&sun(), [0.0, 0.0, 0.0]), sun());
    }

    #[test]
    fn labels() {
        let point = Light {
            position: Vec4::new(-5.0, 2.0, -5.0, 0.0),
            ..sun()
        };
        assert_eq!(light_label(0, &sun()), "Light 0 (Sun, Directional)");
        assert_eq!(light_label(1, &point), "Light 1 (Point)");
        assert_eq!(material_label(3, &Material::default()), "3: default");
    }
}
