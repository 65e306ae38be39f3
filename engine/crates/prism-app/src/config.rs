use std::path::Path;

use anyhow::Context;
use prism_renderer::ui_params::UiParams;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneralSection {
    pub window_width: u32,
    pub window_height: u32,
    pub fullscreen: bool,
    /// 空字符串表示没有记录
    pub last_model_path: String,
}
impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            window_width: 1600,
            window_height: 900,
            fullscreen: false,
            last_model_path: String::new(),
        }
    }
}

/// 持久化的 [`UiParams`] 快照，缺失的字段取 `UiParams` 的默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RendererSection {
    pub exposure: f32,
    pub bloom_strength: f32,
    pub gamma: f32,
    pub ibl_intensity: f32,
    #[serde(rename = "enableFXAA")]
    pub enable_fxaa: bool,
    #[serde(rename = "enableSSAO")]
    pub enable_ssao: bool,
    pub shadow_bias: f32,
    pub shadow_normal_bias: f32,
    pub pcf_range: i32,
}
impl Default for RendererSection {
    fn default() -> Self {
        Self::from(&UiParams::default())
    }
}
impl From<&UiParams> for RendererSection {
    fn from(params: &UiParams) -> Self {
        Self {
            exposure: params.exposure,
            bloom_strength: params.bloom_strength,
            gamma: params.gamma,
            ibl_intensity: params.ibl_intensity,
            enable_fxaa: params.enable_fxaa,
            enable_ssao: params.enable_ssao,
            shadow_bias: params.shadow_bias,
            shadow_normal_bias: params.shadow_normal_bias,
            pcf_range: params.pcf_range,
        }
    }
}

/// `config.json` 中保存的偏好设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralSection,
    /// 从未保存过渲染参数时为 `None`，此时不覆盖 UI 的默认值
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer: Option<RendererSection>,
}

// load & save
impl Config {
    pub const DEFAULT_FILE_NAME: &'static str = "config.json";

    /// 文件不存在或者格式错误时都退回到默认值，不会中断启动
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            log::info!("Config file {} not found, using defaults.", path.display());
            return Self::default();
        }

        match Self::read(path) {
            Ok(config) => {
                log::info!("Config loaded from {}.", path.display());
                config
            }
            Err(e) => {
                log::error!("Failed to load config {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        log::info!("Config saved to {}.", path.display());
        Ok(())
    }
}

// ui params
impl Config {
    pub fn apply_to(&self, params: &mut UiParams) {
        let Some(r) = &self.renderer else {
            return;
        };
        params.exposure = r.exposure;
        params.bloom_strength = r.bloom_strength;
        params.gamma = r.gamma;
        params.ibl_intensity = r.ibl_intensity;
        params.enable_fxaa = r.enable_fxaa;
        params.enable_ssao = r.enable_ssao;
        params.shadow_bias = r.shadow_bias;
        params.shadow_normal_bias = r.shadow_normal_bias;
        params.pcf_range = r.pcf_range;
        params.sanitize();
    }

    pub fn update_from(&mut self, params: &UiParams) {
        self.renderer = Some(RendererSection::from(params));
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("prism-config-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = temp_dir("missing");
        let config = Config::load(&dir.join("nope.json"));
        assert_eq!(config, Config::default());
        assert_eq!(config.general.window_width, 1600);
        assert_eq!(config.general.window_height, 900);
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let dir = temp_dir("malformed");
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Config::load(&path), Config::default());
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = temp_dir("round-trip");
        let path = dir.join("config.json");

        let params = UiParams {
            exposure: 1.7,
            enable_fxaa: false,
            pcf_range: 3,
            ..Default::default()
        };
        let mut config = Config::default();
        config.general.last_model_path = "assets/models/box.obj".to_string();
        config.general.fullscreen = true;
        config.update_from(&params);
        config.save(&path).unwrap();

        let loaded = Config::load(&path);
        assert_eq!(loaded, config);

        let mut applied = UiParams::default();
        loaded.apply_to(&mut applied);
        assert_eq!(applied.exposure, 1.7);
        assert!(!applied.enable_fxaa);
        assert_eq!(applied.pcf_range, 3);
    }

    #[test]
    fn uses_camel_case_keys_and_partial_sections() {
        let json = r#"{
            "general": { "windowWidth": 1280, "lastModelPath": "a.gltf" },
            "renderer": { "enableFXAA": false, "pcfRange": 9 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.general.window_width, 1280);
        assert_eq!(config.general.window_height, 900);
        assert_eq!(config.general.last_model_path, "a.gltf");

        let mut params = UiParams::default();
        config.apply_to(&mut params);
        assert!(!params.enable_fxaa);
        assert_eq!(params.exposure, UiParams::default().exposure);
        // 超出范围的值会被限制
        assert_eq!(params.pcf_range, UiParams::MAX_PCF_RANGE);

        let text = serde_json::to_string(&config).unwrap();
        assert!(text.contains("\"enableSSAO\""));
        assert!(text.contains("\"shadowNormalBias\""));
    }

    #[test]
    fn absent_renderer_section_keeps_ui_defaults() {
        let config: Config = serde_json::from_str(r#"{ "general": {} }"#).unwrap();
        let mut params = UiParams {
            exposure: 3.0,
            ..Default::default()
        };
        config.apply_to(&mut params);
        assert_eq!(params.exposure, 3.0);
    }
}
