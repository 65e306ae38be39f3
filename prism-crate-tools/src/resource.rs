use std::path::{Path, PathBuf};

/// 统一资源路径管理
///
/// 资源都放在 `assets/` 目录下，根目录默认是当前工作目录，
/// 可以通过环境变量 `PRISM_ROOT` 覆盖。
///
/// # 使用示例
/// ```ignore
/// let model = PrismPath::models_path("damaged_helmet/scene.gltf"); // assets/models/damaged_helmet/scene.gltf
/// let shader = PrismPath::shader_path("pbr.vert");                  // assets/shaders/pbr.vert.spv
/// ```
pub struct PrismPath {}
// 核心路径
impl PrismPath {
    pub const ROOT_ENV: &'static str = "PRISM_ROOT";

    /// 资源根目录
    pub fn root_path() -> PathBuf {
        match std::env::var_os(Self::ROOT_ENV) {
            Some(root) => PathBuf::from(root),
            None => PathBuf::from("."),
        }
    }

    pub fn assets_root() -> PathBuf {
        Self::root_path().join("assets")
    }
}
// assets 目录下
impl PrismPath {
    pub fn models_path(filename: impl AsRef<Path>) -> PathBuf {
        Self::assets_root().join("models").join(filename)
    }

    pub fn textures_path(filename: impl AsRef<Path>) -> PathBuf {
        Self::assets_root().join("textures").join(filename)
    }

    /// 获取编译后的 SPIR-V 路径：`assets/shaders/<name>.spv`
    ///
    /// `name` 需要带上阶段后缀，例如 `pbr.vert`
    pub fn shader_path(name: &str) -> PathBuf {
        Self::assets_root().join("shaders").join(format!("{name}.spv"))
    }

    /// 默认加载的模型
    pub fn default_model_path() -> PathBuf {
        Self::models_path("damaged_helmet/scene.gltf")
    }

    /// 偏好设置文件，放在工作目录下
    pub fn config_path() -> PathBuf {
        PathBuf::from("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_path_appends_spv() {
        let path = PrismPath::shader_path("pbr.vert");
        assert!(path.ends_with("assets/shaders/pbr.vert.spv"));
    }

    #[test]
    fn default_model_lives_under_models() {
        let path = PrismPath::default_model_path();
        assert!(path.ends_with("assets/models/damaged_helmet/scene.gltf"));
    }
}
