use std::path::PathBuf;

use clap::Parser;
use prism_app::{config::Config, render_app::RenderApp};
use prism_crate_tools::resource::PrismPath;

mod app;
mod winit_event_adapter;

/// PBR 模型查看器
#[derive(Parser, Debug)]
#[command(name = "prism-viewer", version, about)]
struct Cli {
    /// 要加载的模型（.gltf / .glb / .obj），缺省时使用上次打开的模型
    model_path: Option<PathBuf>,
}

/// 命令行参数优先，其次是配置文件中记录的路径，最后是内置的默认模型
fn resolve_model_path(cli: Option<PathBuf>, config: &Config, default: PathBuf) -> PathBuf {
    cli.or_else(|| {
        let last = config.general.last_model_path.trim();
        (!last.is_empty()).then(|| PathBuf::from(last))
    })
    .unwrap_or(default)
}

fn main() {
    let cli = Cli::parse();
    RenderApp::init_env();

    let config = Config::load(&PrismPath::config_path());
    let model_path = resolve_model_path(cli.model_path, &config, PrismPath::default_model_path());
    log::info!("model: {}", model_path.display());

    if let Err(e) = app::WinitApp::run(config, model_path) {
        log::error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_path_wins() {
        let mut config = Config::default();
        config.general.last_model_path = "last.gltf".to_string();
        let path = resolve_model_path(Some(PathBuf::from("cli.obj")), &config, PathBuf::from("default.gltf"));
        assert_eq!(path, PathBuf::from("cli.obj"));
    }

    #[test]
    fn falls_back_to_config_then_default() {
        let mut config = Config::default();
        assert_eq!(resolve_model_path(None, &config, PathBuf::from("default.gltf")), PathBuf::from("default.gltf"));

        config.general.last_model_path = "  ".to_string();
        assert_eq!(resolve_model_path(None, &config, PathBuf::from("default.gltf")), PathBuf::from("default.gltf"));

        config.general.last_model_path = "last.gltf".to_string();
        assert_eq!(resolve_model_path(None, &config, PathBuf::from("default.gltf")), PathBuf::from("last.gltf"));
    }

    #[test]
    fn parses_optional_positional() {
        let cli = Cli::try_parse_from(["prism-viewer"]).unwrap();
        assert!(cli.model_path.is_none());
        let cli = Cli::try_parse_from(["prism-viewer", "assets/models/box.obj"]).unwrap();
        assert_eq!(cli.model_path, Some(PathBuf::from("assets/models/box.obj")));
    }
}
