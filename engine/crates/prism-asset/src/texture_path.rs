//! 外部格式（OBJ 等）中纹理路径的查找
//!
//! 模型文件中记录的纹理路径经常是作者机器上的绝对路径，或者相对于另一个目录。
//! 按照下面的顺序依次尝试，找到第一个存在的文件：
//! 1. 原样
//! 2. 相对于模型所在目录
//! 3. `<模型目录>/textures/<文件名>`
//! 4. `<模型目录>/../textures/<文件名>`
//! 5. `<模型目录>/../<文件名>`
//! 6. 在模型目录的上上级目录中递归查找同名文件
//! 7. 在找到的 textures 目录中，按 BaseColor/Normal 等后缀模糊匹配

use std::path::{Path, PathBuf};

use itertools::Itertools;
use walkdir::WalkDir;

/// 模糊匹配时识别的后缀
const TEXTURE_SUFFIXES: &[&str] = &["basecolor", "normal", "metallic", "roughness", "occlusion", "emissive"];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tga", "bmp", "hdr"];

/// 递归查找的最大深度
const SEARCH_DEPTH: usize = 6;

pub fn resolve_texture_path(model_dir: &Path, raw: &str) -> Option<PathBuf> {
    // 统一分隔符，Windows 上导出的模型会使用反斜杠
    let normalized = raw.trim().replace('\\', "/");
    if normalized.is_empty() {
        return None;
    }
    let raw_path = PathBuf::from(&normalized);
    let file_name = raw_path.file_name()?.to_owned();

    let parent = model_dir.parent();
    let candidates = [
        Some(raw_path.clone()),
        Some(model_dir.join(&raw_path)),
        Some(model_dir.join("textures").join(&file_name)),
        parent.map(|p| p.join("textures").join(&file_name)),
        parent.map(|p| p.join(&file_name)),
    ];
    if let Some(found) = candidates.into_iter().flatten().find(|p| p.is_file()) {
        return Some(found);
    }

    if let Some(grandparent) = parent.and_then(Path::parent) {
        let found = WalkDir::new(grandparent)
            .max_depth(SEARCH_DEPTH)
            .into_iter()
            .filter_map(Result::ok)
            .find(|e| e.file_type().is_file() && e.file_name() == file_name.as_os_str());
        if let Some(entry) = found {
            return Some(entry.into_path());
        }
    }

    let stem = raw_path.file_stem()?.to_string_lossy().to_lowercase();
    let suffix = TEXTURE_SUFFIXES.iter().find(|s| stem.ends_with(*s))?;
    find_textures_dirs(model_dir).into_iter().find_map(|dir| find_by_suffix(&dir, suffix))
}

/// 模型目录附近可能存放纹理的目录
fn find_textures_dirs(model_dir: &Path) -> Vec<PathBuf> {
    let mut dirs = vec![model_dir.join("textures"), model_dir.to_path_buf()];
    if let Some(parent) = model_dir.parent() {
        dirs.push(parent.join("textures"));
        dirs.extend(
            WalkDir::new(parent)
                .max_depth(SEARCH_DEPTH)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_dir() && e.file_name().eq_ignore_ascii_case("textures"))
                .map(|e| e.into_path()),
        );
    }
    dirs.into_iter().filter(|d| d.is_dir()).unique().collect()
}

fn find_by_suffix(dir: &Path, suffix: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_image_file(p))
        .filter(|p| p.file_stem().is_some_and(|s| s.to_string_lossy().to_lowercase().ends_with(suffix)))
        .sorted()
        .next()
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// 每个测试使用独立的临时目录
    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("prism-texture-path-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn relative_to_model_dir() {
        let root = scratch_dir("relative");
        let model_dir = root.join("models/crate");
        touch(&model_dir.join("wood.png"));

        let found = resolve_texture_path(&model_dir, "wood.png").unwrap();
        assert_eq!(found, model_dir.join("wood.png"));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn absolute_foreign_path_falls_back_to_textures_dir() {
        let root = scratch_dir("textures");
        let model_dir = root.join("models/crate");
        fs::create_dir_all(&model_dir).unwrap();
        touch(&model_dir.join("textures/wood.png"));

        let found = resolve_texture_path(&model_dir, "C:\\Users\\artist\\wood.png").unwrap();
        assert_eq!(found, model_dir.join("textures/wood.png"));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn sibling_textures_and_parent_dir() {
        let root = scratch_dir("sibling");
        let model_dir = root.join("models/crate");
        fs::create_dir_all(&model_dir).unwrap();
        touch(&root.join("models/textures/metal.png"));
        touch(&root.join("models/rust.png"));

        assert_eq!(resolve_texture_path(&model_dir, "metal.png").unwrap(), root.join("models/textures/metal.png"));
        assert_eq!(resolve_texture_path(&model_dir, "rust.png").unwrap(), root.join("models/rust.png"));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn recursive_search_in_grandparent() {
        let root = scratch_dir("recursive");
        let model_dir = root.join("models/crate");
        fs::create_dir_all(&model_dir).unwrap();
        touch(&root.join("shared/pack/deep/stone.png"));

        assert_eq!(
            resolve_texture_path(&model_dir, "stone.png").unwrap(),
            root.join("shared/pack/deep/stone.png")
        );
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn fuzzy_suffix_match() {
        let root = scratch_dir("fuzzy");
        let model_dir = root.join("models/helmet");
        fs::create_dir_all(&model_dir).unwrap();
        touch(&model_dir.join("textures/Helmet_basecolor.jpg"));
        touch(&model_dir.join("textures/Helmet_normal.jpg"));

        let found = resolve_texture_path(&model_dir, "default_BaseColor.png").unwrap();
        assert_eq!(found, model_dir.join("textures/Helmet_basecolor.jpg"));
        let found = resolve_texture_path(&model_dir, "x/y/mat_Normal.tga").unwrap();
        assert_eq!(found, model_dir.join("textures/Helmet_normal.jpg"));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn nothing_found() {
        let root = scratch_dir("missing");
        let model_dir = root.join("models/crate");
        fs::create_dir_all(&model_dir).unwrap();

        assert!(resolve_texture_path(&model_dir, "ghost.png").is_none());
        assert!(resolve_texture_path(&model_dir, "").is_none());
        fs::remove_dir_all(&root).unwrap();
    }
}
