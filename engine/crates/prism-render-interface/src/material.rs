use crate::gpu_types::{AlphaMode, MaterialGpu};

/// 材质的 CPU 形式：名字用于 UI 展示，GPU 部分直接上传
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub gpu: MaterialGpu,
}
impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            gpu: MaterialGpu::default(),
        }
    }
}
impl Material {
    pub fn new(name: impl Into<String>, gpu: MaterialGpu) -> Self {
        Self { name: name.into(), gpu }
    }

    #[inline]
    pub fn alpha_mode(&self) -> AlphaMode {
        self.gpu.alpha_mode()
    }
}
