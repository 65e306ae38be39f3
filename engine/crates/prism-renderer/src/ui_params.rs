/// 控制面板可调节的渲染参数
///
/// 每帧以值的形式传给 renderer，修改后下一帧生效
#[derive(Clone, Debug, PartialEq)]
pub struct UiParams {
    pub exposure: f32,
    pub gamma: f32,
    pub ibl_intensity: f32,

    pub bloom_strength: f32,
    pub bloom_threshold: f32,
    pub bloom_softness: f32,

    pub show_skybox: bool,
    pub enable_headlamp: bool,
    pub enable_fxaa: bool,
    pub enable_taa: bool,
    pub enable_ssao: bool,
    /// 关闭后跳过 cluster cull，grid 保持上一次的结果
    pub enable_cluster_cull: bool,
    /// 在 compute shader 中按视锥剔除 indirect 命令
    pub enable_gpu_culling: bool,

    pub ssao_radius: f32,
    pub ssao_bias: f32,

    pub visualize_cascades: bool,
    pub shadow_bias: f32,
    pub shadow_normal_bias: f32,
    /// 0..=4
    pub pcf_range: i32,
    pub csm_lambda: f32,

    /// Scene Inspector 中当前选中的条目
    pub selected_material: usize,
    pub selected_light: usize,
}
impl Default for UiParams {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            gamma: 2.2,
            ibl_intensity: 1.0,

            bloom_strength: 0.04,
            bloom_threshold: 1.0,
            bloom_softness: 0.5,

            show_skybox: true,
            enable_headlamp: false,
            enable_fxaa: true,
            enable_taa: false,
            enable_ssao: true,
            enable_cluster_cull: true,
            enable_gpu_culling: false,

            ssao_radius: 0.5,
            ssao_bias: 0.025,

            visualize_cascades: false,
            shadow_bias: 0.002,
            shadow_normal_bias: 0.005,
            pcf_range: 2,
            csm_lambda: 0.95,

            selected_material: 0,
            selected_light: 0,
        }
    }
}
impl UiParams {
    pub const MAX_PCF_RANGE: i32 = 4;

    /// 将外部写入（配置文件、UI）的值限制在着色器可以接受的范围内
    pub fn sanitize(&mut self) {
        self.pcf_range = self.pcf_range.clamp(0, Self::MAX_PCF_RANGE);
        self.csm_lambda = self.csm_lambda.clamp(0.0, 1.0);
        self.exposure = self.exposure.max(0.0);
        self.gamma = self.gamma.max(0.1);
        self.bloom_softness = self.bloom_softness.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = UiParams::default();
        assert_eq!(p.bloom_strength, 0.04);
        assert_eq!(p.pcf_range, 2);
        assert_eq!(p.csm_lambda, 0.95);
        assert!(p.enable_fxaa && p.enable_ssao && p.show_skybox);
        assert!(!p.enable_headlamp && !p.visualize_cascades);
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut p = UiParams {
            pcf_range: 9,
            csm_lambda: 1.5,
            gamma: 0.0,
            ..Default::default()
        };
        p.sanitize();
        assert_eq!(p.pcf_range, 4);
        assert_eq!(p.csm_lambda, 1.0);
        assert_eq!(p.gamma, 0.1);
    }
}
