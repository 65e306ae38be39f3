use ash::vk;
use glam::{Mat4, Vec2, Vec3, Vec4};
use prism_render_interface::gpu_types::{Light, SceneData};

use crate::{camera_math, ui_params::UiParams};

/// 相机在这一帧的矩阵，`projection` 已经翻转 y 轴，但不带 jitter
#[derive(Copy, Clone, Debug)]
pub struct CameraMatrices {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
}

/// 逐帧组装 [`SceneData`]，记住上一帧的 view-projection 用于计算速度
#[derive(Default)]
pub struct SceneDataBuilder {
    prev_view_projection: Option<Mat4>,
}
impl SceneDataBuilder {
    /// bindless 相关的字段由调用者随后填写
    pub fn build(
        &mut self,
        camera: &CameraMatrices,
        frame_index: u64,
        extent: vk::Extent2D,
        lights: &[Light],
        params: &UiParams,
    ) -> SceneData {
        let width = extent.width.max(1) as f32;
        let height = extent.height.max(1) as f32;

        let jitter = if params.enable_taa {
            camera_math::taa_jitter(frame_index, width, height)
        } else {
            Vec2::ZERO
        };
        let projection = camera_math::apply_jitter(camera.projection, jitter);

        let unjittered_view_projection = camera.projection * camera.view;
        let prev_view_projection = self.prev_view_projection.unwrap_or(unjittered_view_projection);
        self.prev_view_projection = Some(unjittered_view_projection);

        let splits = camera_math::cascade_splits(camera.near, camera.far, params.csm_lambda);
        let cascades = camera_math::cascade_view_projections(
            unjittered_view_projection,
            camera.near,
            camera.far,
            &splits,
            camera_math::shadow_light_direction(lights),
        );

        SceneData {
            view: camera.view,
            projection,
            view_projection: projection * camera.view,
            inverse_view: camera.view.inverse(),
            inverse_projection: projection.inverse(),
            prev_view_projection,

            camera_position: camera.position.extend(1.0),
            jitter: Vec4::new(jitter.x, jitter.y, 0.0, 0.0),
            frustum_planes: camera_math::frustum_planes(unjittered_view_projection),
            cascade_view_projection: cascades,
            cascade_splits: Vec4::from_array(splits),

            light_count: lights.len() as u32,
            enable_headlamp: params.enable_headlamp as u32,
            visualize_cascades: params.visualize_cascades as u32,
            pcf_range: params.pcf_range.clamp(0, UiParams::MAX_PCF_RANGE) as u32,

            shadow_bias: params.shadow_bias,
            shadow_normal_bias: params.shadow_normal_bias,
            csm_lambda: params.csm_lambda,
            ibl_intensity: params.ibl_intensity,

            enable_ssao: params.enable_ssao as u32,
            enable_skybox: params.show_skybox as u32,

            near_plane: camera.near,
            far_plane: camera.far,
            screen_width: width,
            screen_height: height,
            ..Default::default()
        }
    }

    /// 模型切换或者相机瞬移之后，上一帧的矩阵不再有意义
    pub fn reset_history(&mut self) {
        self.prev_view_projection = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(eye: Vec3) -> CameraMatrices {
        let mut projection = Mat4::perspective_rh(45_f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);
        projection.y_axis.y *= -1.0;
        CameraMatrices {
            view: Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y),
            projection,
            position: eye,
            near: 0.1,
            far: 100.0,
        }
    }

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 1280,
        height: 720,
    };

    #[test]
    fn first_frame_uses_current_matrix_as_previous() {
        let mut builder = SceneDataBuilder::default();
        let cam = camera(Vec3::new(0.0, 0.0, 5.0));
        let data = builder.build(&cam, 0, EXTENT, &[], &UiParams::default());
        assert_eq!(data.prev_view_projection, cam.projection * cam.view);
    }

    #[test]
    fn previous_matrix_comes_from_last_frame() {
        let mut builder = SceneDataBuilder::default();
        let first = camera(Vec3::new(0.0, 0.0, 5.0));
        let second = camera(Vec3::new(1.0, 0.0, 5.0));
        builder.build(&first, 0, EXTENT, &[], &UiParams::default());
        let data = builder.build(&second, 1, EXTENT, &[], &UiParams::default());
        assert_eq!(data.prev_view_projection, first.projection * first.view);

        builder.reset_history();
        let data = builder.build(&second, 2, EXTENT, &[], &UiParams::default());
        assert_eq!(data.prev_view_projection, second.projection * second.view);
    }

    #[test]
    fn jitter_only_with_taa() {
        let mut builder = SceneDataBuilder::default();
        let cam = camera(Vec3::new(0.0, 0.0, 5.0));

        let data = builder.build(&cam, 3, EXTENT, &[], &UiParams::default());
        assert_eq!(data.jitter, Vec4::ZERO);
        assert_eq!(data.projection, cam.projection);

        let params = UiParams {
            enable_taa: true,
            ..Default::default()
        };
        let data = builder.build(&cam, 3, EXTENT, &[], &params);
        assert_ne!(data.jitter, Vec4::ZERO);
        assert_ne!(data.projection, cam.projection);
    }

    #[test]
    fn scalar_fields_follow_params() {
        let mut builder = SceneDataBuilder::default();
        let params = UiParams {
            pcf_range: 3,
            visualize_cascades: true,
            ..Default::default()
        };
        let lights = [Light::default(), Light::default()];
        let data = builder.build(&camera(Vec3::new(0.0, 2.0, 5.0)), 0, EXTENT, &lights, &params);
        assert_eq!(data.light_count, 2);
        assert_eq!(data.pcf_range, 3);
        assert_eq!(data.visualize_cascades, 1);
        assert_eq!(data.enable_ssao, 1);
        assert_eq!(data.screen_width, 1280.0);
        assert!((data.cascade_splits.w - 100.0).abs() < 1e-3);
        assert_eq!(data.grid_size, SceneData::default().grid_size);
    }
}
