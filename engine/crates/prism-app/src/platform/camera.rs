use glam::{Mat4, Vec3};
use prism_renderer::frame_data::CameraMatrices;

pub struct Camera {
    pub position: Vec3,

    pub euler_yaw_deg: f32,
    pub euler_pitch_deg: f32,
    pub euler_roll_deg: f32,

    /// 垂直方向的视场角
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
    aspect_ratio: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            euler_yaw_deg: 0.0,
            euler_pitch_deg: 0.0,
            euler_roll_deg: 0.0,

            fov_deg: 45.0,
            near: 0.1,
            far: 1000.0,
            aspect_ratio: 16.0 / 9.0,
        }
    }
}

impl Camera {
    /// 相机的上参考向量
    const CAMERA_UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);

    /// YXZ 表示 Y(yaw)-X(Pitch)-Z(Roll) 的旋转顺序
    const CAMERA_EULER: glam::EulerRot = glam::EulerRot::YXZ;

    /// 没有旋转的情况下，相机看向的是 -Z
    const CAMERA_FORWARD: Vec3 = Vec3::new(0.0, 0.0, -1.0);

    const CAMERA_RIGHT: Vec3 = Vec3::new(1.0, 0.0, 0.0);

    pub const K_PITCH: f32 = 89.5;

    #[inline]
    fn rotation(&self) -> Mat4 {
        Mat4::from_euler(
            Self::CAMERA_EULER,
            self.euler_yaw_deg.to_radians(),
            self.euler_pitch_deg.to_radians(),
            self.euler_roll_deg.to_radians(),
        )
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.camera_forward(), Self::CAMERA_UP)
    }

    /// Vulkan 的 NDC 中 y 轴朝下，因此翻转投影矩阵的 y
    pub fn projection_matrix(&self) -> Mat4 {
        let mut projection = Mat4::perspective_rh(self.fov_deg.to_radians(), self.aspect_ratio, self.near, self.far);
        projection.y_axis.y *= -1.0;
        projection
    }

    pub fn matrices(&self) -> CameraMatrices {
        CameraMatrices {
            view: self.view_matrix(),
            projection: self.projection_matrix(),
            position: self.position,
            near: self.near,
            far: self.far,
        }
    }

    pub fn camera_forward(&self) -> Vec3 {
        self.rotation().transform_vector3(Self::CAMERA_FORWARD)
    }

    pub fn camera_right(&self) -> Vec3 {
        self.rotation().transform_vector3(Self::CAMERA_RIGHT)
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    /// 窗口最小化时高度为 0，此时保持原来的宽高比
    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        if aspect_ratio.is_finite() && aspect_ratio > 0.0 {
            self.aspect_ratio = aspect_ratio;
        }
    }

    /// 朝相机看向的方向进行移动
    pub fn move_forward(&mut self, length: f32) {
        self.position += self.camera_forward() * length;
    }

    pub fn move_right(&mut self, length: f32) {
        self.position += self.camera_right() * length;
    }

    /// 朝世界的 Up 进行移动
    pub fn move_up(&mut self, length: f32) {
        self.position += Self::CAMERA_UP * length;
    }

    pub fn rotate_yaw(&mut self, angle: f32) {
        self.euler_yaw_deg = (self.euler_yaw_deg + angle).rem_euclid(360.0);
    }

    pub fn rotate_pitch(&mut self, angle: f32) {
        self.euler_pitch_deg = (self.euler_pitch_deg + angle).clamp(-Self::K_PITCH, Self::K_PITCH);
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4Swizzles;

    use super::*;

    #[test]
    fn default_camera_looks_down_negative_z() {
        let camera = Camera::default();
        assert!((camera.camera_forward() - Vec3::NEG_Z).length() < 1e-5);
        assert!((camera.camera_right() - Vec3::X).length() < 1e-5);
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 5.0));

        // 原点位于相机前方 5 个单位
        let origin_in_view = camera.view_matrix() * Vec3::ZERO.extend(1.0);
        assert!((origin_in_view.xyz() - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-5);
    }

    #[test]
    fn pitch_is_clamped_and_yaw_wraps() {
        let mut camera = Camera::default();
        camera.rotate_pitch(120.0);
        assert_eq!(camera.euler_pitch_deg, Camera::K_PITCH);
        camera.rotate_pitch(-300.0);
        assert_eq!(camera.euler_pitch_deg, -Camera::K_PITCH);

        camera.rotate_yaw(-30.0);
        assert!((camera.euler_yaw_deg - 330.0).abs() < 1e-4);
        camera.rotate_yaw(60.0);
        assert!((camera.euler_yaw_deg - 30.0).abs() < 1e-4);
    }

    #[test]
    fn projection_flips_y_for_vulkan() {
        let camera = Camera::default();
        let clip = camera.projection_matrix() * Vec3::new(0.0, 1.0, -5.0).extend(1.0);
        // 位于相机上方的点在 Vulkan NDC 中 y < 0
        assert!(clip.y / clip.w < 0.0);

        let near = camera.projection_matrix() * Vec3::new(0.0, 0.0, -camera.near).extend(1.0);
        assert!((near.z / near.w).abs() < 1e-5);
    }

    #[test]
    fn invalid_aspect_ratio_is_ignored() {
        let mut camera = Camera::default();
        camera.set_aspect_ratio(800.0 / 0.0);
        assert_eq!(camera.aspect_ratio(), 16.0 / 9.0);
        camera.set_aspect_ratio(2.0);
        assert_eq!(camera.aspect_ratio(), 2.0);
    }
}
