use std::time::Duration;

use crate::platform::{camera::Camera, input_event::KeyCode, input_state::InputState};

pub struct CameraController {
    camera: Camera,
    /// 单位：米每秒，滚轮可以调整
    move_speed: f32,
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraController {
    const MIN_SPEED: f32 = 0.1;
    const MAX_SPEED: f32 = 100.0;

    pub fn new() -> Self {
        Self {
            camera: Camera::default(),
            move_speed: 5.0,
        }
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    #[inline]
    pub fn move_speed(&self) -> f32 {
        self.move_speed
    }

    /// 根据输入更新相机状态
    ///
    /// `allow_mouse` 为 false 时（鼠标位于 UI 上）忽略拖拽和滚轮
    pub fn update(&mut self, input_state: &InputState, viewport_size: glam::Vec2, delta_time: Duration, allow_mouse: bool) {
        let delta_time_s = delta_time.as_secs_f32();

        self.camera.set_aspect_ratio(viewport_size.x / viewport_size.y);

        if allow_mouse {
            if input_state.is_right_button_pressed() {
                let mouse_delta = input_state.get_mouse_delta();

                self.camera.rotate_yaw(-mouse_delta[0] as f32 / 7.0);
                self.camera.rotate_pitch(-mouse_delta[1] as f32 / 7.0);
            }
            if input_state.wheel_delta != 0.0 {
                self.move_speed = (self.move_speed * 1.1_f32.powf(input_state.wheel_delta as f32))
                    .clamp(Self::MIN_SPEED, Self::MAX_SPEED);
            }
        }

        let step = delta_time_s * self.move_speed;
        if input_state.is_key_pressed(KeyCode::KeyW) {
            self.camera.move_forward(step);
        }
        if input_state.is_key_pressed(KeyCode::KeyS) {
            self.camera.move_forward(-step);
        }
        if input_state.is_key_pressed(KeyCode::KeyA) {
            self.camera.move_right(-step);
        }
        if input_state.is_key_pressed(KeyCode::KeyD) {
            self.camera.move_right(step);
        }
        if input_state.is_key_pressed(KeyCode::KeyE) {
            self.camera.move_up(step);
        }
        if input_state.is_key_pressed(KeyCode::KeyQ) {
            self.camera.move_up(-step);
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec3};

    use super::*;

    fn pressed(keys: &[KeyCode]) -> InputState {
        let mut state = InputState::default();
        for key in keys {
            state.key_pressed.insert(*key, true);
        }
        state
    }

    #[test]
    fn wasd_moves_on_view_plane() {
        let mut controller = CameraController::new();
        let viewport = Vec2::new(1600.0, 900.0);
        controller.update(&pressed(&[KeyCode::KeyW]), viewport, Duration::from_secs(1), true);
        assert!((controller.camera().position - Vec3::new(0.0, 0.0, 0.0)).length() < 1e-4);

        controller.update(&pressed(&[KeyCode::KeyD, KeyCode::KeyE]), viewport, Duration::from_secs(1), true);
        assert!((controller.camera().position - Vec3::new(5.0, 5.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn right_drag_rotates_only_when_mouse_allowed() {
        let mut controller = CameraController::new();
        let state = InputState {
            crt_mouse_pos: [70.0, 0.0],
            last_mouse_pos: [0.0, 0.0],
            right_button_pressed: true,
            ..Default::default()
        };
        let viewport = Vec2::new(800.0, 600.0);

        controller.update(&state, viewport, Duration::ZERO, false);
        assert_eq!(controller.camera().euler_yaw_deg, 0.0);

        controller.update(&state, viewport, Duration::ZERO, true);
        assert!((controller.camera().euler_yaw_deg - 350.0).abs() < 1e-4);
        assert!((controller.camera().aspect_ratio() - 800.0 / 600.0).abs() < 1e-6);
    }

    #[test]
    fn wheel_changes_speed_within_bounds() {
        let mut controller = CameraController::new();
        let state = InputState {
            wheel_delta: 1000.0,
            ..Default::default()
        };
        controller.update(&state, Vec2::ONE, Duration::ZERO, true);
        assert_eq!(controller.move_speed(), CameraController::MAX_SPEED);
    }
}
