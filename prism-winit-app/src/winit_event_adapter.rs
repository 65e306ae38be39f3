use prism_app::platform::input_event::{ElementState, InputEvent, KeyCode, MouseButton};
use winit::{
    event::{KeyEvent, MouseScrollDelta, WindowEvent},
    keyboard::PhysicalKey,
};

pub struct WinitEventAdapter;
impl WinitEventAdapter {
    pub fn from_winit_event(event: &WindowEvent) -> InputEvent {
        match event {
            WindowEvent::CursorMoved { position, .. } => InputEvent::MouseMoved {
                physical_position: [position.x, position.y],
            },
            WindowEvent::MouseWheel { delta, .. } => InputEvent::MouseWheel {
                delta: Self::wheel_lines(*delta),
            },
            WindowEvent::MouseInput { state, button, .. } => InputEvent::MouseButtonInput {
                button: Self::button_from_winit(*button),
                state: Self::state_from_winit(*state),
            },
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state,
                        ..
                    },
                ..
            } => InputEvent::KeyboardInput {
                key_code: Self::key_from_winit(*key_code),
                state: Self::state_from_winit(*state),
            },
            WindowEvent::Resized(physical_size) => InputEvent::Resized {
                physical_width: physical_size.width,
                physical_height: physical_size.height,
            },
            _ => InputEvent::Other,
        }
    }

    /// 仅考虑垂直滚动，像素滚动按 100 像素一行换算
    fn wheel_lines(delta: MouseScrollDelta) -> f64 {
        match delta {
            MouseScrollDelta::LineDelta(_, y) => y as f64,
            MouseScrollDelta::PixelDelta(pos) => pos.y / 100.0,
        }
    }

    fn button_from_winit(button: winit::event::MouseButton) -> MouseButton {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            winit::event::MouseButton::Back => MouseButton::Back,
            winit::event::MouseButton::Forward => MouseButton::Forward,
            winit::event::MouseButton::Other(code) => MouseButton::Other(code),
        }
    }

    fn key_from_winit(key: winit::keyboard::KeyCode) -> KeyCode {
        match key {
            winit::keyboard::KeyCode::KeyW => KeyCode::KeyW,
            winit::keyboard::KeyCode::KeyA => KeyCode::KeyA,
            winit::keyboard::KeyCode::KeyS => KeyCode::KeyS,
            winit::keyboard::KeyCode::KeyD => KeyCode::KeyD,
            winit::keyboard::KeyCode::KeyE => KeyCode::KeyE,
            winit::keyboard::KeyCode::KeyQ => KeyCode::KeyQ,
            winit::keyboard::KeyCode::Escape => KeyCode::Escape,
            _ => KeyCode::Other,
        }
    }

    fn state_from_winit(state: winit::event::ElementState) -> ElementState {
        match state {
            winit::event::ElementState::Pressed => ElementState::Pressed,
            winit::event::ElementState::Released => ElementState::Released,
        }
    }
}

#[cfg(test)]
mod tests {
    use winit::dpi::{PhysicalPosition, PhysicalSize};

    use super::*;

    #[test]
    fn keys_outside_the_camera_set_map_to_other() {
        assert_eq!(WinitEventAdapter::key_from_winit(winit::keyboard::KeyCode::KeyW), KeyCode::KeyW);
        assert_eq!(WinitEventAdapter::key_from_winit(winit::keyboard::KeyCode::Escape), KeyCode::Escape);
        assert_eq!(WinitEventAdapter::key_from_winit(winit::keyboard::KeyCode::KeyZ), KeyCode::Other);
    }

    #[test]
    fn wheel_is_measured_in_lines() {
        assert_eq!(WinitEventAdapter::wheel_lines(MouseScrollDelta::LineDelta(0.0, 2.0)), 2.0);
        assert_eq!(
            WinitEventAdapter::wheel_lines(MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, -250.0))),
            -2.5
        );
    }

    #[test]
    fn resize_is_forwarded() {
        let event = WindowEvent::Resized(PhysicalSize::new(1280, 720));
        assert_eq!(
            WinitEventAdapter::from_winit_event(&event),
            InputEvent::Resized {
                physical_width: 1280,
                physical_height: 720
            }
        );
        assert_eq!(
            WinitEventAdapter::button_from_winit(winit::event::MouseButton::Other(7)),
            MouseButton::Other(7)
        );
        assert_eq!(
            WinitEventAdapter::state_from_winit(winit::event::ElementState::Pressed),
            ElementState::Pressed
        );
    }
}
