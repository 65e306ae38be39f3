use std::collections::VecDeque;

use crate::platform::{
    input_event::{ElementState, InputEvent, MouseButton},
    input_state::InputState,
};

/// 输入管理器
///
/// 窗口系统把事件推入队列，每帧开始时统一消费为 [`InputState`]
pub struct InputManager {
    state: InputState,
    events: VecDeque<InputEvent>,
}
impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
// getter
impl InputManager {
    #[inline]
    pub fn state(&self) -> &InputState {
        &self.state
    }

    #[inline]
    pub fn pending_events(&self) -> &VecDeque<InputEvent> {
        &self.events
    }
}
impl InputManager {
    pub fn new() -> Self {
        Self {
            state: InputState::default(),
            events: VecDeque::new(),
        }
    }

    pub fn push_event(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    /// 处理所有队列中的事件，更新输入状态
    pub fn process_events(&mut self) {
        // 保存上一帧的鼠标位置
        self.state.last_mouse_pos = self.state.crt_mouse_pos;
        self.state.wheel_delta = 0.0;

        while let Some(event) = self.events.pop_front() {
            match event {
                InputEvent::KeyboardInput { key_code, state } => {
                    self.state.key_pressed.insert(key_code, state == ElementState::Pressed);
                }
                InputEvent::MouseButtonInput { button, state } => {
                    if button == MouseButton::Right {
                        self.state.right_button_pressed = state == ElementState::Pressed;
                    }
                }
                InputEvent::MouseMoved { physical_position } => {
                    self.state.crt_mouse_pos = physical_position;
                }
                InputEvent::MouseWheel { delta } => {
                    self.state.wheel_delta += delta;
                }
                InputEvent::Resized { .. } => {}
                InputEvent::Other => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::input_event::KeyCode;

    #[test]
    fn key_state_follows_last_event() {
        let mut manager = InputManager::new();
        manager.push_event(InputEvent::KeyboardInput {
            key_code: KeyCode::KeyW,
            state: ElementState::Pressed,
        });
        manager.process_events();
        assert!(manager.state().is_key_pressed(KeyCode::KeyW));
        assert!(!manager.state().is_key_pressed(KeyCode::KeyS));

        manager.push_event(InputEvent::KeyboardInput {
            key_code: KeyCode::KeyW,
            state: ElementState::Released,
        });
        manager.process_events();
        assert!(!manager.state().is_key_pressed(KeyCode::KeyW));
        assert!(manager.pending_events().is_empty());
    }

    #[test]
    fn mouse_delta_is_per_frame() {
        let mut manager = InputManager::new();
        manager.push_event(InputEvent::MouseMoved {
            physical_position: [10.0, 20.0],
        });
        manager.push_event(InputEvent::MouseMoved {
            physical_position: [15.0, 18.0],
        });
        manager.process_events();
        assert_eq!(manager.state().get_mouse_delta(), [15.0, 18.0]);

        manager.push_event(InputEvent::MouseMoved {
            physical_position: [20.0, 20.0],
        });
        manager.process_events();
        assert_eq!(manager.state().get_mouse_delta(), [5.0, 2.0]);

        // 没有新的移动事件时 delta 归零
        manager.process_events();
        assert_eq!(manager.state().get_mouse_delta(), [0.0, 0.0]);
    }

    #[test]
    fn right_button_and_wheel() {
        let mut manager = InputManager::new();
        manager.push_event(InputEvent::MouseButtonInput {
            button: MouseButton::Right,
            state: ElementState::Pressed,
        });
        manager.push_event(InputEvent::MouseButtonInput {
            button: MouseButton::Left,
            state: ElementState::Released,
        });
        manager.push_event(InputEvent::MouseWheel { delta: 1.0 });
        manager.push_event(InputEvent::MouseWheel { delta: 2.0 });
        manager.process_events();
        assert!(manager.state().is_right_button_pressed());
        assert_eq!(manager.state().wheel_delta, 3.0);

        manager.process_events();
        assert_eq!(manager.state().wheel_delta, 0.0);
        assert!(manager.state().is_right_button_pressed());
    }
}
