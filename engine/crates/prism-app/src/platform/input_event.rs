// 参考 winit::MouseButton
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
    Other(u16),
}
impl MouseButton {
    /// imgui 只关心前三个按键
    pub fn to_imgui(self) -> Option<imgui::MouseButton> {
        match self {
            MouseButton::Left => Some(imgui::MouseButton::Left),
            MouseButton::Right => Some(imgui::MouseButton::Right),
            MouseButton::Middle => Some(imgui::MouseButton::Middle),
            _ => None,
        }
    }
}

// 参考 winit::ElementState
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub enum ElementState {
    Pressed,
    Released,
}

// 参考 winit::KeyCode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyCode {
    KeyW,
    KeyA,
    KeyS,
    KeyD,
    KeyE,
    KeyQ,
    Escape,

    Other,
}

/// 与窗口系统无关的输入事件
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    KeyboardInput {
        key_code: KeyCode,
        state: ElementState,
    },
    MouseButtonInput {
        button: MouseButton,
        state: ElementState,
    },
    MouseMoved {
        physical_position: [f64; 2],
    },
    /// 以行为单位
    MouseWheel {
        delta: f64,
    },
    Resized {
        physical_width: u32,
        physical_height: u32,
    },

    Other,
}
