use std::{fmt::Display, ops::Deref};

/// 帧标签（A/B）
///
/// 表示当前处于 Frames in Flight 的哪一帧，通过 `Deref` 转换为索引 0/1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLabel {
    A,
    B,
}
impl Deref for FrameLabel {
    type Target = usize;
    #[inline]
    fn deref(&self) -> &Self::Target {
        match self {
            Self::A => &Self::INDEX[0],
            Self::B => &Self::INDEX[1],
        }
    }
}
impl Display for FrameLabel {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}
impl FrameLabel {
    const INDEX: [usize; 2] = [0, 1];

    #[inline]
    pub fn from_usize(idx: usize) -> Self {
        match idx % FrameCounter::fif_count() {
            0 => Self::A,
            _ => Self::B,
        }
    }
}

pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
    /// 已经提交过的帧数
    total_frames: u64,
}
// new & init
impl FrameCounter {
    pub fn new() -> Self {
        Self {
            frame_id: 0,
            total_frames: 0,
        }
    }
}
impl Default for FrameCounter {
    fn default() -> Self {
        Self::new()
    }
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
        self.total_frames += 1;
    }
}
// getters
impl FrameCounter {
    const FIF_COUNT: usize = 2;

    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
    #[inline]
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }
    #[inline]
    pub const fn fif_count() -> usize {
        Self::FIF_COUNT
    }
    #[inline]
    pub const fn frame_labels() -> [FrameLabel; Self::FIF_COUNT] {
        [FrameLabel::A, FrameLabel::B]
    }
    #[inline]
    pub fn frame_label(&self) -> FrameLabel {
        FrameLabel::from_usize(self.frame_id as usize)
    }
    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}{}]", self.frame_id, self.frame_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_alternate() {
        let mut counter = FrameCounter::new();
        assert_eq!(counter.frame_label(), FrameLabel::A);
        counter.next_frame();
        assert_eq!(counter.frame_label(), FrameLabel::B);
        assert_eq!(*counter.frame_label(), 1);
        counter.next_frame();
        assert_eq!(counter.frame_label(), FrameLabel::A);
        assert_eq!(counter.frame_name(), "[F2A]");
        assert_eq!(counter.total_frames(), 2);
    }
}
