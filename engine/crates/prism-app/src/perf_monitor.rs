use std::{collections::VecDeque, time::Duration};

/// 最近若干帧的统计结果，时间单位为毫秒
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FrameStats {
    pub last_frame_ms: f32,
    pub avg_fps: f32,
    pub min_fps: f32,
    pub max_fps: f32,
    /// 99% 分位的帧时间对应的 FPS
    pub one_percent_low_fps: f32,
}
impl FrameStats {
    pub fn from_frame_times(frame_times_ms: &VecDeque<f32>) -> Self {
        let Some(&last_frame_ms) = frame_times_ms.back() else {
            return Self::default();
        };

        let sum: f32 = frame_times_ms.iter().sum();
        let min_time = frame_times_ms.iter().copied().fold(f32::INFINITY, f32::min);
        let max_time = frame_times_ms.iter().copied().fold(0.0, f32::max);

        let mut sorted = frame_times_ms.iter().copied().collect::<Vec<_>>();
        sorted.sort_by(f32::total_cmp);
        let percentile_idx = ((sorted.len() as f32 * 0.99) as usize).min(sorted.len() - 1);

        Self {
            last_frame_ms,
            avg_fps: 1000.0 / (sum / frame_times_ms.len() as f32),
            // 帧时间越长 FPS 越低
            min_fps: 1000.0 / max_time,
            max_fps: 1000.0 / min_time,
            one_percent_low_fps: 1000.0 / sorted[percentile_idx],
        }
    }
}

/// 记录帧时间并在 UI 中展示
pub struct PerfMonitor {
    frame_times_ms: VecDeque<f32>,
    stats: FrameStats,
}
impl Default for PerfMonitor {
    fn default() -> Self {
        Self::new()
    }
}
impl PerfMonitor {
    pub const MAX_HISTORY: usize = 1000;

    pub fn new() -> Self {
        Self {
            frame_times_ms: VecDeque::with_capacity(Self::MAX_HISTORY),
            stats: FrameStats::default(),
        }
    }

    pub fn update(&mut self, delta_time: Duration) {
        let frame_time_ms = delta_time.as_secs_f32() * 1000.0;
        // 第一帧或者断点调试之后可能为 0
        if frame_time_ms <= 0.0 {
            return;
        }

        self.frame_times_ms.push_back(frame_time_ms);
        if self.frame_times_ms.len() > Self::MAX_HISTORY {
            self.frame_times_ms.pop_front();
        }
        self.stats = FrameStats::from_frame_times(&self.frame_times_ms);
    }

    #[inline]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    #[inline]
    pub fn history_len(&self) -> usize {
        self.frame_times_ms.len()
    }

    pub fn draw_ui(&self, ui: &imgui::Ui) {
        let stats = &self.stats;
        ui.window("Performance Statistics")
            .size([300.0, 250.0], imgui::Condition::FirstUseEver)
            .collapsible(false)
            .build(|| {
                ui.text(format!("FPS: {:.1}", stats.avg_fps));
                ui.same_line();
                ui.text_disabled(format!("  ({:.3} ms)", stats.last_frame_ms));

                ui.separator();
                ui.columns(4, "PerfMetrics", false);
                for label in ["Avg", "Min", "Max", "1% Low"] {
                    ui.text(label);
                    ui.next_column();
                }
                for value in [stats.avg_fps, stats.min_fps, stats.max_fps] {
                    ui.text(format!("{:.1}", value));
                    ui.next_column();
                }
                ui.text_colored([1.0, 0.3, 0.3, 1.0], format!("{:.1}", stats.one_percent_low_fps));
                ui.next_column();
                ui.columns(1, "PerfMetrics", false);
                ui.separator();

                if !self.frame_times_ms.is_empty() {
                    let (front, back) = self.frame_times_ms.as_slices();
                    let values = [front, back].concat();
                    // 至少显示到 30 FPS 对应的帧时间
                    let max_graph_time = values.iter().copied().fold(33.3_f32, f32::max);
                    ui.plot_lines("##FrameTimes", &values)
                        .overlay_text("Frame Time (ms)")
                        .scale_min(0.0)
                        .scale_max(max_graph_time * 1.1)
                        .graph_size([0.0, 80.0])
                        .build();
                }
                ui.text_disabled(format!("History: {} frames", self.frame_times_ms.len()));
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_reports_zero() {
        let monitor = PerfMonitor::new();
        assert_eq!(*monitor.stats(), FrameStats::default());
    }

    #[test]
    fn stats_from_mixed_frame_times() {
        let mut monitor = PerfMonitor::new();
        // 99 帧 10ms，1 帧 50ms
        for _ in 0..99 {
            monitor.update(Duration::from_millis(10));
        }
        monitor.update(Duration::from_millis(50));

        let stats = monitor.stats();
        assert!((stats.last_frame_ms - 50.0).abs() < 1e-3);
        assert!((stats.max_fps - 100.0).abs() < 1e-2);
        assert!((stats.min_fps - 20.0).abs() < 1e-2);
        // 平均帧时间 10.4ms
        assert!((stats.avg_fps - 1000.0 / 10.4).abs() < 1e-1);
        // 第 99 个（0 起始）最慢的帧
        assert!((stats.one_percent_low_fps - 20.0).abs() < 1e-2);
    }

    #[test]
    fn history_is_bounded() {
        let mut monitor = PerfMonitor::new();
        for _ in 0..(PerfMonitor::MAX_HISTORY + 20) {
            monitor.update(Duration::from_millis(16));
        }
        monitor.update(Duration::ZERO);
        assert_eq!(monitor.history_len(), PerfMonitor::MAX_HISTORY);
    }
}
