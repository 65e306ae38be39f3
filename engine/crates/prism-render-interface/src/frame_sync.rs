use std::rc::Rc;

use ash::vk;
use itertools::Itertools;
use prism_gfx::{
    commands::{
        command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, command_queue::GfxCommandQueue,
        fence::GfxFence, semaphore::GfxSemaphore, submit_info::GfxSubmitInfo,
    },
    foundation::device::GfxDevice,
    gfx::Gfx,
    swapchain::swapchain::GfxSwapchain,
};

use crate::{
    frame_counter::{FrameCounter, FrameLabel},
    render_error::RenderError,
};

/// 一个 frame slot 在一帧中经历的阶段
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FramePhase {
    /// GPU 可能仍在使用该 slot 的资源
    Idle,
    /// fence 已经 signal，CPU 可以写入该 slot 的 buffer
    Waited,
    Acquired,
    Recording,
    /// 已经提交，等待下一次 wait
    Submitted,
}

/// 写入某个 slot 的 per-frame buffer 的许可
///
/// 只能由 [`FramePhaseTracker::writable`] 在 fence signal 之后、开始录制之前发放
#[derive(Debug)]
pub struct FrameWrite {
    frame: FrameLabel,
}
impl FrameWrite {
    #[inline]
    pub fn frame(&self) -> FrameLabel {
        self.frame
    }
}

/// 记录每个 slot 所处的阶段，用于约束 CPU 对 per-frame buffer 的写入时机
#[derive(Debug)]
pub struct FramePhaseTracker {
    phases: [FramePhase; FrameCounter::fif_count()],
}
impl Default for FramePhaseTracker {
    fn default() -> Self {
        Self {
            phases: [FramePhase::Idle; FrameCounter::fif_count()],
        }
    }
}
impl FramePhaseTracker {
    #[inline]
    pub fn phase(&self, frame: FrameLabel) -> FramePhase {
        self.phases[*frame]
    }

    #[inline]
    pub fn on_wait(&mut self, frame: FrameLabel) {
        self.phases[*frame] = FramePhase::Waited;
    }

    #[inline]
    pub fn on_acquire(&mut self, frame: FrameLabel) {
        debug_assert_eq!(self.phases[*frame], FramePhase::Waited);
        self.phases[*frame] = FramePhase::Acquired;
    }

    #[inline]
    pub fn on_record(&mut self, frame: FrameLabel) {
        debug_assert_eq!(self.phases[*frame], FramePhase::Acquired);
        self.phases[*frame] = FramePhase::Recording;
    }

    #[inline]
    pub fn on_submit(&mut self, frame: FrameLabel) {
        debug_assert_eq!(self.phases[*frame], FramePhase::Recording);
        self.phases[*frame] = FramePhase::Submitted;
    }

    #[inline]
    pub fn reset(&mut self, frame: FrameLabel) {
        self.phases[*frame] = FramePhase::Idle;
    }

    /// 只有在 fence signal 之后、开始录制之前，CPU 才可以写入该 slot 的数据
    #[inline]
    pub fn cpu_writable(&self, frame: FrameLabel) -> bool {
        matches!(self.phases[*frame], FramePhase::Waited | FramePhase::Acquired)
    }

    pub fn writable(&self, frame: FrameLabel) -> Result<FrameWrite, RenderError> {
        if self.cpu_writable(frame) {
            Ok(FrameWrite { frame })
        } else {
            Err(RenderError::FrameNotWritable {
                frame: frame.to_string(),
                phase: format!("{:?}", self.phase(frame)),
            })
        }
    }
}

struct FrameSlot {
    /// 创建时即为 signaled
    in_flight_fence: GfxFence,
    image_available: GfxSemaphore,

    command_pool: GfxCommandPool,
    command_buffer: GfxCommandBuffer,
}
impl FrameSlot {
    fn new(gfx: &Gfx, label: FrameLabel) -> anyhow::Result<Self> {
        let device = gfx.device().clone();
        let command_pool = GfxCommandPool::new(
            device.clone(),
            gfx.gfx_queue().queue_family(),
            vk::CommandPoolCreateFlags::TRANSIENT,
            &format!("frame-{label}"),
        )?;
        let command_buffer = GfxCommandBuffer::new(&command_pool, &format!("frame-{label}"))?;
        Ok(Self {
            in_flight_fence: GfxFence::new(device.clone(), true, &format!("in-flight-{label}"))?,
            image_available: GfxSemaphore::new(device, &format!("image-available-{label}"))?,
            command_pool,
            command_buffer,
        })
    }
}

/// frames in flight 的同步对象
///
/// 每个 slot 拥有 fence、image-available semaphore 以及 command buffer；
/// render-finished semaphore 按 swapchain image 分配，避免 present 时的 WAR 冲突
pub struct FrameSync {
    slots: Vec<FrameSlot>,
    render_finished: Vec<GfxSemaphore>,

    current_frame: usize,
    phases: FramePhaseTracker,

    device: Rc<GfxDevice>,
}

// new & init
impl FrameSync {
    pub fn new(gfx: &Gfx, swapchain_image_count: usize) -> anyhow::Result<Self> {
        let slots = FrameCounter::frame_labels().iter().map(|label| FrameSlot::new(gfx, *label)).try_collect()?;
        let render_finished = Self::create_render_finished(gfx.device(), swapchain_image_count)?;

        Ok(Self {
            slots,
            render_finished,
            current_frame: 0,
            phases: FramePhaseTracker::default(),
            device: gfx.device().clone(),
        })
    }

    fn create_render_finished(device: &Rc<GfxDevice>, image_count: usize) -> anyhow::Result<Vec<GfxSemaphore>> {
        (0..image_count)
            .map(|idx| GfxSemaphore::new(device.clone(), &format!("render-finished-{idx}")))
            .try_collect()
    }

    /// swapchain 重建之后 image 数量可能发生变化，需要在 device idle 时调用
    pub fn recreate_render_finished(&mut self, swapchain_image_count: usize) -> anyhow::Result<()> {
        self.render_finished = Self::create_render_finished(&self.device, swapchain_image_count)?;
        Ok(())
    }
}

// getters
impl FrameSync {
    #[inline]
    pub fn current_frame(&self) -> FrameLabel {
        FrameLabel::from_usize(self.current_frame)
    }

    #[inline]
    pub fn command_buffer(&self) -> &GfxCommandBuffer {
        &self.slots[self.current_frame].command_buffer
    }

    /// 当前 slot 的写入许可，scene 与 UI 的上传都需要它
    #[inline]
    pub fn writable_frame(&self) -> Result<FrameWrite, RenderError> {
        self.phases.writable(self.current_frame())
    }
}

// frame protocol
impl FrameSync {
    /// 1. 等待当前 slot 的 fence
    pub fn wait_frame(&mut self) -> anyhow::Result<()> {
        let _span = tracy_client::span!("FrameSync::wait_frame");
        self.slots[self.current_frame].in_flight_fence.wait()?;
        self.phases.on_wait(self.current_frame());
        Ok(())
    }

    /// 2. 获取 swapchain image；返回 `None` 表示需要重建 swapchain
    ///
    /// 3. 只有在获取成功之后才 reset fence，避免下一次 wait 死锁
    pub fn acquire_image(&mut self, swapchain: &GfxSwapchain) -> anyhow::Result<Option<u32>> {
        let _span = tracy_client::span!("FrameSync::acquire_image");
        let slot = &self.slots[self.current_frame];
        let Some(image_index) = swapchain.acquire_next_image(&slot.image_available)? else {
            return Ok(None);
        };
        slot.in_flight_fence.reset()?;
        self.phases.on_acquire(self.current_frame());
        Ok(Some(image_index))
    }

    /// 4. 开始录制当前 slot 的 command buffer
    pub fn begin_recording(&mut self) -> anyhow::Result<&GfxCommandBuffer> {
        let frame = self.current_frame();
        let slot = &self.slots[self.current_frame];
        slot.command_pool.reset_all_buffers()?;
        slot.command_buffer.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, &format!("frame-{frame}"))?;
        self.phases.on_record(frame);
        Ok(&self.slots[self.current_frame].command_buffer)
    }

    /// 5. 结束录制并提交
    pub fn submit(&mut self, queue: &GfxCommandQueue, image_index: u32) -> anyhow::Result<()> {
        let _span = tracy_client::span!("FrameSync::submit");
        let slot = &self.slots[self.current_frame];
        slot.command_buffer.end()?;

        let submit_info = GfxSubmitInfo::new(&[&slot.command_buffer])
            .wait(
                &slot.image_available,
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags2::TRANSFER,
            )
            .signal(&self.render_finished[image_index as usize], vk::PipelineStageFlags2::ALL_COMMANDS);
        queue.submit(&[submit_info], Some(&slot.in_flight_fence))?;
        self.phases.on_submit(self.current_frame());
        Ok(())
    }

    /// 6. present；返回值表示是否需要重建 swapchain
    pub fn present(&self, swapchain: &GfxSwapchain, queue: &GfxCommandQueue, image_index: u32) -> anyhow::Result<bool> {
        let _span = tracy_client::span!("FrameSync::present");
        swapchain.present_image(queue, image_index, &self.render_finished[image_index as usize])
    }

    /// 7. 切换到下一个 slot
    #[inline]
    pub fn advance(&mut self) {
        self.current_frame = (self.current_frame + 1) % FrameCounter::fif_count();
    }

    /// 录制失败时丢弃当前帧
    ///
    /// fence 已经被 reset，image-available 已经被 signal，只能在 device idle 之后重新创建这两个对象；
    /// 已经获取的 swapchain image 由调用者通过重建 swapchain 归还
    pub fn abort_frame(&mut self, gfx: &Gfx) -> anyhow::Result<()> {
        gfx.wait_idle()?;
        let frame = self.current_frame();
        self.slots[self.current_frame] = FrameSlot::new(gfx, frame)?;
        self.phases.reset(frame);
        log::warn!("frame {frame} aborted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_writes_only_between_wait_and_submit() {
        let mut tracker = FramePhaseTracker::default();
        let frame = FrameLabel::A;
        assert!(!tracker.cpu_writable(frame));

        tracker.on_wait(frame);
        assert!(tracker.cpu_writable(frame));
        tracker.on_acquire(frame);
        assert!(tracker.cpu_writable(frame));
        tracker.on_record(frame);
        assert!(!tracker.cpu_writable(frame));
        tracker.on_submit(frame);
        assert!(!tracker.cpu_writable(frame));

        // 另一个 slot 互不影响
        assert_eq!(tracker.phase(FrameLabel::B), FramePhase::Idle);
    }

    #[test]
    fn write_permit_follows_the_fence() {
        let mut tracker = FramePhaseTracker::default();
        let frame = FrameLabel::B;
        assert!(tracker.writable(frame).is_err());

        tracker.on_wait(frame);
        assert_eq!(tracker.writable(frame).unwrap().frame(), FrameLabel::B);
        tracker.on_acquire(frame);
        assert!(tracker.writable(frame).is_ok());
    }

    #[test]
    fn upload_is_refused_while_recording_or_in_flight() {
        let mut tracker = FramePhaseTracker::default();
        let frame = FrameLabel::A;
        tracker.on_wait(frame);
        tracker.on_acquire(frame);

        tracker.on_record(frame);
        let err = tracker.writable(frame).unwrap_err();
        assert!(matches!(
            &err,
            RenderError::FrameNotWritable { phase, .. } if phase == "Recording"
        ));

        tracker.on_submit(frame);
        let err = tracker.writable(frame).unwrap_err();
        assert_eq!(err.to_string(), "frame A is not writable in phase Submitted");

        // 下一次 wait 之后重新可写
        tracker.on_wait(frame);
        assert!(tracker.writable(frame).is_ok());
    }

    #[test]
    fn aborted_frame_is_not_writable() {
        let mut tracker = FramePhaseTracker::default();
        tracker.on_wait(FrameLabel::A);
        tracker.reset(FrameLabel::A);
        assert!(tracker.writable(FrameLabel::A).is_err());
    }

    #[test]
    fn slots_are_independent_across_frames() {
        let mut tracker = FramePhaseTracker::default();
        for frame in [FrameLabel::A, FrameLabel::B, FrameLabel::A] {
            tracker.on_wait(frame);
            tracker.on_acquire(frame);
            tracker.on_record(frame);
            tracker.on_submit(frame);
        }
        assert_eq!(tracker.phase(FrameLabel::A), FramePhase::Submitted);
        assert_eq!(tracker.phase(FrameLabel::B), FramePhase::Submitted);
    }
}
