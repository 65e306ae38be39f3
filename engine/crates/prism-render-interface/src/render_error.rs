use std::path::PathBuf;

/// 渲染器中可以被识别的错误类型
///
/// 通常包裹在 `anyhow::Error` 中向上传递，需要时可以通过 `downcast_ref` 取回
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("asset missing: {}", .0.display())]
    AssetMissing(PathBuf),

    #[error("{what} exhausted (capacity {capacity})")]
    ResourceExhausted { what: &'static str, capacity: u32 },

    #[error("swapchain is out of date")]
    SwapchainOutOfDate,

    /// GPU 可能仍在读取该 slot 的 buffer，或者 command buffer 已经开始录制
    #[error("frame {frame} is not writable in phase {phase}")]
    FrameNotWritable { frame: String, phase: String },

    #[error("pass `{pass}` failed to record")]
    PassRecording {
        pass: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survives_anyhow_round_trip() {
        let err: anyhow::Error = RenderError::ResourceExhausted {
            what: "bindless textures",
            capacity: 16384,
        }
        .into();
        assert_eq!(err.to_string(), "bindless textures exhausted (capacity 16384)");
        assert!(matches!(err.downcast_ref::<RenderError>(), Some(RenderError::ResourceExhausted { .. })));
    }

    #[test]
    fn frame_not_writable_names_frame_and_phase() {
        let err = RenderError::FrameNotWritable {
            frame: "B".to_string(),
            phase: "Submitted".to_string(),
        };
        assert_eq!(err.to_string(), "frame B is not writable in phase Submitted");
    }

    #[test]
    fn pass_recording_keeps_source() {
        let err = RenderError::PassRecording {
            pass: "ssao".to_string(),
            source: anyhow::anyhow!("pipeline missing"),
        };
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("pipeline missing"));
    }
}
