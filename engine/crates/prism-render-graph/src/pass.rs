use prism_gfx::commands::command_buffer::GfxCommandBuffer;

use crate::resource_state::RgAccess;

/// pass 的类型决定了读写资源所需要的 layout
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PassKind {
    /// 写入的资源作为 attachment，开启 dynamic rendering
    Raster,
    /// 写入的资源作为 storage image
    Compute,
    /// blit/copy：读为 TRANSFER_SRC，写为 TRANSFER_DST
    Transfer,
}
impl PassKind {
    #[inline]
    pub fn read_access(self) -> RgAccess {
        match self {
            Self::Raster | Self::Compute => RgAccess::ShaderRead,
            Self::Transfer => RgAccess::TransferRead,
        }
    }

    #[inline]
    pub fn write_access(self, is_depth: bool) -> RgAccess {
        match self {
            Self::Raster if is_depth => RgAccess::DepthAttachment,
            Self::Raster => RgAccess::ColorAttachment,
            Self::Compute => RgAccess::StorageWrite,
            Self::Transfer => RgAccess::TransferWrite,
        }
    }
}

/// 录制回调，在 `RenderGraph::execute` 中同步调用
pub type RgPassCallback<'a> = Box<dyn FnOnce(&GfxCommandBuffer) -> anyhow::Result<()> + 'a>;

/// pass 的声明：名字、读写的资源以及是否清除输出
#[derive(Clone, Debug)]
pub struct RgPassDesc {
    pub name: String,
    pub kind: PassKind,
    pub reads: Vec<String>,
    pub writes: Vec<String>,
    /// true 时 attachment 的 loadOp 为 CLEAR，否则为 LOAD
    pub clear_outputs: bool,
}
// new & init
impl RgPassDesc {
    pub fn new(name: impl Into<String>, kind: PassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            reads: vec![],
            writes: vec![],
            clear_outputs: false,
        }
    }

    #[inline]
    pub fn raster(name: impl Into<String>) -> Self {
        Self::new(name, PassKind::Raster)
    }

    #[inline]
    pub fn compute(name: impl Into<String>) -> Self {
        Self::new(name, PassKind::Compute)
    }

    #[inline]
    pub fn transfer(name: impl Into<String>) -> Self {
        Self::new(name, PassKind::Transfer)
    }
}
// builder
impl RgPassDesc {
    #[inline]
    pub fn read(mut self, resource: impl Into<String>) -> Self {
        self.reads.push(resource.into());
        self
    }

    #[inline]
    pub fn write(mut self, resource: impl Into<String>) -> Self {
        self.writes.push(resource.into());
        self
    }

    #[inline]
    pub fn clear_outputs(mut self, clear: bool) -> Self {
        self.clear_outputs = clear;
        self
    }
}
