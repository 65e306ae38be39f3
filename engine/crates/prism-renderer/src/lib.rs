//! 渲染器：在 render graph 上按固定顺序注册所有 pass
//!
//! ```text
//! Culling → ClusterBuild(按需) → ClusterCull → Shadow×4 → Geometry(+Skybox)
//!   → TAA(可选) → SSAO → SSAOBlur → Bloom → BloomBlur → Composite → FXAA | FinalCopy
//! ```
//!
//! UI pass 由 `prism-gui-backend` 追加在最后。

pub mod camera_math;
pub mod environment;
pub mod frame_data;
pub mod passes;
pub mod render_targets;
pub mod renderer;
pub mod ui_params;
