/// debug label 使用的颜色
pub struct LabelColor;
impl LabelColor {
    const RED: glam::Vec4 = glam::vec4(1.0, 0.0, 0.0, 1.0);
    const GREEN: glam::Vec4 = glam::vec4(0.0, 1.0, 0.0, 1.0);
    const BLUE: glam::Vec4 = glam::vec4(0.0, 0.0, 1.0, 1.0);
    const YELLOW: glam::Vec4 = glam::vec4(1.0, 1.0, 0.0, 1.0);
    const MAGENTA: glam::Vec4 = glam::vec4(1.0, 0.0, 1.0, 1.0);

    /// render graph 中的一个 pass
    pub const COLOR_PASS: glam::Vec4 = Self::BLUE;
    /// 一帧中的一个阶段，例如 upload、graph execute
    pub const COLOR_STAGE: glam::Vec4 = Self::YELLOW;
    /// 单个命令
    pub const COLOR_CMD: glam::Vec4 = Self::GREEN;
    /// 一次性提交的命令，例如资源上传
    pub const COLOR_UPLOAD: glam::Vec4 = Self::MAGENTA;
    /// 出错之后插入的标记
    pub const COLOR_ERROR: glam::Vec4 = Self::RED;
}
