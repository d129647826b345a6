//! # 尺寸规划
//!
//! 超大像素量的原图先按像素总量开方缩放到约 200 万像素（激进预缩），
//! 同时按宽高上限等比收敛：两者取更小的缩放比，受限边取上限值，
//! 另一边由原始宽高比向下取整。
//! 所有结果至少为 1 像素。

/// 触发预缩的像素总量阈值。
pub const PRE_SHRINK_PIXEL_LIMIT: u64 = 2_000_000;

/// 规划结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDimensions {
    pub width: u32,
    pub height: u32,
    /// 是否触发了超大图预缩。
    pub pre_shrunk: bool,
}

/// 根据原始尺寸与宽高上限计算目标尺寸（保持宽高比）。
///
/// # 示例
/// ```rust
/// use critique_payload::image_pipeline::plan_dimensions;
///
/// let target = plan_dimensions(4000, 3000, 800, 1000);
/// assert!(target.pre_shrunk);
/// assert_eq!(target.width, 800);
/// ```
pub fn plan_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> TargetDimensions {
    let width = width.max(1);
    let height = height.max(1);

    let pixels = width as u64 * height as u64;
    let pre_shrunk = pixels > PRE_SHRINK_PIXEL_LIMIT;

    let box_scale = (max_width.max(1) as f64 / width as f64).min(max_height.max(1) as f64 / height as f64);
    let pre_scale = (PRE_SHRINK_PIXEL_LIMIT as f64 / pixels as f64).sqrt();

    // 两个约束只取更紧的一个，且都从原始尺寸一次取整。
    let (width, height) = if pre_shrunk && pre_scale < box_scale {
        (scale_dimension(width, pre_scale), scale_dimension(height, pre_scale))
    } else {
        fit_within(width, height, max_width, max_height)
    };

    TargetDimensions {
        width,
        height,
        pre_shrunk,
    }
}

/// 等比收敛到 `max_width × max_height` 框内；已在框内时原样返回。
pub(crate) fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let width = width.max(1);
    let height = height.max(1);
    let max_width = max_width.max(1);
    let max_height = max_height.max(1);

    // 受限边用整数交叉相乘判断，结果不受浮点舍入影响。
    if width <= max_width && height <= max_height {
        (width, height)
    } else if max_width as u64 * height as u64 <= max_height as u64 * width as u64 {
        let scaled = (height as u64 * max_width as u64 / width as u64).max(1);
        (max_width, scaled as u32)
    } else {
        let scaled = (width as u64 * max_height as u64 / height as u64).max(1);
        (scaled as u32, max_height)
    }
}

/// `floor(value * scale)`，下限 1。
pub(crate) fn scale_dimension(value: u32, scale: f64) -> u32 {
    ((value as f64 * scale).floor() as u32).max(1)
}
