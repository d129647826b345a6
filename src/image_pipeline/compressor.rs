//! # 收敛压缩循环
//!
//! ## 设计思路
//!
//! 状态机：`Init → Attempting → Success | Exhausted`。
//!
//! - Init：确定输出格式与是否压平，规划初始尺寸。
//! - Attempting：栅格化并测量体积；超限时按 `min(0.8, sqrt(上限 / 体积))`
//!   同比缩小宽高，质量每轮下调 0.15，下限 0.4。
//! - Exhausted：尝试次数用尽后再做一次应急缩小（宽高各乘 0.7），
//!   仍超限则返回 `CompressionExhausted`，绝不返回超限载荷。
//!
//! ## 实现思路
//!
//! 单次编码失败视为本轮失败，按 0.8 步长继续下一轮；只有画布错误直接终止。
//! `compress_with_hooks` 在每轮结束时回调 `CompressionAttempt`，便于诊断与测试，
//! 记录本身不在循环外保留。

use bytes::Bytes;
use image::imageops::FilterType;

use super::planner::{plan_dimensions, scale_dimension};
use super::rasterizer::{RasterRequest, rasterize};
use super::source::{EncodedPayload, OutputMime, SourceImage};
use super::transparency::TRANSPARENCY_SAMPLE_SIZE;
use super::{CompressionSettings, ImageError};

/// 质量下限。
pub const QUALITY_FLOOR: f32 = 0.4;
/// 每轮质量下调量。
pub const QUALITY_STEP: f32 = 0.15;
/// 单轮缩放系数上限（每轮至少缩小 20%）。
pub const MAX_SCALE_STEP: f64 = 0.8;
/// 应急缩小系数。
pub const EMERGENCY_SCALE: f64 = 0.7;

/// 单轮尝试记录。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionAttempt {
    /// 从 1 开始的轮次。
    pub attempt: u32,
    pub width: u32,
    pub height: u32,
    pub quality: f32,
    /// 编码体积；本轮编码失败时为 `None`。
    pub size: Option<u64>,
    /// 是否为应急缩小轮。
    pub emergency: bool,
}

/// 收敛压缩器。
#[derive(Debug, Clone)]
pub struct Compressor {
    settings: CompressionSettings,
    filter: FilterType,
    sample_size: u32,
}

impl Compressor {
    pub fn new(settings: CompressionSettings) -> Self {
        Self {
            settings,
            filter: FilterType::Triangle,
            sample_size: TRANSPARENCY_SAMPLE_SIZE,
        }
    }

    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_sample_size(mut self, sample_size: u32) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn settings(&self) -> &CompressionSettings {
        &self.settings
    }

    /// 压缩到体积上限以内。
    ///
    /// # 示例
    /// ```rust
    /// use critique_payload::image_pipeline::{CompressionSettings, Compressor, SourceImage};
    /// use image::{DynamicImage, Rgb, RgbImage};
    ///
    /// let source = SourceImage::new(
    ///     DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([30, 60, 90]))),
    ///     "doc",
    /// );
    /// let payload = Compressor::new(CompressionSettings::default()).compress(&source)?;
    /// assert!(payload.size() <= CompressionSettings::default().max_size_bytes);
    /// # Ok::<(), critique_payload::image_pipeline::ImageError>(())
    /// ```
    pub fn compress(&self, source: &SourceImage) -> Result<EncodedPayload, ImageError> {
        self.compress_with_hooks(source, |_| {})
    }

    pub fn compress_with_hooks<F>(
        &self,
        source: &SourceImage,
        mut on_attempt: F,
    ) -> Result<EncodedPayload, ImageError>
    where
        F: FnMut(&CompressionAttempt),
    {
        let settings = &self.settings;
        let limit = settings.max_size_bytes;
        let (mime, flatten) = self.select_output(source);

        let planned = plan_dimensions(
            source.width(),
            source.height(),
            settings.max_width,
            settings.max_height,
        );

        log::debug!(
            "🧩 压缩规划：{}x{} -> {}x{}（预缩={}, 格式={}, 压平={}, 上限={} 字节）",
            source.width(),
            source.height(),
            planned.width,
            planned.height,
            planned.pre_shrunk,
            mime.as_str(),
            flatten,
            limit
        );

        let mut request = RasterRequest {
            width: planned.width,
            height: planned.height,
            flatten,
            mime,
            quality: settings.quality,
        };
        let mut last_size: Option<u64> = None;
        let mut last_error: Option<ImageError> = None;
        let mut attempts = 0;

        for attempt in 1..=settings.max_attempts {
            attempts = attempt;

            let measured = match self.attempt(source, &request, attempt, false, &mut on_attempt) {
                Ok(bytes) if bytes.len() as u64 <= limit => {
                    return Ok(self.finish(source, bytes, &request, attempts));
                }
                Ok(bytes) => {
                    let size = bytes.len() as u64;
                    last_size = Some(size);
                    Some(size)
                }
                Err(ImageError::Encode(message)) => {
                    last_error = Some(ImageError::Encode(message));
                    None
                }
                Err(err) => return Err(err),
            };

            if attempt < settings.max_attempts {
                // 编码失败没有体积可参考，按最大步长缩小。
                let (width, height, quality) = match measured {
                    Some(size) => next_parameters(request.width, request.height, request.quality, size, limit),
                    None => (
                        scale_dimension(request.width, MAX_SCALE_STEP),
                        scale_dimension(request.height, MAX_SCALE_STEP),
                        reduce_quality(request.quality),
                    ),
                };
                request = RasterRequest {
                    width,
                    height,
                    quality,
                    ..request
                };
            }
        }

        let emergency = RasterRequest {
            width: scale_dimension(request.width, EMERGENCY_SCALE),
            height: scale_dimension(request.height, EMERGENCY_SCALE),
            ..request
        };
        attempts += 1;

        log::warn!(
            "⚠️ 已用尽 {} 次尝试，执行应急缩小：{}x{} -> {}x{}",
            settings.max_attempts,
            request.width,
            request.height,
            emergency.width,
            emergency.height
        );

        match self.attempt(source, &emergency, attempts, true, &mut on_attempt) {
            Ok(bytes) if bytes.len() as u64 <= limit => {
                return Ok(self.finish(source, bytes, &emergency, attempts));
            }
            Ok(bytes) => last_size = Some(bytes.len() as u64),
            Err(ImageError::Encode(message)) => last_error = Some(ImageError::Encode(message)),
            Err(err) => return Err(err),
        }

        match last_size {
            Some(last_size) => {
                log::warn!(
                    "❌ 压缩未能收敛：最终 {} 字节（上限 {} 字节，共 {} 次）",
                    last_size,
                    limit,
                    attempts
                );
                Err(ImageError::CompressionExhausted {
                    last_size,
                    limit,
                    attempts,
                })
            }
            None => Err(last_error
                .unwrap_or_else(|| ImageError::Encode("未产出任何编码结果".to_string()))),
        }
    }

    /// 输出格式与是否压平。
    ///
    /// - 强制不透明：JPEG，检测到透明时压平
    /// - 否则透明图输出 PNG（按 `flatten_alpha` 决定是否压平），不透明图输出 JPEG
    fn select_output(&self, source: &SourceImage) -> (OutputMime, bool) {
        let transparent = source.has_transparency(self.sample_size);

        if self.settings.force_opaque_format {
            (OutputMime::Jpeg, transparent)
        } else if transparent {
            (OutputMime::Png, self.settings.flatten_alpha)
        } else {
            (OutputMime::Jpeg, false)
        }
    }

    fn attempt<F>(
        &self,
        source: &SourceImage,
        request: &RasterRequest,
        attempt: u32,
        emergency: bool,
        on_attempt: &mut F,
    ) -> Result<Vec<u8>, ImageError>
    where
        F: FnMut(&CompressionAttempt),
    {
        let result = rasterize(source.image(), request, self.filter);

        let size = match &result {
            Ok(bytes) => Some(bytes.len() as u64),
            Err(ImageError::Encode(message)) => {
                log::warn!("⚠️ 第 {} 次编码失败，继续收敛：{}", attempt, message);
                None
            }
            Err(_) => return result,
        };

        log::debug!(
            "🔁 第 {} 次尝试：{}x{} q={:.2} -> {:?} 字节{}",
            attempt,
            request.width,
            request.height,
            request.quality,
            size,
            if emergency { "（应急）" } else { "" }
        );

        on_attempt(&CompressionAttempt {
            attempt,
            width: request.width,
            height: request.height,
            quality: request.quality,
            size,
            emergency,
        });

        result
    }

    fn finish(
        &self,
        source: &SourceImage,
        bytes: Vec<u8>,
        request: &RasterRequest,
        attempts: u32,
    ) -> EncodedPayload {
        log::info!(
            "✅ 压缩完成 - {}x{} -> {}x{} {} {} 字节（上限 {} 字节，{} 次）",
            source.width(),
            source.height(),
            request.width,
            request.height,
            request.mime.as_str(),
            bytes.len(),
            self.settings.max_size_bytes,
            attempts
        );

        EncodedPayload {
            bytes: Bytes::from(bytes),
            mime: request.mime,
            width: request.width,
            height: request.height,
            original_width: source.width(),
            original_height: source.height(),
            attempts,
        }
    }
}

/// 根据超限比例计算下一轮参数。
pub(crate) fn next_parameters(
    width: u32,
    height: u32,
    quality: f32,
    size: u64,
    limit: u64,
) -> (u32, u32, f32) {
    let scale = (limit as f64 / size as f64).sqrt().min(MAX_SCALE_STEP);

    (
        scale_dimension(width, scale),
        scale_dimension(height, scale),
        reduce_quality(quality),
    )
}

fn reduce_quality(quality: f32) -> f32 {
    if quality <= QUALITY_FLOOR {
        quality
    } else {
        (quality - QUALITY_STEP).max(QUALITY_FLOOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noise_source(width: u32, height: u32) -> SourceImage {
        let mut rng = StdRng::seed_from_u64(42);
        let img = RgbImage::from_fn(width, height, |_, _| {
            Rgb([
                rng.gen_range(0..=255),
                rng.gen_range(0..=255),
                rng.gen_range(0..=255),
            ])
        });
        SourceImage::new(DynamicImage::ImageRgb8(img), "test")
    }

    fn gradient_source(width: u32, height: u32) -> SourceImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        SourceImage::new(DynamicImage::ImageRgb8(img), "test")
    }

    fn half_transparent_source(width: u32, height: u32) -> SourceImage {
        let img = RgbaImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgba([20, 40, 200, 0])
            } else {
                Rgba([20, 40, 200, 255])
            }
        });
        SourceImage::new(DynamicImage::ImageRgba8(img), "test")
    }

    fn settings_with(max_size_bytes: u64) -> CompressionSettings {
        CompressionSettings {
            max_size_bytes,
            ..CompressionSettings::default()
        }
    }

    #[test]
    fn next_parameters_scale_by_size_ratio() {
        let (width, height, quality) = next_parameters(1000, 800, 0.8, 4_000, 1_000);

        assert_eq!((width, height), (500, 400));
        assert!((quality - 0.65).abs() < 1e-6);
    }

    #[test]
    fn next_parameters_shrink_at_least_twenty_percent() {
        let (width, height, _) = next_parameters(1000, 800, 0.8, 1_100, 1_000);

        assert_eq!((width, height), (800, 640));
    }

    #[test]
    fn quality_never_drops_below_floor() {
        let (_, _, quality) = next_parameters(100, 100, 0.45, 2_000, 1_000);
        assert!((quality - QUALITY_FLOOR).abs() < 1e-6);

        let (_, _, already_low) = next_parameters(100, 100, 0.3, 2_000, 1_000);
        assert!((already_low - 0.3).abs() < 1e-6);
    }

    #[test]
    fn small_opaque_image_passes_in_single_attempt() {
        let source = gradient_source(320, 240);
        let mut seen = Vec::new();

        let payload = Compressor::new(CompressionSettings::default())
            .compress_with_hooks(&source, |attempt| seen.push(*attempt))
            .expect("compress should succeed");

        assert_eq!(payload.attempts, 1);
        assert_eq!(seen.len(), 1);
        assert_eq!((payload.width, payload.height), (320, 240));
        assert_eq!(payload.mime, OutputMime::Jpeg);
        assert!((seen[0].quality - CompressionSettings::default().quality).abs() < 1e-6);
    }

    #[test]
    fn tight_budget_converges_with_decreasing_sizes() {
        let source = noise_source(600, 600);
        let limit = 40_000;
        let mut seen = Vec::new();

        let payload = Compressor::new(settings_with(limit))
            .compress_with_hooks(&source, |attempt| seen.push(*attempt))
            .expect("compress should converge");

        assert!(payload.size() <= limit);
        assert!(seen.len() >= 2);
        assert!(seen[1].quality < seen[0].quality);

        let sizes: Vec<u64> = seen.iter().filter_map(|a| a.size).collect();
        assert!(sizes.windows(2).all(|pair| pair[1] < pair[0]), "sizes {sizes:?}");
    }

    #[test]
    fn unreachable_budget_is_exhausted_after_emergency_pass() {
        let source = noise_source(400, 400);
        let settings = settings_with(512);
        let mut seen = Vec::new();

        let result = Compressor::new(settings.clone())
            .compress_with_hooks(&source, |attempt| seen.push(*attempt));

        match result {
            Err(ImageError::CompressionExhausted {
                last_size,
                limit,
                attempts,
            }) => {
                assert!(last_size > 512);
                assert_eq!(limit, 512);
                assert_eq!(attempts, settings.max_attempts + 1);
            }
            other => panic!("expected CompressionExhausted, got {other:?}"),
        }

        assert_eq!(seen.len() as u32, settings.max_attempts + 1);
        let last = seen.last().expect("emergency attempt recorded");
        let before = seen[seen.len() - 2];
        assert!(last.emergency);
        assert_eq!(last.width, scale_dimension(before.width, EMERGENCY_SCALE));
    }

    #[test]
    fn forced_opaque_output_has_no_alpha() {
        let source = half_transparent_source(120, 80);

        let payload = Compressor::new(CompressionSettings::default())
            .compress(&source)
            .expect("compress should succeed");

        assert_eq!(payload.mime, OutputMime::Jpeg);
        let decoded = image::load_from_memory(&payload.bytes).expect("decode output");
        assert!(decoded.to_rgba8().pixels().all(|p| p.0[3] == 255));
        let left = decoded.to_rgb8().get_pixel(5, 40).0;
        assert!(left.iter().all(|&c| c > 240), "transparent area should be white: {left:?}");
    }

    #[test]
    fn unforced_transparent_source_becomes_png() {
        let source = half_transparent_source(60, 40);

        let keep_alpha = CompressionSettings {
            force_opaque_format: false,
            flatten_alpha: false,
            ..CompressionSettings::default()
        };
        let payload = Compressor::new(keep_alpha).compress(&source).expect("compress");
        assert_eq!(payload.mime, OutputMime::Png);
        let decoded = image::load_from_memory(&payload.bytes).expect("decode");
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0).0[3], 0);

        let flatten = CompressionSettings {
            force_opaque_format: false,
            flatten_alpha: true,
            ..CompressionSettings::default()
        };
        let payload = Compressor::new(flatten).compress(&source).expect("compress");
        assert_eq!(payload.mime, OutputMime::Png);
        let decoded = image::load_from_memory(&payload.bytes).expect("decode");
        assert!(!decoded.color().has_alpha());
        assert_eq!(decoded.dimensions(), (60, 40));
    }

    #[test]
    fn default_filter_matches_pipeline_config() {
        let compressor = Compressor::new(CompressionSettings::default());

        assert_eq!(compressor.filter, crate::image_pipeline::PipelineConfig::default().resize_filter);
        assert_eq!(compressor.filter, FilterType::Triangle);
    }
}
