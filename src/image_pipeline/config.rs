//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中管理，分为两层：
//! - `PipelineConfig`：进程级运行配置（加载限制、网络策略、解码上限、交付上限）。
//! - `CompressionSettings`：单次压缩的不可变参数，由模型提供方预设与调用方覆盖项合并而来。
//!
//! 模型提供方（claude / openai）作为高层语义，映射到底层尺寸、质量与体积预算，
//! 与性能档位的做法一致。
//!
//! ## 实现思路
//!
//! - `VisionProvider::settings` 给出各提供方的默认预算。
//! - `CompressionSettings::merge` 合并覆盖项后统一校验，越界值直接报错而不是静默修正。
//! - `CompressionOverrides` 可由 JSON 反序列化，供 CLI 与上层服务注入。

use std::str::FromStr;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use super::ImageError;

pub const MIB: u64 = 1024 * 1024;

/// 单次压缩允许的最大尝试次数上限（不含应急缩小）。
pub const MAX_ATTEMPTS_LIMIT: u32 = 16;

/// 视觉模型提供方。
///
/// - `Claude`：更紧的尺寸与体积预算
/// - `OpenAi`：允许更大的画幅与更高质量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisionProvider {
    #[serde(rename = "claude")]
    Claude,
    #[serde(rename = "openai")]
    OpenAi,
}

impl VisionProvider {
    /// 将提供方输出为稳定字符串。
    ///
    /// # 示例
    /// ```rust
    /// use critique_payload::image_pipeline::VisionProvider;
    ///
    /// assert_eq!(VisionProvider::OpenAi.as_str(), "openai");
    /// ```
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::OpenAi => "openai",
        }
    }

    /// 该提供方的默认压缩预算。
    pub fn settings(self) -> CompressionSettings {
        match self {
            Self::Claude => CompressionSettings {
                max_width: 800,
                max_height: 1000,
                quality: 0.7,
                max_size_bytes: 4 * MIB,
                force_opaque_format: true,
                flatten_alpha: true,
                max_attempts: 5,
            },
            Self::OpenAi => CompressionSettings {
                max_width: 1200,
                max_height: 1600,
                quality: 0.8,
                max_size_bytes: 5 * MIB,
                force_opaque_format: true,
                flatten_alpha: true,
                max_attempts: 5,
            },
        }
    }
}

impl FromStr for VisionProvider {
    type Err = ImageError;

    /// 从外部字符串解析提供方。
    fn from_str(provider: &str) -> Result<Self, Self::Err> {
        match provider.trim().to_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Self::Claude),
            "openai" | "gpt" => Ok(Self::OpenAi),
            other => Err(ImageError::InvalidSettings(format!(
                "未知模型提供方：{}（可选：claude / openai）",
                other
            ))),
        }
    }
}

/// 单次压缩参数（合并后不可变）。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionSettings {
    /// 输出宽度上限（像素）。
    pub max_width: u32,
    /// 输出高度上限（像素）。
    pub max_height: u32,
    /// 有损编码质量，取值 `[0, 1]`。
    pub quality: f32,
    /// 载荷体积硬上限（字节）。
    pub max_size_bytes: u64,
    /// 强制输出不透明 JPEG。
    pub force_opaque_format: bool,
    /// 未强制 JPEG 时，透明图是否仍压平到白底后再输出 PNG。
    pub flatten_alpha: bool,
    /// 收敛循环最大尝试次数（不含应急缩小）。
    pub max_attempts: u32,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        VisionProvider::Claude.settings()
    }
}

impl CompressionSettings {
    /// 合并调用方覆盖项并校验。
    ///
    /// 未提供的字段沿用当前值；任一字段越界时返回错误，不做静默修正。
    ///
    /// # 示例
    /// ```rust
    /// use critique_payload::image_pipeline::{CompressionOverrides, CompressionSettings};
    ///
    /// let overrides = CompressionOverrides {
    ///     quality: Some(0.6),
    ///     ..Default::default()
    /// };
    /// let merged = CompressionSettings::default().merge(&overrides)?;
    /// assert_eq!(merged.quality, 0.6);
    /// # Ok::<(), critique_payload::image_pipeline::ImageError>(())
    /// ```
    pub fn merge(&self, overrides: &CompressionOverrides) -> Result<Self, ImageError> {
        let merged = Self {
            max_width: overrides.max_width.unwrap_or(self.max_width),
            max_height: overrides.max_height.unwrap_or(self.max_height),
            quality: overrides.quality.unwrap_or(self.quality),
            max_size_bytes: overrides.max_size_bytes.unwrap_or(self.max_size_bytes),
            force_opaque_format: overrides
                .force_opaque_format
                .unwrap_or(self.force_opaque_format),
            flatten_alpha: overrides.flatten_alpha.unwrap_or(self.flatten_alpha),
            max_attempts: overrides.max_attempts.unwrap_or(self.max_attempts),
        };

        merged.validate()?;
        Ok(merged)
    }

    /// 校验参数取值范围。
    pub fn validate(&self) -> Result<(), ImageError> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(ImageError::InvalidSettings(format!(
                "尺寸上限必须大于 0（当前：{}x{}）",
                self.max_width, self.max_height
            )));
        }
        if !self.quality.is_finite() || !(0.0..=1.0).contains(&self.quality) {
            return Err(ImageError::InvalidSettings(format!(
                "quality 必须在 0~1 之间（当前：{}）",
                self.quality
            )));
        }
        if self.max_size_bytes == 0 {
            return Err(ImageError::InvalidSettings("max_size_bytes 必须大于 0".to_string()));
        }
        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&self.max_attempts) {
            return Err(ImageError::InvalidSettings(format!(
                "max_attempts 必须在 1~{} 之间（当前：{}）",
                MAX_ATTEMPTS_LIMIT, self.max_attempts
            )));
        }

        Ok(())
    }
}

/// 调用方覆盖项（全部可选）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionOverrides {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub quality: Option<f32>,
    pub max_size_bytes: Option<u64>,
    pub force_opaque_format: Option<bool>,
    pub flatten_alpha: Option<bool>,
    pub max_attempts: Option<u32>,
}

/// 流水线运行配置。
///
/// 字段覆盖了加载、解码、采样与交付校验四个阶段。
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 下载/读取原始字节时允许的最大文件体积（字节）。
    pub max_file_size: u64,
    /// 网络请求总超时（秒）。
    pub download_timeout: u64,
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub connect_timeout: u64,
    /// 下载首包超时时间（毫秒）。
    pub stream_first_byte_timeout_ms: u64,
    /// 下载分块读取超时时间（毫秒）。
    pub stream_chunk_timeout_ms: u64,
    /// 最大重定向次数。
    pub max_redirects: usize,
    /// 是否允许访问内网或本地地址（默认关闭，防 SSRF）。
    pub allow_private_network: bool,
    /// 是否对域名执行 DNS 解析后再做内网 IP 拦截。
    pub resolve_dns_for_url_safety: bool,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 缩放滤镜。
    pub resize_filter: FilterType,
    /// 透明度检测采样边长上限。
    pub transparency_sample_size: u32,
    /// 交付给视觉接口前的最终体积上限（字节）。
    pub handoff_ceiling_bytes: u64,
    /// 当前生效的模型提供方。
    pub provider: VisionProvider,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * MIB,
            download_timeout: 30,
            connect_timeout: 8,
            stream_first_byte_timeout_ms: 10_000,
            stream_chunk_timeout_ms: 15_000,
            max_redirects: 5,
            allow_private_network: false,
            resolve_dns_for_url_safety: true,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * MIB,
            resize_filter: FilterType::Triangle,
            transparency_sample_size: 100,
            handoff_ceiling_bytes: 5 * MIB,
            provider: VisionProvider::Claude,
        }
    }
}

impl PipelineConfig {
    /// 以当前提供方预设为底，合并覆盖项得到本次压缩参数。
    ///
    /// 体积预算不得超过交付上限，否则交付阶段必然失败。
    pub fn compression_settings(
        &self,
        overrides: &CompressionOverrides,
    ) -> Result<CompressionSettings, ImageError> {
        let settings = self.provider.settings().merge(overrides)?;

        if settings.max_size_bytes > self.handoff_ceiling_bytes {
            return Err(ImageError::InvalidSettings(format!(
                "max_size_bytes（{}）超过交付上限（{}）",
                settings.max_size_bytes, self.handoff_ceiling_bytes
            )));
        }

        Ok(settings)
    }

    pub fn network_policy(&self) -> NetworkPolicy {
        NetworkPolicy {
            allow_private_network: self.allow_private_network,
            resolve_dns_for_url_safety: self.resolve_dns_for_url_safety,
            download_timeout: self.download_timeout,
            connect_timeout: self.connect_timeout,
            stream_first_byte_timeout_ms: self.stream_first_byte_timeout_ms,
            stream_chunk_timeout_ms: self.stream_chunk_timeout_ms,
            max_redirects: self.max_redirects,
        }
    }

    pub fn apply_network_policy(&mut self, policy: &NetworkPolicy) {
        self.allow_private_network = policy.allow_private_network;
        self.resolve_dns_for_url_safety = policy.resolve_dns_for_url_safety;
        self.download_timeout = policy.download_timeout;
        self.connect_timeout = policy.connect_timeout;
        self.stream_first_byte_timeout_ms = policy.stream_first_byte_timeout_ms;
        self.stream_chunk_timeout_ms = policy.stream_chunk_timeout_ms;
        self.max_redirects = policy.max_redirects;
    }
}

/// 网络安全与超时策略（运行时可调整的子集）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPolicy {
    pub allow_private_network: bool,
    pub resolve_dns_for_url_safety: bool,
    pub download_timeout: u64,
    pub connect_timeout: u64,
    pub stream_first_byte_timeout_ms: u64,
    pub stream_chunk_timeout_ms: u64,
    pub max_redirects: usize,
}

impl NetworkPolicy {
    pub fn validate(&self) -> Result<(), ImageError> {
        if !(1..=300).contains(&self.download_timeout) {
            return Err(ImageError::InvalidSettings(
                "download_timeout 必须在 1~300 秒之间".to_string(),
            ));
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err(ImageError::InvalidSettings(
                "connect_timeout 必须在 1~120 秒之间".to_string(),
            ));
        }
        if !(500..=120_000).contains(&self.stream_first_byte_timeout_ms) {
            return Err(ImageError::InvalidSettings(
                "stream_first_byte_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if !(500..=120_000).contains(&self.stream_chunk_timeout_ms) {
            return Err(ImageError::InvalidSettings(
                "stream_chunk_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if self.max_redirects > 20 {
            return Err(ImageError::InvalidSettings(
                "max_redirects 不能超过 20".to_string(),
            ));
        }

        Ok(())
    }
}
