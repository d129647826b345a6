//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载载荷流水线中的所有失败来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! - 加载阶段：`Network / Timeout / FileSystem / InvalidFormat / ResourceLimit`
//! - 解码阶段：`Decode`
//! - 压缩阶段：`Raster / Encode / CompressionExhausted`
//! - 校验阶段：`PayloadTooLarge / UnsupportedFormat`
//! - 投递阶段：`Upload`
//!
//! `code()` 与 `stage()` 为稳定字符串，供 CLI 与上层服务做结构化输出。

/// 载荷流水线统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("网络错误：{0}")]
    Network(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("配置错误：{0}")]
    InvalidSettings(String),

    /// 源字节无法解码为位图。
    #[error("解码错误：{0}")]
    Decode(String),

    /// 无法获取目标尺寸的绘制画布。
    #[error("画布错误：{0}")]
    Raster(String),

    /// 单次编码失败，仅在收敛循环预算耗尽且从未产出字节时才会上抛。
    #[error("编码错误：{0}")]
    Encode(String),

    #[error(
        "压缩失败：{attempts} 次尝试后体积仍为 {last_size} 字节（上限：{limit} 字节）"
    )]
    CompressionExhausted {
        last_size: u64,
        limit: u64,
        attempts: u32,
    },

    #[error("载荷过大：{size} 字节（上限：{limit} 字节）")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("不支持的载荷格式：{0}")]
    UnsupportedFormat(String),

    #[error("上传失败：{0}")]
    Upload(String),
}

impl ImageError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::FileSystem(_) => "E_FILE",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::InvalidSettings(_) => "E_SETTINGS",
            Self::Decode(_) => "E_DECODE",
            Self::Raster(_) => "E_RASTER",
            Self::Encode(_) => "E_ENCODE",
            Self::CompressionExhausted { .. } => "E_COMPRESSION_EXHAUSTED",
            Self::PayloadTooLarge { .. } => "E_PAYLOAD_TOO_LARGE",
            Self::UnsupportedFormat(_) => "E_UNSUPPORTED_FORMAT",
            Self::Upload(_) => "E_UPLOAD",
        }
    }

    /// 出错所在的流水线阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Network(_)
            | Self::Timeout(_)
            | Self::FileSystem(_)
            | Self::InvalidFormat(_)
            | Self::ResourceLimit(_) => "load",
            Self::InvalidSettings(_) => "config",
            Self::Decode(_) => "decode",
            Self::Raster(_) | Self::Encode(_) | Self::CompressionExhausted { .. } => "compress",
            Self::PayloadTooLarge { .. } | Self::UnsupportedFormat(_) => "validate",
            Self::Upload(_) => "upload",
        }
    }
}
