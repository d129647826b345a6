//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义应用级 `AppError`，CLI 与上层服务统一返回 `Result<T, AppError>`，
//! 流水线错误通过 `From` 直接转换，不再手动 map。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - `code()` / `stage()` 与 `ImageError` 保持同一套稳定字符串，便于结构化输出。
//! - 实现 `Serialize` 将错误序列化为字符串。

use serde::Serialize;

use crate::image_pipeline::ImageError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 图片载荷流水线错误（加载 / 解码 / 压缩 / 校验 / 上传）
    #[error("{0}")]
    Image(#[from] ImageError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 设置文件或命令行参数无效
    #[error("设置无效: {0}")]
    Settings(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Image(err) => err.code(),
            Self::Io(_) => "E_IO",
            Self::Settings(_) => "E_SETTINGS",
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::Image(err) => err.stage(),
            Self::Io(_) => "output",
            Self::Settings(_) => "config",
        }
    }
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
