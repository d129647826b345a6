use std::fs;
use std::path::Path;

use crate::error::AppError;
use crate::image_pipeline::CompressionOverrides;

/// 从 JSON 文件读取压缩覆盖项。
pub fn read_overrides(path: &Path) -> Result<CompressionOverrides, AppError> {
    let content = fs::read_to_string(path)?;

    serde_json::from_str::<CompressionOverrides>(&content)
        .map_err(|e| AppError::Settings(format!("解析设置文件失败: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_partial_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"quality": 0.6, "max_attempts": 3}"#).expect("write");

        let overrides = read_overrides(&path).expect("read overrides");

        assert_eq!(overrides.quality, Some(0.6));
        assert_eq!(overrides.max_attempts, Some(3));
        assert_eq!(overrides.max_width, None);
    }

    #[test]
    fn unknown_keys_are_settings_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"max_widht": 10}"#).expect("write");

        assert!(matches!(read_overrides(&path), Err(AppError::Settings(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");

        assert!(matches!(
            read_overrides(&dir.path().join("nope.json")),
            Err(AppError::Io(_))
        ));
    }
}
