// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 错误类型
//!
//! 组件边界统一返回 `DetectError`; 模型/解码层内部使用 `anyhow`,
//! 到达 Detector 时统一包装为 `DetectError::Inference`.

use std::path::PathBuf;

pub type Result<T, E = DetectError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// 配置文件不存在 (启动时致命)
    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// 配置文件无法解析
    #[error("failed to parse config {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// 配置值非法 (阈值越界、类别表为空等)
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// 模型权重文件不存在 (构造时致命)
    #[error("model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    /// 模型输出的类别索引超出类别表, 说明配置与模型不匹配
    #[error("class index {index} is not in the class catalog ({len} classes), config and model do not match")]
    ClassLookup { index: usize, len: usize },

    /// 推理引擎/视频管线抛出的错误, 原样向上传递
    #[error("inference failed: {0:#}")]
    Inference(anyhow::Error),

    /// 输入既不是文件也不是目录
    #[error("{} is not a valid file or directory", .0.display())]
    InvalidSource(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}
