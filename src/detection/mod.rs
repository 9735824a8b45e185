// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测系统 (Detection System)
///
/// - types: 原始输出 / 检测结果 / 视频统计
/// - normalizer: 原始输出 → DetectionResult
/// - detector: 检测器门面, 图片/批量/视频/摄像头入口
pub mod detector;
pub mod normalizer;
pub mod types;

pub use detector::Detector;
pub use normalizer::normalize;
pub use types::{DetectionResult, RawDetection, RawOutput, VideoStats};
