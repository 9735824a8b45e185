// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod cli; // 命令行参数
pub mod config; // YAML配置
pub mod detection; // 检测器、结果归一化
pub mod error; // 错误类型
pub mod input; // 视频解码/编码、摄像头
pub mod models; // 模型接口与具体实现
pub mod ort_backend; // ONNX Runtime 推理后端
pub mod report; // JSON 报告
pub mod signal; // Ctrl-C 中断标志
pub mod viewer; // 显示窗口
pub mod visualizer; // 检测框绘制

pub use crate::config::{ClassCatalog, Config};
pub use crate::detection::{DetectionResult, Detector, RawDetection, RawOutput, VideoStats};
pub use crate::error::{DetectError, Result};
pub use crate::models::{InferenceParams, Model, YOLOv8, YOLOv8Config};
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
pub use crate::visualizer::Visualizer;

/// 按类别的非极大值抑制, 结果按置信度降序
pub fn non_max_suppression(xs: &mut Vec<RawDetection>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].class_id != xs[index].class_id {
                continue;
            }
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nms_keeps_highest() {
        let mut xs = vec![
            RawDetection::new([0., 0., 10., 10.], 0, 0.6),
            RawDetection::new([1., 0., 11., 10.], 0, 0.9),
            RawDetection::new([50., 50., 60., 60.], 0, 0.7),
        ];
        non_max_suppression(&mut xs, 0.45);
        assert_eq!(xs.len(), 2);
        assert_eq!(xs[0].confidence, 0.9);
        assert_eq!(xs[1].confidence, 0.7);
    }

    #[test]
    fn test_nms_is_class_aware() {
        let mut xs = vec![
            RawDetection::new([0., 0., 10., 10.], 0, 0.9),
            RawDetection::new([0., 0., 10., 10.], 3, 0.8),
        ];
        non_max_suppression(&mut xs, 0.45);
        assert_eq!(xs.len(), 2);
    }

    #[test]
    fn test_nms_threshold_one_keeps_all() {
        let mut xs = vec![
            RawDetection::new([0., 0., 10., 10.], 0, 0.9),
            RawDetection::new([0., 0., 10., 10.], 0, 0.8),
        ];
        non_max_suppression(&mut xs, 1.0);
        assert_eq!(xs.len(), 2);
    }
}
