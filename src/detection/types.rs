// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测系统数据结构定义
/// Data structures for the detection system
use std::collections::BTreeMap;

use serde::Serialize;

// ========== 模型原始输出 ==========

/// 单个原始检测框 (模型 → 归一化器)
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x_min, y_min, x_max, y_max (原图像素坐标)
    pub class_id: usize,
    pub confidence: f32,
}

impl RawDetection {
    pub fn new(bbox: [f32; 4], class_id: usize, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            confidence,
        }
    }

    pub fn width(&self) -> f32 {
        (self.bbox[2] - self.bbox[0]).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bbox[3] - self.bbox[1]).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn intersection_area(&self, another: &RawDetection) -> f32 {
        let l = self.bbox[0].max(another.bbox[0]);
        let r = self.bbox[2].min(another.bbox[2]);
        let t = self.bbox[1].max(another.bbox[1]);
        let b = self.bbox[3].min(another.bbox[3]);
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn iou(&self, another: &RawDetection) -> f32 {
        let inter = self.intersection_area(another);
        let union = self.area() + another.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// 单张图片的原始推理输出
///
/// `boxes == None` 表示模型没有给出任何检测框
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawOutput {
    pub boxes: Option<Vec<RawDetection>>,
}

impl RawOutput {
    pub fn new(boxes: Vec<RawDetection>) -> Self {
        Self {
            boxes: if boxes.is_empty() { None } else { Some(boxes) },
        }
    }

    pub fn empty() -> Self {
        Self { boxes: None }
    }

    pub fn len(&self) -> usize {
        self.boxes.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ========== 归一化结果 ==========

/// 单张图片/单帧的检测结果
///
/// boxes / labels / confidences 长度一致且等于 count
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DetectionResult {
    boxes: Vec<[f32; 4]>,
    labels: Vec<String>,
    confidences: Vec<f32>,
    count: usize,
}

impl DetectionResult {
    pub(crate) fn from_parts(
        boxes: Vec<[f32; 4]>,
        labels: Vec<String>,
        confidences: Vec<f32>,
    ) -> Self {
        debug_assert!(boxes.len() == labels.len() && labels.len() == confidences.len());
        let count = boxes.len();
        Self {
            boxes,
            labels,
            confidences,
            count,
        }
    }

    pub fn boxes(&self) -> &[[f32; 4]] {
        &self.boxes
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn confidences(&self) -> &[f32] {
        &self.confidences
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 按 (box, label, confidence) 遍历
    pub fn detections(&self) -> impl Iterator<Item = (&[f32; 4], &str, f32)> + '_ {
        self.boxes
            .iter()
            .zip(self.labels.iter())
            .zip(self.confidences.iter())
            .map(|((b, l), c)| (b, l.as_str(), *c))
    }

    /// 各类别数量分布
    pub fn class_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for label in &self.labels {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// 视频统计
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VideoStats {
    pub frames: usize,
    pub total_detections: usize,
    pub avg_detections_per_frame: f64,
}

impl VideoStats {
    pub fn new(frames: usize, total_detections: usize) -> Self {
        let avg_detections_per_frame = if frames > 0 {
            total_detections as f64 / frames as f64
        } else {
            0.0
        };
        Self {
            frames,
            total_detections,
            avg_detections_per_frame,
        }
    }

    /// 累计一帧
    pub fn record(&mut self, detections: usize) {
        *self = Self::new(self.frames + 1, self.total_detections + detections);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_stats_no_frames() {
        let stats = VideoStats::new(0, 0);
        assert_eq!(stats.frames, 0);
        assert_eq!(stats.avg_detections_per_frame, 0.0);
        assert_eq!(VideoStats::default(), stats);
    }

    #[test]
    fn test_video_stats_record() {
        let mut stats = VideoStats::default();
        for n in [2, 0, 1] {
            stats.record(n);
        }
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.total_detections, 3);
        assert!((stats.avg_detections_per_frame - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_iou() {
        let a = RawDetection::new([0., 0., 10., 10.], 0, 0.9);
        let b = RawDetection::new([5., 0., 15., 10.], 0, 0.8);
        assert!((a.iou(&b) - 50. / 150.).abs() < 1e-6);
        assert_eq!(a.iou(&RawDetection::new([20., 20., 30., 30.], 0, 0.5)), 0.0);
    }

    #[test]
    fn test_class_counts() {
        let result = DetectionResult::from_parts(
            vec![[0.; 4]; 3],
            vec!["rider".into(), "with helmet".into(), "rider".into()],
            vec![0.9, 0.8, 0.7],
        );
        let counts = result.class_counts();
        assert_eq!(counts["rider"], 2);
        assert_eq!(counts["with helmet"], 1);
        assert_eq!(result.detections().count(), 3);
    }
}
