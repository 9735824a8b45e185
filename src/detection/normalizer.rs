// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 结果归一化 (Normalizer)
//! 职责: RawOutput + ClassCatalog → DetectionResult
//!
//! 不做任何阈值过滤, 阈值与NMS已经在模型推理阶段完成.

use super::types::{DetectionResult, RawOutput};
use crate::config::ClassCatalog;
use crate::error::{DetectError, Result};

/// 将单张图片的原始输出整理为 DetectionResult
pub fn normalize(raw: &RawOutput, catalog: &ClassCatalog) -> Result<DetectionResult> {
    let Some(detections) = raw.boxes.as_ref() else {
        return Ok(DetectionResult::default());
    };

    let mut boxes = Vec::with_capacity(detections.len());
    let mut labels = Vec::with_capacity(detections.len());
    let mut confidences = Vec::with_capacity(detections.len());
    for det in detections {
        let label = catalog
            .get(det.class_id)
            .ok_or(DetectError::ClassLookup {
                index: det.class_id,
                len: catalog.len(),
            })?;
        boxes.push(det.bbox);
        labels.push(label.to_string());
        confidences.push(det.confidence);
    }

    Ok(DetectionResult::from_parts(boxes, labels, confidences))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::RawDetection;

    fn catalog() -> ClassCatalog {
        ClassCatalog::new(
            ["with helmet", "without helmet", "rider", "number plate"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    #[test]
    fn test_single_detection() {
        let raw = RawOutput::new(vec![RawDetection::new([10., 10., 50., 50.], 0, 0.9)]);
        let result = normalize(&raw, &catalog()).unwrap();
        assert_eq!(result.boxes(), &[[10., 10., 50., 50.]]);
        assert_eq!(result.labels(), &["with helmet".to_string()]);
        assert_eq!(result.confidences(), &[0.9]);
        assert_eq!(result.count(), 1);
    }

    #[test]
    fn test_order_preserved() {
        let raw = RawOutput::new(vec![
            RawDetection::new([1., 2., 3., 4.], 2, 0.3),
            RawDetection::new([5., 6., 7., 8.], 0, 0.95),
            RawDetection::new([9., 10., 11., 12.], 3, 0.5),
        ]);
        let result = normalize(&raw, &catalog()).unwrap();
        assert_eq!(result.count(), 3);
        assert_eq!(result.boxes().len(), 3);
        assert_eq!(result.confidences().len(), 3);
        assert_eq!(result.labels(), &["rider", "with helmet", "number plate"]);
        assert_eq!(result.boxes()[1], [5., 6., 7., 8.]);
        // 不做阈值过滤
        assert_eq!(result.confidences()[0], 0.3);
    }

    #[test]
    fn test_no_detections() {
        for raw in [RawOutput::empty(), RawOutput { boxes: Some(vec![]) }] {
            let result = normalize(&raw, &catalog()).unwrap();
            assert_eq!(result.count(), 0);
            assert!(result.boxes().is_empty());
            assert!(result.labels().is_empty());
            assert!(result.confidences().is_empty());
        }
    }

    #[test]
    fn test_class_index_out_of_catalog() {
        let raw = RawOutput::new(vec![
            RawDetection::new([0., 0., 1., 1.], 1, 0.9),
            RawDetection::new([0., 0., 1., 1.], 7, 0.9),
        ]);
        let err = normalize(&raw, &catalog()).unwrap_err();
        assert!(matches!(err, DetectError::ClassLookup { index: 7, len: 4 }));
    }
}
