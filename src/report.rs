// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! JSON 推理报告

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::detection::{DetectionResult, VideoStats};

/// 报告时间戳 (本地时区, RFC 3339)
pub fn timestamp() -> String {
    chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, false)
}

/// 推理参数快照
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub timestamp: String,
    pub model: PathBuf,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
}

impl RunInfo {
    pub fn new(model: &Path, conf_threshold: f32, iou_threshold: f32) -> Self {
        Self {
            timestamp: timestamp(),
            model: model.to_path_buf(),
            conf_threshold,
            iou_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageEntry {
    pub source: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DetectionResult>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub class_counts: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageEntry {
    pub fn ok(source: &Path, output: Option<&Path>, result: &DetectionResult) -> Self {
        Self {
            source: source.to_path_buf(),
            output: output.map(Path::to_path_buf),
            class_counts: result.class_counts(),
            result: Some(result.clone()),
            error: None,
        }
    }

    pub fn failed(source: &Path, error: impl ToString) -> Self {
        Self {
            source: source.to_path_buf(),
            output: None,
            result: None,
            class_counts: BTreeMap::new(),
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
    #[serde(flatten)]
    pub run: RunInfo,
    pub total_detections: usize,
    pub images: Vec<ImageEntry>,
}

impl ImageReport {
    pub fn new(run: RunInfo, images: Vec<ImageEntry>) -> Self {
        let total_detections = images
            .iter()
            .filter_map(|e| e.result.as_ref())
            .map(DetectionResult::count)
            .sum();
        Self {
            run,
            total_detections,
            images,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoReport {
    #[serde(flatten)]
    pub run: RunInfo,
    pub source: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    pub stats: VideoStats,
}

/// 写入格式化 JSON (自动创建父目录)
pub fn write_json<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, serde_json::to_string_pretty(report)?)?;
    log::info!("📝 报告已保存: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_report_json() {
        let result = DetectionResult::from_parts(
            vec![[10., 10., 50., 50.]],
            vec!["with helmet".into()],
            vec![0.9],
        );
        let run = RunInfo::new(Path::new("models/best.onnx"), 0.25, 0.45);
        let report = ImageReport::new(
            run,
            vec![
                ImageEntry::ok(Path::new("a.jpg"), None, &result),
                ImageEntry::failed(Path::new("b.jpg"), "broken"),
            ],
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/r.json");
        write_json(&path, &report).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["total_detections"], 1);
        assert_eq!(value["conf_threshold"], 0.25);
        assert_eq!(value["images"][0]["result"]["count"], 1);
        assert_eq!(value["images"][0]["result"]["labels"][0], "with helmet");
        assert_eq!(value["images"][0]["class_counts"]["with helmet"], 1);
        assert_eq!(value["images"][1]["error"], "broken");
        assert!(value["images"][1].get("result").is_none());
    }

    #[test]
    fn test_video_report_json() {
        let report = VideoReport {
            run: RunInfo::new(Path::new("m.onnx"), 0.3, 0.5),
            source: PathBuf::from("clip.mp4"),
            output: None,
            stats: VideoStats::new(3, 3),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["stats"]["frames"], 3);
        assert_eq!(value["stats"]["avg_detections_per_frame"], 1.0);
        assert!(value["timestamp"].is_string());
    }
}
