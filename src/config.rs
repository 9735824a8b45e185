// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测配置 - 通过YAML文件调整参数
//!
//! ```yaml
//! model:
//!   path: models/best.onnx
//!   conf_threshold: 0.25
//!   iou_threshold: 0.45
//! classes:
//!   names: ["with helmet", "without helmet", "rider", "number plate"]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DetectError, Result};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// 完整配置
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub classes: ClassesConfig,
    #[serde(default)]
    pub visualizer: VisualizerConfig,
    #[serde(default)]
    pub video: VideoConfig,
}

/// 模型参数
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub conf_threshold: f32, // 检测置信度阈值
    pub iou_threshold: f32,  // NMS IOU阈值
    #[serde(default = "default_imgsz")]
    pub imgsz: u32, // 模型输入尺寸
    #[serde(default = "default_device")]
    pub device: String, // cpu / cuda:0 / trt:0
}

/// 类别表
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassesConfig {
    pub names: Vec<String>,
}

/// 绘制参数
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VisualizerConfig {
    #[serde(default = "default_class_colors")]
    pub colors: BTreeMap<String, [u8; 3]>,
    #[serde(default = "default_line_width")]
    pub line_width: u32,
    #[serde(default)]
    pub font: Option<PathBuf>,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
}

/// 视频/摄像头参数
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VideoConfig {
    #[serde(default = "default_fps")]
    pub fps: u32, // 输出视频帧率
    #[serde(default = "default_camera_size")]
    pub camera_size: String,
    #[serde(default = "default_fps")]
    pub camera_fps: u32,
}

fn default_imgsz() -> u32 {
    640
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_line_width() -> u32 {
    2
}

fn default_font_size() -> f32 {
    20.0
}

fn default_fps() -> u32 {
    30
}

fn default_camera_size() -> String {
    "1280x720".to_string()
}

/// 头盔数据集的默认配色
pub fn default_class_colors() -> BTreeMap<String, [u8; 3]> {
    BTreeMap::from([
        ("with helmet".to_string(), [0, 255, 128]),
        ("without helmet".to_string(), [255, 51, 51]),
        ("rider".to_string(), [51, 255, 255]),
        ("number plate".to_string(), [224, 102, 255]),
    ])
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            colors: default_class_colors(),
            line_width: default_line_width(),
            font: None,
            font_size: default_font_size(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            camera_size: default_camera_size(),
            camera_fps: default_fps(),
        }
    }
}

impl Config {
    /// 从YAML文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DetectError::ConfigNotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        let config: Config =
            serde_yaml::from_str(&text).map_err(|source| DetectError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        log::info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    /// 校验阈值范围与类别表
    pub fn validate(&self) -> Result<()> {
        check_threshold("model.conf_threshold", self.model.conf_threshold)?;
        check_threshold("model.iou_threshold", self.model.iou_threshold)?;
        if self.classes.names.is_empty() {
            return Err(DetectError::InvalidConfig(
                "classes.names must not be empty".to_string(),
            ));
        }
        if self.model.imgsz == 0 || self.model.imgsz % 32 != 0 {
            return Err(DetectError::InvalidConfig(format!(
                "model.imgsz must be a positive multiple of 32, got {}",
                self.model.imgsz
            )));
        }
        if self.video.fps == 0 {
            return Err(DetectError::InvalidConfig("video.fps must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn catalog(&self) -> ClassCatalog {
        ClassCatalog::new(self.classes.names.clone())
    }
}

pub(crate) fn check_threshold(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(DetectError::InvalidConfig(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

/// 类别索引 → 类别名称 (检测器生命周期内不可变)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassCatalog {
    names: Vec<String>,
}

impl ClassCatalog {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}
