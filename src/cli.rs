// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 命令行参数

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;
use crate::detection::detector::result_path;
use crate::error::{DetectError, Result};

/// 支持的图片扩展名
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tiff"];

pub const IMAGE_OUTPUT_DIR: &str = "output/images";
pub const VIDEO_OUTPUT_DIR: &str = "output/videos";

/// 头盔检测
#[derive(Parser, Debug)]
#[command(author, version, about = "头盔检测 - YOLOv8 ONNX 推理", long_about = None)]
pub struct Cli {
    /// 配置文件
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// 覆盖配置中的模型与阈值
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// 模型路径 (覆盖配置)
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// 置信度阈值
    #[arg(long)]
    pub conf: Option<f32>,

    /// NMS IOU阈值
    #[arg(long)]
    pub iou: Option<f32>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 图片或图片目录推理
    Image {
        /// 图片文件或目录
        #[arg(short, long)]
        source: PathBuf,

        /// 输出路径 (文件输入为文件, 目录输入为目录)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        model: ModelArgs,

        /// 显示结果窗口 (仅单张图片)
        #[arg(long)]
        show: bool,

        /// 写入 JSON 报告
        #[arg(long)]
        json: Option<PathBuf>,

        /// 单张失败时继续处理其余图片
        #[arg(long)]
        keep_going: bool,
    },

    /// 视频文件推理
    Video {
        /// 视频文件
        #[arg(short, long)]
        source: PathBuf,

        /// 输出视频路径
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        model: ModelArgs,

        /// 实时显示
        #[arg(long)]
        show: bool,

        /// 写入 JSON 报告
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// 摄像头实时推理 (Ctrl-C 停止)
    Webcam {
        /// 摄像头索引
        #[arg(long, default_value_t = 0)]
        camera: usize,

        #[command(flatten)]
        model: ModelArgs,

        /// 不显示窗口
        #[arg(long)]
        no_show: bool,
    },

    /// 列出摄像头设备
    Devices,
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// 目录下的图片 (不递归, 按文件名排序)
pub fn collect_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DetectError::InvalidSource(dir.to_path_buf()));
    }
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// 默认输出: `output/images/<stem>_result<ext>`
pub fn default_image_output(source: &Path) -> PathBuf {
    result_path(Path::new(IMAGE_OUTPUT_DIR), source)
}

/// 默认输出: `output/videos/<stem>_result<ext>`
pub fn default_video_output(source: &Path) -> PathBuf {
    result_path(Path::new(VIDEO_OUTPUT_DIR), source)
}

/// 平均每张图片的检测数, 只统计成功的图片
pub fn average_per_image(total: usize, ok: usize) -> f64 {
    if ok == 0 {
        0.0
    } else {
        total as f64 / ok as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_per_image() {
        assert_eq!(average_per_image(7, 2), 3.5);
        assert_eq!(average_per_image(0, 3), 0.0);
        assert_eq!(average_per_image(5, 0), 0.0);
    }

    #[test]
    fn test_parse_image() {
        let cli = Cli::parse_from([
            "helmet", "image", "--source", "a.jpg", "--conf", "0.4", "--keep-going",
        ]);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        match cli.command {
            Commands::Image {
                source,
                model,
                keep_going,
                show,
                ..
            } => {
                assert_eq!(source, PathBuf::from("a.jpg"));
                assert_eq!(model.conf, Some(0.4));
                assert_eq!(model.iou, None);
                assert!(keep_going);
                assert!(!show);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_webcam_with_global_config() {
        let cli = Cli::parse_from(["helmet", "webcam", "--camera", "1", "--no-show", "-c", "x.yaml"]);
        assert_eq!(cli.config, PathBuf::from("x.yaml"));
        assert!(matches!(
            cli.command,
            Commands::Webcam {
                camera: 1,
                no_show: true,
                ..
            }
        ));
    }

    #[test]
    fn test_source_is_required() {
        assert!(Cli::try_parse_from(["helmet", "video"]).is_err());
    }

    #[test]
    fn test_collect_images() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.PNG", "a.jpg", "notes.txt", "c.tiff"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let images = collect_images(dir.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["a.jpg", "b.PNG", "c.tiff"]);

        assert!(matches!(
            collect_images(&dir.path().join("missing")),
            Err(DetectError::InvalidSource(_))
        ));
    }

    #[test]
    fn test_default_outputs() {
        assert_eq!(
            default_image_output(Path::new("input/images/test.jpg")),
            PathBuf::from("output/images/test_result.jpg")
        );
        assert_eq!(
            default_video_output(Path::new("clip.mp4")),
            PathBuf::from("output/videos/clip_result.mp4")
        );
    }
}
