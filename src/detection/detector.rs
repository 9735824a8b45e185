// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测器 (Detector)
//! 职责: 持有已加载的模型与阈值 → 图片/批量/视频/摄像头推理 → DetectionResult
//!
//! 所有入口都是同步阻塞的. 需要显示窗口时, 窗口占用调用线程,
//! 推理移到作用域线程中执行.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::anyhow;
use crossbeam_channel::{bounded, Sender, TrySendError};
use image::{DynamicImage, RgbImage};

use super::normalizer::normalize;
use super::types::{DetectionResult, RawOutput, VideoStats};
use crate::config::{check_threshold, ClassCatalog, Config};
use crate::error::{DetectError, Result};
use crate::input::{source_frame_rate, CameraOptions, FrameRate, FrameStream, FrameWriter};
use crate::models::{InferenceParams, Model, YOLOv8, YOLOv8Config};
use crate::viewer::Viewer;
use crate::visualizer::Visualizer;
use crate::{signal, OrtEP};

/// 显示通道容量, 窗口跟不上时丢帧
const DISPLAY_CAPACITY: usize = 2;

pub struct Detector<M: Model = YOLOv8> {
    model: M,
    config: Config,
    catalog: ClassCatalog,
    conf_threshold: f32,
    iou_threshold: f32,
    visualizer: Visualizer,
}

impl Detector<YOLOv8> {
    /// 加载配置并构建 YOLOv8 模型
    ///
    /// `model_path` 优先于配置中的 `model.path`.
    pub fn new(model_path: Option<&Path>, config_path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::load(config_path)?;
        let path = model_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.model.path.clone());
        if !path.exists() {
            return Err(DetectError::ModelNotFound(path));
        }

        let ep: OrtEP = config
            .model
            .device
            .parse()
            .map_err(|e: anyhow::Error| DetectError::InvalidConfig(format!("model.device: {e}")))?;
        let model = YOLOv8::new(YOLOv8Config {
            ep,
            imgsz: config.model.imgsz,
            ..YOLOv8Config::new(&path)
        })
        .map_err(DetectError::Inference)?;
        model.summary();

        let mut detector = Self::with_model(config, model)?;
        detector.config.model.path = path;
        Ok(detector)
    }
}

impl<M: Model> Detector<M> {
    /// 使用已构建的模型创建检测器
    pub fn with_model(config: Config, model: M) -> Result<Self> {
        config.validate()?;
        let catalog = config.catalog();
        let visualizer = Visualizer::from_config(&config.visualizer);
        log::info!(
            "✅ 检测器就绪: {} ({} 类, conf={}, iou={})",
            config.model.path.display(),
            catalog.len(),
            config.model.conf_threshold,
            config.model.iou_threshold
        );

        Ok(Self {
            model,
            conf_threshold: config.model.conf_threshold,
            iou_threshold: config.model.iou_threshold,
            catalog,
            visualizer,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    pub fn model_path(&self) -> &Path {
        &self.config.model.path
    }

    pub fn conf_threshold(&self) -> f32 {
        self.conf_threshold
    }

    pub fn set_conf_threshold(&mut self, value: f32) -> Result<()> {
        check_threshold("conf_threshold", value)?;
        self.conf_threshold = value;
        Ok(())
    }

    pub fn iou_threshold(&self) -> f32 {
        self.iou_threshold
    }

    pub fn set_iou_threshold(&mut self, value: f32) -> Result<()> {
        check_threshold("iou_threshold", value)?;
        self.iou_threshold = value;
        Ok(())
    }

    fn params(&self) -> InferenceParams {
        InferenceParams {
            conf: self.conf_threshold,
            iou: self.iou_threshold,
        }
    }

    /// 内存中的单张图片推理
    pub fn predict_frame(&mut self, image: &DynamicImage) -> Result<DetectionResult> {
        let params = self.params();
        let raw = self
            .model
            .forward(std::slice::from_ref(image), &params)
            .map_err(DetectError::Inference)?
            .into_iter()
            .next()
            .unwrap_or_else(RawOutput::empty);
        normalize(&raw, &self.catalog)
    }

    /// 图片文件推理
    ///
    /// `save_path` 写入标注副本 (自动创建父目录), `show` 打开窗口并阻塞到窗口关闭.
    pub fn predict_image(
        &mut self,
        image_path: impl AsRef<Path>,
        save_path: Option<&Path>,
        show: bool,
    ) -> Result<DetectionResult> {
        let image_path = image_path.as_ref();
        if !image_path.is_file() {
            return Err(DetectError::InvalidSource(image_path.to_path_buf()));
        }

        let t = Instant::now();
        let image = image::open(image_path)?;
        let result = self.predict_frame(&image)?;
        log::debug!(
            "🔍 {}: {} 个目标 ({:?})",
            image_path.display(),
            result.count(),
            t.elapsed()
        );

        if save_path.is_none() && !show {
            return Ok(result);
        }

        let annotated = self.visualizer.draw(&image.to_rgb8(), &result);
        if let Some(save_path) = save_path {
            if let Some(dir) = save_path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            annotated.save(save_path)?;
            log::info!("💾 结果已保存: {}", save_path.display());
        }
        if show {
            Viewer::new(format!("Detection - {}", image_path.display())).show_image(annotated);
        }

        Ok(result)
    }

    /// 批量推理, 结果顺序与输入一致; 任一图片失败则整批失败
    pub fn predict_batch<P: AsRef<Path>>(
        &mut self,
        image_paths: &[P],
        save_dir: Option<&Path>,
    ) -> Result<Vec<DetectionResult>> {
        image_paths
            .iter()
            .map(|p| self.predict_batch_item(p.as_ref(), save_dir))
            .collect()
    }

    /// 批量推理, 每张图片独立成败
    pub fn predict_batch_isolated<P: AsRef<Path>>(
        &mut self,
        image_paths: &[P],
        save_dir: Option<&Path>,
    ) -> Vec<Result<DetectionResult>> {
        image_paths
            .iter()
            .map(|p| {
                let path = p.as_ref();
                let result = self.predict_batch_item(path, save_dir);
                if let Err(e) = &result {
                    log::warn!("⚠️ {} 推理失败: {}", path.display(), e);
                }
                result
            })
            .collect()
    }

    fn predict_batch_item(&mut self, path: &Path, save_dir: Option<&Path>) -> Result<DetectionResult> {
        let save_path = match save_dir {
            Some(dir) => {
                let name = path
                    .file_name()
                    .ok_or_else(|| DetectError::InvalidSource(path.to_path_buf()))?;
                Some(dir.join(name))
            }
            None => None,
        };
        self.predict_image(path, save_path.as_deref(), false)
    }

    /// 按顺序对帧序列推理, 累计统计
    pub fn predict_frames<I>(&mut self, frames: I) -> Result<VideoStats>
    where
        I: IntoIterator<Item = anyhow::Result<RgbImage>>,
    {
        self.run_stream(frames, None, None, false)
    }

    /// 视频文件推理
    ///
    /// `output_path` 写入标注视频, `show` 在窗口中实时显示 (关闭窗口不影响处理).
    pub fn predict_video(
        &mut self,
        video_path: impl AsRef<Path>,
        output_path: Option<&Path>,
        show: bool,
    ) -> Result<VideoStats>
    where
        M: Send,
    {
        let video_path = video_path.as_ref();
        if !video_path.is_file() {
            return Err(DetectError::InvalidSource(video_path.to_path_buf()));
        }

        let frames = FrameStream::open_file(video_path).map_err(DetectError::Inference)?;
        let mut writer = match output_path {
            Some(path) => {
                let rate = output_frame_rate(source_frame_rate(video_path), self.config.video.fps)?;
                log::info!("🎞️ 输出帧率: {} ({:.2}fps)", rate, rate.fps());
                Some(FrameWriter::create(path, rate).map_err(DetectError::Inference)?)
            }
            None => None,
        };

        log::info!("🎬 开始处理视频: {}", video_path.display());
        let t = Instant::now();
        let stats = if show {
            let title = format!("Detection - {}", video_path.display());
            self.run_with_viewer(frames, writer.as_mut(), Viewer::new(title), false)?
        } else {
            self.run_stream(frames, writer.as_mut(), None, false)?
        };

        if let Some(writer) = writer {
            if stats.frames > 0 {
                writer.finish().map_err(DetectError::Inference)?;
            }
        }

        log::info!(
            "✅ 视频处理完成: {} 帧, {} 个目标, 平均 {:.2}/帧 ({:.1}s)",
            stats.frames,
            stats.total_detections,
            stats.avg_detections_per_frame,
            t.elapsed().as_secs_f64()
        );
        Ok(stats)
    }

    /// 摄像头实时推理, 直到流结束、窗口关闭或收到 Ctrl-C
    pub fn predict_webcam(&mut self, camera_id: usize, show: bool) -> Result<()>
    where
        M: Send,
    {
        signal::install().map_err(DetectError::Inference)?;
        signal::reset();

        let options = CameraOptions {
            video_size: self.config.video.camera_size.clone(),
            framerate: self.config.video.camera_fps,
        };
        let frames = FrameStream::open_camera(camera_id, &options).map_err(DetectError::Inference)?;

        log::info!("🎥 摄像头推理启动 (#{}), 按 Ctrl-C 停止", camera_id);
        let stats = if show {
            let viewer = Viewer::new(format!("Webcam #{camera_id}"));
            self.run_with_viewer(frames, None, viewer, true)?
        } else {
            self.run_stream(frames, None, None, true)?
        };

        if signal::requested() {
            log::info!("🛑 摄像头推理已中断");
            signal::reset();
        }
        log::info!(
            "✅ 摄像头推理结束: {} 帧, {} 个目标",
            stats.frames,
            stats.total_detections
        );
        Ok(())
    }

    /// 窗口占用当前线程, 推理在作用域线程中执行
    fn run_with_viewer<I>(
        &mut self,
        frames: I,
        writer: Option<&mut FrameWriter>,
        viewer: Viewer,
        stop_on_close: bool,
    ) -> Result<VideoStats>
    where
        I: IntoIterator<Item = anyhow::Result<RgbImage>> + Send,
        M: Send,
    {
        let (tx, rx) = bounded(DISPLAY_CAPACITY);
        std::thread::scope(|s| {
            let worker = std::thread::Builder::new()
                .name("inference".to_string())
                .spawn_scoped(s, move || self.run_stream(frames, writer, Some(tx), stop_on_close))
                .map_err(DetectError::Io)?;
            viewer.run(rx);
            worker
                .join()
                .map_err(|_| DetectError::Inference(anyhow!("inference thread panicked")))?
        })
    }

    fn run_stream<I>(
        &mut self,
        frames: I,
        mut writer: Option<&mut FrameWriter>,
        mut display: Option<Sender<RgbImage>>,
        stop_on_close: bool,
    ) -> Result<VideoStats>
    where
        I: IntoIterator<Item = anyhow::Result<RgbImage>>,
    {
        let mut stats = VideoStats::default();
        let mut count = 0;
        let mut last = Instant::now();

        for frame in frames {
            let frame = DynamicImage::ImageRgb8(frame.map_err(DetectError::Inference)?);
            let result = self.predict_frame(&frame)?;
            stats.record(result.count());

            let annotating = writer.is_some() || display.is_some();
            if let Some(rgb) = frame.as_rgb8().filter(|_| annotating) {
                let annotated = self.visualizer.draw(rgb, &result);
                if let Some(writer) = writer.as_mut() {
                    writer.push(&annotated).map_err(DetectError::Inference)?;
                }
                let closed = display.as_ref().is_some_and(|tx| {
                    matches!(tx.try_send(annotated), Err(TrySendError::Disconnected(_)))
                });
                if closed {
                    if stop_on_close {
                        log::info!("🪟 窗口已关闭, 停止推理");
                        break;
                    }
                    display = None;
                }
            }

            count += 1;
            if last.elapsed().as_secs_f64() >= 1.0 {
                log::debug!(
                    "📊 推理统计: {:.1}fps | 已处理{}帧 | 累计{}个目标",
                    count as f64 / last.elapsed().as_secs_f64(),
                    stats.frames,
                    stats.total_detections
                );
                last = Instant::now();
                count = 0;
            }
        }

        Ok(stats)
    }
}

/// 标注视频帧率: 优先使用源视频帧率, 读不到时使用配置 `video.fps`
fn output_frame_rate(source: Option<FrameRate>, fallback_fps: u32) -> Result<FrameRate> {
    source
        .or_else(|| FrameRate::from_fps(fallback_fps))
        .ok_or_else(|| DetectError::InvalidConfig(format!("video.fps must be > 0, got {fallback_fps}")))
}

/// 保存路径: `dir/<stem>_result<ext>`
pub fn result_path(dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let name = match source.extension() {
        Some(ext) => format!("{}_result.{}", stem, ext.to_string_lossy()),
        None => format!("{}_result", stem),
    };
    dir.join(name)
}
