// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 帧流解码器
/// 独立线程运行 FFmpeg 解码, 通过有界通道按顺序交付 RGB 帧
use std::path::Path;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::stream_info::{find_video_stream_info, StreamInfo};
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;

use super::camera::camera_input;
use super::decode_filter::DecodeFilter;
use super::encoder::FrameRate;
use crate::signal;

/// 通道容量 (帧)
const CHANNEL_CAPACITY: usize = 8;
/// 中断标志轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 解码线程 → 消费者
#[derive(Debug)]
pub enum StreamEvent {
    Frame(RgbImage),
    Failed(String),
}

/// 摄像头采集参数
#[derive(Debug, Clone)]
pub struct CameraOptions {
    pub video_size: String, // 例如 1280x720
    pub framerate: u32,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            video_size: "1280x720".to_string(),
            framerate: 30,
        }
    }
}

/// 按顺序产出解码帧的迭代器
///
/// 解码失败时产出一次 `Err`, 之后结束. 可中断的流(摄像头)在收到
/// Ctrl-C 后结束.
pub struct FrameStream {
    rx: Receiver<StreamEvent>,
    handle: Option<JoinHandle<()>>,
    source: String,
    interruptible: bool,
    finished: bool,
}

impl FrameStream {
    /// 打开视频文件
    pub fn open_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(anyhow!("video file not found: {}", path.display()));
        }
        let url = path.to_string_lossy().to_string();
        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        let filter = DecodeFilter::new(tx.clone(), url.clone());
        let source = url.clone();
        let handle = std::thread::Builder::new()
            .name("decoder".to_string())
            .spawn(move || {
                let input = Input::new(url.as_str());
                decode(input, filter, &tx);
            })?;

        Ok(Self {
            rx,
            handle: Some(handle),
            source,
            interruptible: false,
            finished: false,
        })
    }

    /// 打开本地摄像头 (实时源, 可被 Ctrl-C 中断)
    pub fn open_camera(index: usize, options: &CameraOptions) -> Result<Self> {
        let camera = camera_input(index)?;
        log::info!("📷 摄像头 #{}: {} ({})", index, camera.url, camera.format);

        let (tx, rx) = bounded(2);
        let filter = DecodeFilter::new(tx.clone(), camera.url.clone()).live(true);
        let source = camera.url.clone();
        let framerate = options.framerate.to_string();
        let video_size = options.video_size.clone();
        let handle = std::thread::Builder::new()
            .name("decoder".to_string())
            .spawn(move || {
                let input = Input::new(camera.url.as_str())
                    .set_format(camera.format)
                    .set_input_opts(
                        [
                            ("framerate", framerate.as_str()),
                            ("video_size", video_size.as_str()),
                        ]
                        .into(),
                    );
                decode(input, filter, &tx);
            })?;

        Ok(Self {
            rx,
            handle: Some(handle),
            source,
            interruptible: true,
            finished: false,
        })
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("❌ 解码线程异常退出: {}", self.source);
            }
        }
    }
}

impl Iterator for FrameStream {
    type Item = Result<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if self.interruptible && signal::requested() {
                self.finished = true;
                return None;
            }
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(StreamEvent::Frame(frame)) => return Some(Ok(frame)),
                Ok(StreamEvent::Failed(e)) => {
                    self.finish();
                    return Some(Err(anyhow!("{}: {}", self.source, e)));
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    self.finish();
                    return None;
                }
            }
        }
    }
}

/// 读取视频流的平均帧率, 未知或读取失败时返回 None
pub fn source_frame_rate(path: &Path) -> Option<FrameRate> {
    match find_video_stream_info(path.to_string_lossy().to_string()) {
        Ok(Some(StreamInfo::Video { avg_frame_rate, .. })) => {
            FrameRate::new(avg_frame_rate.num, avg_frame_rate.den)
        }
        Ok(_) => None,
        Err(e) => {
            log::warn!("⚠️ 读取帧率失败 {}: {}", path.display(), e);
            None
        }
    }
}

/// 运行 FFmpeg 解码直到流结束
fn decode(input: Input, filter: DecodeFilter, tx: &Sender<StreamEvent>) {
    let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
    let pipe = pipe.filter("decode", Box::new(filter));
    let out = create_null_output().add_frame_pipeline(pipe);

    // 统一像素格式, 解码过滤器只处理 YUV420P
    let ctx = match FfmpegContext::builder()
        .input(input)
        .filter_descs(["format=yuv420p"].into())
        .output(out)
        .build()
    {
        Ok(ctx) => ctx,
        Err(e) => {
            let _ = tx.send(StreamEvent::Failed(format!("构建失败: {}", e)));
            return;
        }
    };

    let sch = match ctx.start() {
        Ok(sch) => sch,
        Err(e) => {
            let _ = tx.send(StreamEvent::Failed(format!("启动失败: {}", e)));
            return;
        }
    };

    // 消费者提前退出时过滤器会主动中止, 此时的错误可以忽略
    if let Err(e) = sch.wait() {
        log::debug!("解码结束: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        assert!(FrameStream::open_file(Path::new("does/not/exist.mp4")).is_err());
    }

    #[test]
    fn test_failed_event_ends_stream() {
        let (tx, rx) = bounded(4);
        tx.send(StreamEvent::Frame(RgbImage::new(2, 2))).unwrap();
        tx.send(StreamEvent::Failed("broken".into())).unwrap();
        drop(tx);
        let mut stream = FrameStream {
            rx,
            handle: None,
            source: "test".into(),
            interruptible: false,
            finished: false,
        };
        assert!(stream.next().unwrap().is_ok());
        assert!(stream.next().unwrap().is_err());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_interrupt_ends_live_stream() {
        let _guard = signal::TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let (tx, rx) = bounded(4);
        tx.send(StreamEvent::Frame(RgbImage::new(2, 2))).unwrap();
        let mut stream = FrameStream {
            rx,
            handle: None,
            source: "camera".into(),
            interruptible: true,
            finished: false,
        };

        signal::trigger();
        let next = stream.next();
        signal::reset();
        assert!(next.is_none());
        assert!(stream.next().is_none());
        drop(tx);
    }

    #[test]
    fn test_interrupt_ignored_for_files() {
        let _guard = signal::TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let (tx, rx) = bounded(4);
        tx.send(StreamEvent::Frame(RgbImage::new(2, 2))).unwrap();
        drop(tx);
        let mut stream = FrameStream {
            rx,
            handle: None,
            source: "clip.mp4".into(),
            interruptible: false,
            finished: false,
        };

        signal::trigger();
        let next = stream.next();
        signal::reset();
        assert!(matches!(next, Some(Ok(_))));
    }

    #[test]
    fn test_frame_rate_of_missing_file() {
        assert_eq!(source_frame_rate(Path::new("does/not/exist.mp4")), None);
    }

    #[test]
    fn test_disconnect_ends_stream() {
        let (tx, rx) = bounded::<StreamEvent>(1);
        drop(tx);
        let mut stream = FrameStream {
            rx,
            handle: None,
            source: "test".into(),
            interruptible: false,
            finished: false,
        };
        assert!(stream.next().is_none());
    }
}
