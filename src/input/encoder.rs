// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 标注视频输出
//!
//! 标注帧以 rgb24 原始数据经有界通道送入编码线程, FFmpeg 边收边编码.
//! 编码器与容器由输出文件扩展名决定. 中途出错时已写入的帧仍会被封装成文件.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use anyhow::{anyhow, bail, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use ez_ffmpeg::{FfmpegContext, Input};
use image::RgbImage;

/// 编码队列容量 (帧)
const CHANNEL_CAPACITY: usize = 8;

/// FFERRTAG('E','O','F',' ')
const AVERROR_EOF: i32 = -0x2046_4F45;

/// 帧率 (有理数, 与 FFmpeg 的 avg_frame_rate 对应)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    num: u32,
    den: u32,
}

impl FrameRate {
    /// 分子分母都必须为正 (FFmpeg 用 0/0 表示未知帧率)
    pub fn new(num: i32, den: i32) -> Option<Self> {
        if num <= 0 || den <= 0 {
            return None;
        }
        Some(Self {
            num: num as u32,
            den: den as u32,
        })
    }

    pub fn from_fps(fps: u32) -> Option<Self> {
        Self::new(i32::try_from(fps).ok()?, 1)
    }

    pub fn fps(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// FFmpeg 读回调: 从通道取帧, 按 FFmpeg 的缓冲区大小分块拷贝
struct RawFrameReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
}

impl RawFrameReader {
    fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            offset: 0,
        }
    }

    /// 返回拷贝的字节数, 发送端关闭且数据读完后返回 AVERROR_EOF
    fn read(&mut self, buf: &mut [u8]) -> i32 {
        while self.offset >= self.pending.len() {
            match self.rx.recv() {
                Ok(frame) => {
                    self.pending = frame;
                    self.offset = 0;
                }
                Err(_) => return AVERROR_EOF,
            }
        }
        let n = (self.pending.len() - self.offset).min(buf.len());
        buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
        self.offset += n;
        n as i32
    }
}

pub struct FrameWriter {
    output: PathBuf,
    rate: FrameRate,
    frames: usize,
    size: Option<(u32, u32)>,
    tx: Option<Sender<Vec<u8>>>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl FrameWriter {
    /// 编码在收到第一帧(确定分辨率)后启动
    pub fn create(output: &Path, rate: FrameRate) -> Result<Self> {
        if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        Ok(Self {
            output: output.to_path_buf(),
            rate,
            frames: 0,
            size: None,
            tx: None,
            handle: None,
        })
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn rate(&self) -> FrameRate {
        self.rate
    }

    /// 追加一帧, 所有帧的分辨率必须一致
    pub fn push(&mut self, frame: &RgbImage) -> Result<()> {
        let size = frame.dimensions();
        match self.size {
            None => self.start(size)?,
            Some(expected) if expected != size => bail!(
                "frame size changed from {}x{} to {}x{}",
                expected.0,
                expected.1,
                size.0,
                size.1
            ),
            Some(_) => {}
        }

        let sent = self
            .tx
            .as_ref()
            .map(|tx| tx.send(frame.as_raw().clone()).is_ok())
            .unwrap_or(false);
        if !sent {
            self.tx = None;
            return Err(match self.join() {
                Err(e) => e,
                Ok(()) => anyhow!("encoder exited early: {}", self.output.display()),
            });
        }
        self.frames += 1;
        Ok(())
    }

    /// 结束输入并等待编码完成, 返回输出路径
    pub fn finish(mut self) -> Result<PathBuf> {
        if self.frames == 0 {
            bail!("no frames to encode into {}", self.output.display());
        }
        self.tx = None;
        self.join()?;

        log::info!(
            "💾 视频已保存: {} ({} 帧, {:.2}fps)",
            self.output.display(),
            self.frames,
            self.rate.fps()
        );
        Ok(self.output.clone())
    }

    fn start(&mut self, (width, height): (u32, u32)) -> Result<()> {
        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        let video_size = format!("{}x{}", width, height);
        let framerate = self.rate.to_string();
        let out = self.output.to_string_lossy().to_string();

        let handle = std::thread::Builder::new()
            .name("encoder".to_string())
            .spawn(move || -> Result<()> {
                let mut reader = RawFrameReader::new(rx);
                let input = Input::new_by_read_callback(move |buf: &mut [u8]| reader.read(buf))
                    .set_format("rawvideo")
                    .set_input_opts(
                        [
                            ("video_size", video_size.as_str()),
                            ("pixel_format", "rgb24"),
                            ("framerate", framerate.as_str()),
                        ]
                        .into(),
                    );

                // yuv420p 要求宽高为偶数
                let ctx = FfmpegContext::builder()
                    .input(input)
                    .filter_descs(["scale=trunc(iw/2)*2:trunc(ih/2)*2,format=yuv420p"].into())
                    .output(out.as_str())
                    .build()
                    .map_err(|e| anyhow!("构建失败: {}", e))?;
                let sch = ctx.start().map_err(|e| anyhow!("启动失败: {}", e))?;
                sch.wait().map_err(|e| anyhow!("编码失败: {}", e))?;
                Ok(())
            })?;

        log::info!(
            "🎞️ 编码启动: {} ({}x{}, {}fps)",
            self.output.display(),
            width,
            height,
            self.rate
        );
        self.size = Some((width, height));
        self.tx = Some(tx);
        self.handle = Some(handle);
        Ok(())
    }

    fn join(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("encoder thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for FrameWriter {
    /// 未调用 finish 时关闭输入, 已写入的帧照常封装
    fn drop(&mut self) {
        self.tx = None;
        if let Err(e) = self.join() {
            log::warn!("⚠️ 视频编码失败 {}: {}", self.output.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rate() {
        let ntsc = FrameRate::new(30000, 1001).unwrap();
        assert_eq!(ntsc.to_string(), "30000/1001");
        assert!((ntsc.fps() - 29.97).abs() < 0.01);
        assert_eq!(FrameRate::from_fps(25), FrameRate::new(25, 1));
        assert_eq!(FrameRate::new(0, 0), None);
        assert_eq!(FrameRate::new(25, -1), None);
        assert_eq!(FrameRate::from_fps(0), None);
    }

    #[test]
    fn test_reader_splits_frames_across_reads() {
        let (tx, rx) = bounded(4);
        tx.send(vec![1u8, 2, 3, 4, 5]).unwrap();
        tx.send(vec![6u8, 7]).unwrap();
        drop(tx);

        let mut reader = RawFrameReader::new(rx);
        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(reader.read(&mut buf), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(reader.read(&mut buf), 2);
        assert_eq!(&buf[..2], &[6, 7]);
        assert_eq!(reader.read(&mut buf), AVERROR_EOF);
    }

    #[test]
    fn test_reader_skips_empty_frames() {
        let (tx, rx) = bounded(4);
        tx.send(Vec::new()).unwrap();
        tx.send(vec![9u8]).unwrap();
        drop(tx);

        let mut reader = RawFrameReader::new(rx);
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf), 1);
        assert_eq!(buf[0], 9);
        assert_eq!(reader.read(&mut buf), AVERROR_EOF);
    }

    #[test]
    fn test_create_makes_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let rate = FrameRate::from_fps(25).unwrap();
        let writer = FrameWriter::create(&dir.path().join("out/result.mp4"), rate).unwrap();
        assert!(dir.path().join("out").is_dir());
        assert_eq!(writer.frames(), 0);
        assert_eq!(writer.rate(), rate);
    }

    #[test]
    fn test_finish_without_frames() {
        let dir = tempfile::tempdir().unwrap();
        let rate = FrameRate::from_fps(30).unwrap();
        let writer = FrameWriter::create(&dir.path().join("empty.mp4"), rate).unwrap();
        assert!(writer.finish().is_err());
    }
}
