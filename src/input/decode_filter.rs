// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// FFmpeg解码过滤器模块
/// FFmpeg decode filter: 视频帧(YUV420P) → RGB图片 → 帧通道
use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;

use super::decoder::StreamEvent;

/// 单帧最大边长
const MAX_DIMENSION: u32 = 8192;

/// FFmpeg解码过滤器: 视频流 → RGB帧
pub struct DecodeFilter {
    tx: Option<Sender<StreamEvent>>,
    source: String,
    live: bool, // 实时源: 通道满时丢帧而不是阻塞
    count: usize,
    last: Instant,
    current_fps: f64,
    dropped_frames: usize,
    total_frames: usize,
}

impl DecodeFilter {
    pub fn new(tx: Sender<StreamEvent>, source: impl Into<String>) -> Self {
        Self {
            tx: Some(tx),
            source: source.into(),
            live: false,
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
            dropped_frames: 0,
            total_frames: 0,
        }
    }

    pub fn live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    fn drop_frame(&mut self, reason: &str) {
        self.dropped_frames += 1;
        if self.total_frames <= 10 {
            log::warn!("⚠️ 丢弃帧 #{}: {}", self.total_frames, reason);
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        log::info!("✅ 解码线程启动: {}", self.source);
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        // 接收端已关闭 → 终止解码
        if self.tx.is_none() {
            return Err("frame receiver closed".to_string());
        }

        self.total_frames += 1;

        // 基本检查：空帧或损坏帧
        if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
            self.drop_frame("空帧/损坏帧");
            return Ok(None);
        }

        let image = unsafe {
            let av = &*frame.as_ptr();
            let w = av.width as u32;
            let h = av.height as u32;

            if w == 0 || h == 0 || w > MAX_DIMENSION || h > MAX_DIMENSION {
                self.drop_frame(&format!("非法分辨率 {}x{}", w, h));
                return Ok(None);
            }

            // YUV420P数据指针 (管线中已通过 format=yuv420p 统一像素格式)
            let (y_plane, u_plane, v_plane) = (av.data[0], av.data[1], av.data[2]);
            if y_plane.is_null() || u_plane.is_null() || v_plane.is_null() {
                self.drop_frame("YUV指针为空");
                return Ok(None);
            }
            if av.linesize[0] <= 0 || av.linesize[1] <= 0 || av.linesize[2] <= 0 {
                self.drop_frame("负步长");
                return Ok(None);
            }

            let y_stride = av.linesize[0] as usize;
            let u_stride = av.linesize[1] as usize;
            let v_stride = av.linesize[2] as usize;
            if !strides_valid(w as usize, y_stride, u_stride, v_stride) {
                self.drop_frame(&format!(
                    "步长异常 y_stride={} u_stride={} v_stride={}",
                    y_stride, u_stride, v_stride
                ));
                return Ok(None);
            }

            let uv_h = (h as usize).div_ceil(2);
            let y = std::slice::from_raw_parts(y_plane, y_stride * h as usize);
            let u = std::slice::from_raw_parts(u_plane, u_stride * uv_h);
            let v = std::slice::from_raw_parts(v_plane, v_stride * uv_h);

            let strides = (y_stride, u_stride, v_stride);
            let rgb = yuv420p_to_rgb(y, u, v, strides, w as usize, h as usize);
            RgbImage::from_raw(w, h, rgb)
        };

        let Some(image) = image else {
            self.drop_frame("RGB缓冲区尺寸不匹配");
            return Ok(None);
        };

        self.count += 1;
        if self.last.elapsed().as_secs_f64() >= 1.0 {
            let elapsed = self.last.elapsed().as_secs_f64();
            self.current_fps = self.count as f64 / elapsed;
            log::debug!(
                "📺 解码统计: 解码{}帧 | 实际{:.1}fps | 总帧{} | 丢弃{}",
                self.count,
                self.current_fps,
                self.total_frames,
                self.dropped_frames
            );
            self.last = Instant::now();
            self.count = 0;
        }

        // 视频文件: 阻塞发送, 帧必须按顺序全部送达
        // 实时源: 推理跟不上时丢弃最新帧
        let event = StreamEvent::Frame(image);
        let sent = match (&self.tx, self.live) {
            (Some(tx), false) => tx.send(event).is_ok(),
            (Some(tx), true) => match tx.try_send(event) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    self.dropped_frames += 1;
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            },
            (None, _) => false,
        };
        if !sent {
            self.tx = None;
            return Err("frame receiver closed".to_string());
        }

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        self.tx = None;
        log::info!(
            "✅ 解码线程退出: {} (总帧{}, 丢弃{})",
            self.source,
            self.total_frames,
            self.dropped_frames
        );
    }
}

/// 校验 YUV420P 各平面步长
///
/// Y 平面至少 `width` 字节, U/V 平面各自至少 `ceil(width / 2)` 字节.
pub fn strides_valid(width: usize, y_stride: usize, u_stride: usize, v_stride: usize) -> bool {
    let uv_width = width.div_ceil(2);
    y_stride >= width && u_stride >= uv_width && v_stride >= uv_width
}

/// YUV420P → RGB24 (BT.601, 整数近似)
///
/// `strides` 依次为 Y/U/V 平面步长, 宽高为奇数时色度向上取整.
pub fn yuv420p_to_rgb(
    y_plane: &[u8],
    u_plane: &[u8],
    v_plane: &[u8],
    (y_stride, u_stride, v_stride): (usize, usize, usize),
    width: usize,
    height: usize,
) -> Vec<u8> {
    let mut buffer = vec![0u8; width * height * 3];
    let mut out_idx = 0;
    for y in 0..height {
        let y_row = y * y_stride;
        let u_row = (y >> 1) * u_stride;
        let v_row = (y >> 1) * v_stride;

        for x in 0..width {
            let y_val = y_plane[y_row + x] as i32;
            let u_val = u_plane[u_row + (x >> 1)] as i32 - 128;
            let v_val = v_plane[v_row + (x >> 1)] as i32 - 128;

            buffer[out_idx] = (y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8;
            buffer[out_idx + 1] =
                (y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8;
            buffer[out_idx + 2] = (y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8;
            out_idx += 3;
        }
    }
    buffer
}
