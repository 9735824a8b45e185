// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频输入输出 (Video I/O)
///
/// - FrameStream: 视频文件/摄像头解码, 独立线程 + 有界通道
/// - DecodeFilter: FFmpeg 帧过滤器, YUV420P → RGB
/// - camera: 本地摄像头 (DirectShow/AVFoundation/V4L2)
/// - FrameWriter: 标注帧 → 视频文件
pub mod camera;
pub mod decode_filter;
pub mod decoder;
pub mod encoder;

pub use camera::{camera_input, get_camera_devices, CameraInput};
pub use decode_filter::DecodeFilter;
pub use decoder::{source_frame_rate, CameraOptions, FrameStream, StreamEvent};
pub use encoder::{FrameRate, FrameWriter};
