// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 摄像头输入
//!
//! 按平台选择 FFmpeg 采集格式: DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux)

use anyhow::{anyhow, Result};

/// FFmpeg 摄像头输入描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInput {
    pub url: String,
    pub format: &'static str,
}

#[cfg(target_os = "windows")]
pub const CAMERA_FORMAT: &str = "dshow"; // DirectShow
#[cfg(target_os = "macos")]
pub const CAMERA_FORMAT: &str = "avfoundation"; // AVFoundation
#[cfg(target_os = "linux")]
pub const CAMERA_FORMAT: &str = "v4l2"; // Video4Linux2
#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
pub const CAMERA_FORMAT: &str = "video4linux2";

/// 设备索引 → FFmpeg 输入地址
pub fn camera_input(index: usize) -> Result<CameraInput> {
    #[cfg(target_os = "windows")]
    let url = {
        // dshow 只接受设备名称
        let devices = get_camera_devices();
        let (_, name) = devices
            .into_iter()
            .find(|(i, _)| *i == index)
            .ok_or_else(|| anyhow!("camera #{} not found", index))?;
        format!("video={}", name)
    };
    #[cfg(target_os = "linux")]
    let url = format!("/dev/video{}", index);
    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    let url = format!("{}", index);

    #[cfg(target_os = "linux")]
    if !std::path::Path::new(&url).exists() {
        return Err(anyhow!("camera #{} not found ({} does not exist)", index, url));
    }

    Ok(CameraInput {
        url,
        format: CAMERA_FORMAT,
    })
}

/// 获取可用摄像头列表
pub fn get_camera_devices() -> Vec<(usize, String)> {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => devices.into_iter().enumerate().collect(),
        Err(e) => {
            log::warn!("⚠️ 获取摄像头列表失败: {}", e);
            vec![]
        }
    }
}
