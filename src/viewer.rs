// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 显示窗口 (macroquad)
//!
//! 窗口运行在调用线程上并阻塞到窗口关闭. 窗口库限制: 每个进程只能打开一次窗口.
//! 按 Q / Esc 或点击关闭按钮退出.

use crossbeam_channel::{Receiver, TryRecvError};
use image::{DynamicImage, RgbImage};
use macroquad::prelude::*;
use macroquad::Window;

pub struct Viewer {
    title: String,
    close_on_end: bool,
}

impl Viewer {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            close_on_end: true,
        }
    }

    /// 帧流结束后是否自动关闭窗口 (否则保留最后一帧直到用户关闭)
    pub fn close_on_end(mut self, close_on_end: bool) -> Self {
        self.close_on_end = close_on_end;
        self
    }

    /// 显示单张图片, 阻塞直到窗口关闭
    pub fn show_image(self, image: RgbImage) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let _ = tx.send(image);
        drop(tx);
        self.close_on_end(false).run(rx);
    }

    /// 显示帧流, 返回时窗口已关闭 (`rx` 随之释放, 发送端会收到 Disconnected)
    pub fn run(self, rx: Receiver<RgbImage>) {
        let Some(first) = rx.recv().ok() else {
            return;
        };

        let conf = Conf {
            window_title: self.title.clone(),
            window_width: first.width().min(1600) as i32,
            window_height: first.height().min(900) as i32,
            window_resizable: true,
            ..Default::default()
        };
        let close_on_end = self.close_on_end;

        Window::from_config(conf, async move {
            prevent_quit();
            let mut texture = to_texture(first);
            let mut ended = false;

            loop {
                if is_quit_requested() || is_key_pressed(KeyCode::Q) || is_key_pressed(KeyCode::Escape)
                {
                    break;
                }

                // 只显示最新一帧
                if !ended {
                    let mut latest = None;
                    loop {
                        match rx.try_recv() {
                            Ok(frame) => latest = Some(frame),
                            Err(TryRecvError::Empty) => break,
                            Err(TryRecvError::Disconnected) => {
                                ended = true;
                                break;
                            }
                        }
                    }
                    if let Some(frame) = latest {
                        texture = to_texture(frame);
                    }
                }
                if ended && close_on_end {
                    break;
                }

                clear_background(BLACK);
                let scale = (screen_width() / texture.width()).min(screen_height() / texture.height());
                let (w, h) = (texture.width() * scale, texture.height() * scale);
                draw_texture_ex(
                    &texture,
                    (screen_width() - w) / 2.0,
                    (screen_height() - h) / 2.0,
                    WHITE,
                    DrawTextureParams {
                        dest_size: Some(vec2(w, h)),
                        ..Default::default()
                    },
                );
                next_frame().await;
            }
            drop(rx);
        });
    }
}

fn to_texture(frame: RgbImage) -> Texture2D {
    let rgba = DynamicImage::ImageRgb8(frame).to_rgba8();
    let texture = Texture2D::from_rgba8(rgba.width() as u16, rgba.height() as u16, rgba.as_raw());
    texture.set_filter(FilterMode::Linear);
    texture
}
