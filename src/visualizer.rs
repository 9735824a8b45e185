// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测结果绘制 (Visualizer)
//!
//! 在图片副本上绘制检测框、标签底色与 `"{label} {conf:.2}"` 文字.
//! 标签画在框左上角上方, 不做边界修正: 贴近图片顶部的框, 其标签会被画布裁掉.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::config::VisualizerConfig;
use crate::detection::DetectionResult;

/// 未知类别使用的中性色
pub const DEFAULT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// 标签文字颜色
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// 默认字体 (缓存在用户配置目录下)
pub const FONT_NAME: &str = "Arial.ttf";
const FONT_URL: &str = "https://ultralytics.com/assets/";

#[derive(Clone)]
pub struct Visualizer {
    class_colors: HashMap<String, Rgb<u8>>,
    line_width: u32,
    font: Option<FontArc>,
    scale: PxScale,
}

impl std::fmt::Debug for Visualizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visualizer")
            .field("class_colors", &self.class_colors)
            .field("line_width", &self.line_width)
            .field("font", &self.font.is_some())
            .finish()
    }
}

impl Visualizer {
    /// 仅绘制检测框 (无字体时不绘制标签)
    pub fn new(class_colors: &BTreeMap<String, [u8; 3]>) -> Self {
        Self {
            class_colors: class_colors
                .iter()
                .map(|(k, v)| (k.clone(), Rgb(*v)))
                .collect(),
            line_width: 2,
            font: None,
            scale: PxScale::from(20.0),
        }
    }

    /// 按配置创建, 字体优先取配置路径, 其次取本地缓存的默认字体
    pub fn from_config(config: &VisualizerConfig) -> Self {
        let vis = Self::new(&config.colors).with_line_width(config.line_width);
        let font_path = config.font.clone().or_else(|| {
            default_font_path()
                .ok()
                .filter(|p| p.exists())
        });
        match font_path {
            Some(path) => match load_font(&path) {
                Ok(font) => vis.with_font(font, config.font_size),
                Err(e) => {
                    log::warn!("⚠️ 字体加载失败 {}: {}, 标签将不绘制", path.display(), e);
                    vis
                }
            },
            None => {
                log::warn!("⚠️ 未找到字体, 标签将不绘制");
                vis
            }
        }
    }

    pub fn with_font(mut self, font: FontArc, size: f32) -> Self {
        self.font = Some(font);
        self.scale = PxScale::from(size);
        self
    }

    pub fn with_line_width(mut self, line_width: u32) -> Self {
        self.line_width = line_width.max(1);
        self
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 类别颜色, 未知类别返回默认色
    pub fn color(&self, label: &str) -> Rgb<u8> {
        self.class_colors.get(label).copied().unwrap_or(DEFAULT_COLOR)
    }

    /// 绘制检测框与标签, 返回新图片 (输入不变)
    pub fn draw_boxes(
        &self,
        image: &RgbImage,
        boxes: &[[f32; 4]],
        labels: &[String],
        confidences: Option<&[f32]>,
    ) -> RgbImage {
        let mut img = image.clone();

        for (i, (bbox, label)) in boxes.iter().zip(labels).enumerate() {
            let [x_min, y_min, x_max, y_max] = bbox.map(|v| v as i32);
            let color = self.color(label);

            // 边框: 第0层与检测框重合, 其余向外扩
            for t in 0..self.line_width as i32 {
                let w = (x_max - x_min + 1 + 2 * t).max(1) as u32;
                let h = (y_max - y_min + 1 + 2 * t).max(1) as u32;
                draw_hollow_rect_mut(&mut img, Rect::at(x_min - t, y_min - t).of_size(w, h), color);
            }

            let Some(font) = &self.font else {
                continue;
            };

            let text = label_text(label, confidences.and_then(|c| c.get(i)).copied());

            // 标签底色 + 文字
            let (text_w, text_h) = text_size(self.scale, font, &text);
            let bg_h = text_h + 10;
            draw_filled_rect_mut(
                &mut img,
                Rect::at(x_min, y_min - bg_h as i32).of_size(text_w.max(1), bg_h),
                color,
            );
            draw_text_mut(
                &mut img,
                TEXT_COLOR,
                x_min,
                y_min - text_h as i32 - 5,
                self.scale,
                font,
                &text,
            );
        }

        img
    }

    pub fn draw(&self, image: &RgbImage, result: &DetectionResult) -> RgbImage {
        self.draw_boxes(
            image,
            result.boxes(),
            result.labels(),
            Some(result.confidences()),
        )
    }
}

/// 标签文字: `"{label} {conf:.2}"`, 无置信度时只有类别名
pub fn label_text(label: &str, confidence: Option<f32>) -> String {
    match confidence {
        Some(conf) => format!("{} {:.2}", label, conf),
        None => label.to_string(),
    }
}

pub fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = fs::read(path)?;
    Ok(FontArc::try_from_vec(bytes)?)
}

fn default_font_path() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("no user config directory"))?
        .join("Ultralytics");
    Ok(dir.join(FONT_NAME))
}

/// 检查默认字体, 不存在时下载到用户配置目录
pub fn check_font(name: &str) -> Result<PathBuf> {
    let path = default_font_path()?.with_file_name(name);
    if path.exists() {
        return Ok(path);
    }

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let src_url = format!("{}{}", FONT_URL, name);
    log::info!("⬇️ 下载字体 {} → {}", src_url, path.display());
    let resp = ureq::get(&src_url).call()?;
    let mut buffer = Vec::new();
    resp.into_reader().read_to_end(&mut buffer)?;
    fs::write(&path, buffer)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_class_colors;

    const GREEN: Rgb<u8> = Rgb([0, 255, 128]);
    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    fn visualizer() -> Visualizer {
        Visualizer::new(&default_class_colors()).with_line_width(1)
    }

    #[test]
    fn test_box_corners_match_input() {
        let canvas = RgbImage::new(100, 100);
        let out = visualizer().draw_boxes(
            &canvas,
            &[[10.7, 10.2, 50.9, 50.5]],
            &["with helmet".to_string()],
            Some(&[0.9]),
        );

        for (x, y) in [(10, 10), (50, 10), (10, 50), (50, 50), (30, 10), (10, 30)] {
            assert_eq!(out.get_pixel(x, y), &GREEN, "pixel ({x}, {y})");
        }
        assert_eq!(out.get_pixel(30, 30), &BLACK);
        assert_eq!(out.get_pixel(9, 9), &BLACK);
        assert_eq!(out.get_pixel(51, 51), &BLACK);
        // 输入不被修改
        assert!(canvas.pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn test_unknown_label_uses_default_color() {
        let vis = visualizer();
        assert_eq!(vis.color("helmet?"), DEFAULT_COLOR);
        assert_eq!(vis.color("rider"), Rgb([51, 255, 255]));

        let out = vis.draw_boxes(&RgbImage::new(20, 20), &[[2., 2., 8., 8.]], &["dog".to_string()], None);
        assert_eq!(out.get_pixel(2, 2), &DEFAULT_COLOR);
    }

    #[test]
    fn test_line_width_grows_outward() {
        let vis = visualizer().with_line_width(3);
        let out = vis.draw_boxes(
            &RgbImage::new(40, 40),
            &[[10., 10., 20., 20.]],
            &["rider".to_string()],
            None,
        );
        assert_eq!(out.get_pixel(8, 8), &Rgb([51, 255, 255]));
        assert_eq!(out.get_pixel(7, 7), &BLACK);
        assert_eq!(out.get_pixel(11, 11), &BLACK);
    }

    #[test]
    fn test_label_text() {
        assert_eq!(label_text("with helmet", Some(0.9)), "with helmet 0.90");
        assert_eq!(label_text("rider", Some(0.456)), "rider 0.46");
        assert_eq!(label_text("number plate", None), "number plate");
    }

    #[test]
    fn test_label_drawn_above_box() {
        let font_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/DejaVuSans.ttf");
        let font = load_font(&font_path).unwrap();
        let vis = visualizer().with_font(font.clone(), 20.0);
        assert!(vis.has_font());

        let (x_min, y_min) = (20u32, 60u32);
        let out = vis.draw_boxes(
            &RgbImage::new(240, 120),
            &[[x_min as f32, y_min as f32, 200., 110.]],
            &["with helmet".to_string()],
            Some(&[0.9]),
        );

        let (text_w, text_h) = text_size(PxScale::from(20.0), &font, "with helmet 0.90");
        let top = y_min - text_h - 10;
        let columns = x_min..x_min + text_w;
        // 文字从 y_min - text_h - 5 开始, 底色最上面 5 行不与文字重叠
        for y in top..top + 5 {
            for x in columns.clone() {
                assert_eq!(out.get_pixel(x, y), &GREEN, "pixel ({x}, {y})");
            }
        }
        // 底色一直延伸到检测框上沿
        for y in top..y_min {
            assert!(
                columns.clone().any(|x| out.get_pixel(x, y) == &GREEN),
                "row {y} has no label background"
            );
        }
        assert_eq!(out.get_pixel(x_min, top - 1), &BLACK);

        // 文字区域有非底色像素
        let has_text = (top + 5..y_min)
            .flat_map(|y| columns.clone().map(move |x| (x, y)))
            .any(|(x, y)| out.get_pixel(x, y) != &GREEN);
        assert!(has_text);
    }

    #[test]
    fn test_box_touching_top_edge() {
        let out = visualizer().draw_boxes(
            &RgbImage::new(30, 30),
            &[[0., 0., 29., 29.]],
            &["rider".to_string()],
            Some(&[0.5]),
        );
        assert_eq!(out.get_pixel(0, 0), &Rgb([51, 255, 255]));
        assert_eq!(out.get_pixel(29, 29), &Rgb([51, 255, 255]));
    }
}
