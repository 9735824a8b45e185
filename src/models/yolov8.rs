// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型实现
// 包含: 模型加载、预处理、推理、后处理(解码 + NMS)

use std::path::PathBuf;

use anyhow::{bail, Result};
use image::{DynamicImage, GenericImageView};
use ndarray::{s, Array, ArrayView2, Axis, Ix2, IxDyn};

use super::{InferenceParams, Model};
use crate::detection::{RawDetection, RawOutput};
use crate::{non_max_suppression, OrtBackend, OrtConfig, OrtEP};

/// 每张图片最多保留的检测框数
pub const MAX_DET: usize = 300;

/// YOLOv8 构建参数
#[derive(Debug, Clone)]
pub struct YOLOv8Config {
    pub model: PathBuf,
    pub ep: OrtEP,
    pub imgsz: u32,
    pub max_det: usize,
    pub profile: bool,
}

impl YOLOv8Config {
    pub fn new(model: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            ep: OrtEP::CPU,
            imgsz: 640,
            max_det: MAX_DET,
            profile: false,
        }
    }
}

/// YOLOv8 完整模型结构
pub struct YOLOv8 {
    engine: OrtBackend,
    height: u32,
    width: u32,
    max_det: usize,
    profile: bool,
}

impl YOLOv8 {
    /// 从配置创建 YOLOv8 模型
    pub fn new(config: YOLOv8Config) -> Result<Self> {
        // build ort engine
        let ort_args = OrtConfig {
            f: config.model,
            ep: config.ep,
            image_size: (config.imgsz, config.imgsz),
            intra_threads: None,
        };
        let engine = OrtBackend::build(ort_args)?;
        let (height, width) = (engine.height(), engine.width());

        Ok(Self {
            engine,
            height,
            width,
            max_det: config.max_det,
            profile: config.profile,
        })
    }

    fn scale_wh(&self, w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
        let r = (w1 / w0).min(h1 / h0);
        (r, (w0 * r).round(), (h0 * r).round())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// 解码单张图片的 YOLOv8 检测头输出
///
/// `preds` 形状为 `[4 + nc, anchors]`, 每列为 `cx, cy, w, h, cls_0..cls_nc`.
/// 坐标按 `ratio` 还原到原图并裁剪到 `(w0, h0)` 内, 不高于 `params.conf`
/// 的框被丢弃, 其余做按类别的 NMS, 最多保留 `max_det` 个.
pub fn decode(
    preds: ArrayView2<f32>,
    ratio: f32,
    (w0, h0): (f32, f32),
    params: &InferenceParams,
    max_det: usize,
) -> Vec<RawDetection> {
    const CXYWH_OFFSET: usize = 4;

    let mut data: Vec<RawDetection> = Vec::new();
    if preds.nrows() <= CXYWH_OFFSET {
        return data;
    }

    for pred in preds.axis_iter(Axis(1)) {
        let bbox = pred.slice(s![0..CXYWH_OFFSET]);
        let clss = pred.slice(s![CXYWH_OFFSET..]);

        let Some((id, &confidence)) = clss
            .iter()
            .enumerate()
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
        else {
            continue;
        };

        // 严格大于阈值, NaN 同样被过滤
        if !(confidence > params.conf) {
            continue;
        }

        let cx = bbox[0] / ratio;
        let cy = bbox[1] / ratio;
        let w = bbox[2] / ratio;
        let h = bbox[3] / ratio;
        let x1 = (cx - w / 2.).clamp(0.0, w0);
        let y1 = (cy - h / 2.).clamp(0.0, h0);
        let x2 = (cx + w / 2.).clamp(0.0, w0);
        let y2 = (cy + h / 2.).clamp(0.0, h0);

        data.push(RawDetection::new([x1, y1, x2, y2], id, confidence));
    }

    non_max_suppression(&mut data, params.iou);
    data.truncate(max_det);
    data
}

// 实现统一的 Model trait
impl Model for YOLOv8 {
    fn preprocess(&mut self, xs: &[DynamicImage]) -> Result<Array<f32, IxDyn>> {
        let mut ys =
            Array::ones((xs.len(), 3, self.height() as usize, self.width() as usize)).into_dyn();
        ys.fill(144.0 / 255.0);
        for (idx, x) in xs.iter().enumerate() {
            let (w0, h0) = x.dimensions();
            if w0 == 0 || h0 == 0 {
                bail!("empty image ({}x{})", w0, h0);
            }
            let (_, w_new, h_new) = self.scale_wh(
                w0 as f32,
                h0 as f32,
                self.width() as f32,
                self.height() as f32,
            );
            let img = x.resize_exact(
                w_new as u32,
                h_new as u32,
                image::imageops::FilterType::Triangle,
            );

            for (x, y, rgb) in img.pixels() {
                let x = x as usize;
                let y = y as usize;
                let [r, g, b, _] = rgb.0;
                ys[[idx, 0, y, x]] = (r as f32) / 255.0;
                ys[[idx, 1, y, x]] = (g as f32) / 255.0;
                ys[[idx, 2, y, x]] = (b as f32) / 255.0;
            }
        }

        Ok(ys)
    }

    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        self.engine.run(xs, self.profile)
    }

    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[DynamicImage],
        params: &InferenceParams,
    ) -> Result<Vec<RawOutput>> {
        let Some(preds) = xs.first() else {
            bail!("model produced no outputs");
        };
        if preds.ndim() != 3 || preds.shape()[0] != xs0.len() {
            bail!(
                "unexpected output shape {:?} for a batch of {}",
                preds.shape(),
                xs0.len()
            );
        }

        let mut ys = Vec::with_capacity(xs0.len());
        for (idx, anchor) in preds.axis_iter(Axis(0)).enumerate() {
            let anchor = anchor.into_dimensionality::<Ix2>()?;
            // [anchors, 4 + nc] 格式的导出需要转置
            let anchor = if anchor.nrows() > anchor.ncols() {
                anchor.reversed_axes()
            } else {
                anchor
            };

            let width_original = xs0[idx].width() as f32;
            let height_original = xs0[idx].height() as f32;
            let ratio = (self.width() as f32 / width_original)
                .min(self.height() as f32 / height_original);

            let detections = decode(
                anchor,
                ratio,
                (width_original, height_original),
                params,
                self.max_det,
            );
            ys.push(RawOutput::new(detections));
        }

        Ok(ys)
    }

    /// ONNX 导出默认为 batch=1, 批量输入时逐张推理
    fn forward(
        &mut self,
        images: &[DynamicImage],
        params: &InferenceParams,
    ) -> Result<Vec<RawOutput>> {
        let mut ys = Vec::with_capacity(images.len());
        for image in images {
            let xs0 = std::slice::from_ref(image);

            let t_pre = std::time::Instant::now();
            let xs = self.preprocess(xs0)?;
            if self.profile {
                log::debug!("[Model Preprocess]: {:?}", t_pre.elapsed());
            }

            let t_run = std::time::Instant::now();
            let outputs = self.run(xs)?;
            if self.profile {
                log::debug!("[Model Inference]: {:?}", t_run.elapsed());
            }

            let t_post = std::time::Instant::now();
            ys.extend(self.postprocess(outputs, xs0, params)?);
            if self.profile {
                log::debug!("[Model Postprocess]: {:?}", t_post.elapsed());
            }
        }
        Ok(ys)
    }

    fn summary(&self) {
        log::info!(
            "\nSummary:\n\
            > Task: Detect\n\
            > EP: {:?} {}\n\
            > Height: {}, Width: {}\n\
            > max_det: {}\n",
            self.engine.ep(),
            if let OrtEP::CPU = self.engine.ep() {
                ""
            } else {
                "(May still fall back to CPU)"
            },
            self.height(),
            self.width(),
            self.max_det,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    const PARAMS: InferenceParams = InferenceParams {
        conf: 0.25,
        iou: 0.45,
    };

    // 每列: cx, cy, w, h, cls0, cls1
    fn preds(columns: &[[f32; 6]]) -> Array2<f32> {
        let mut arr = Array2::zeros((6, columns.len()));
        for (j, col) in columns.iter().enumerate() {
            for (i, v) in col.iter().enumerate() {
                arr[[i, j]] = *v;
            }
        }
        arr
    }

    #[test]
    fn test_decode_threshold_and_nms() {
        let arr = preds(&[
            [20., 20., 20., 20., 0.9, 0.1],
            [21., 20., 20., 20., 0.8, 0.1], // 与第一个重叠, 同类 → 抑制
            [100., 100., 10., 10., 0.05, 0.1], // 低于阈值
        ]);
        let ys = decode(arr.view(), 1.0, (640., 640.), &PARAMS, MAX_DET);
        assert_eq!(ys.len(), 1);
        assert_eq!(ys[0].bbox, [10., 10., 30., 30.]);
        assert_eq!(ys[0].class_id, 0);
        assert!((ys[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_decode_score_at_threshold_is_dropped() {
        let arr = preds(&[
            [20., 20., 10., 10., 0.25, 0.0],
            [200., 200., 10., 10., 0.2501, 0.0],
            [400., 400., 10., 10., f32::NAN, 0.0],
        ]);
        let ys = decode(arr.view(), 1.0, (640., 640.), &PARAMS, MAX_DET);
        assert_eq!(ys.len(), 1);
        assert!((ys[0].confidence - 0.2501).abs() < 1e-6);
    }

    #[test]
    fn test_decode_class_aware_nms() {
        let arr = preds(&[
            [20., 20., 20., 20., 0.9, 0.1],
            [20., 20., 20., 20., 0.1, 0.7], // 同位置不同类 → 保留
        ]);
        let ys = decode(arr.view(), 1.0, (640., 640.), &PARAMS, MAX_DET);
        assert_eq!(ys.len(), 2);
        assert_eq!(ys[1].class_id, 1);
    }

    #[test]
    fn test_decode_rescale_and_clip() {
        // 1280x960 原图在 640 输入上 ratio = 0.5
        let arr = preds(&[[10., 10., 40., 40., 0.6, 0.0]]);
        let ys = decode(arr.view(), 0.5, (1280., 960.), &PARAMS, MAX_DET);
        assert_eq!(ys.len(), 1);
        // cx=20, w=80 → x1 = -20 裁剪到 0
        assert_eq!(ys[0].bbox, [0., 0., 60., 60.]);
    }

    #[test]
    fn test_decode_max_det() {
        let arr = preds(&[
            [20., 20., 10., 10., 0.9, 0.0],
            [200., 200., 10., 10., 0.8, 0.0],
            [400., 400., 10., 10., 0.7, 0.0],
        ]);
        let ys = decode(arr.view(), 1.0, (640., 640.), &PARAMS, 2);
        assert_eq!(ys.len(), 2);
        assert!(ys[0].confidence > ys[1].confidence);
    }
}
