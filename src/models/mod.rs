// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 模型统一接口与实现
///
/// # 架构说明
///
/// Detector 只依赖 `Model` trait, 推理细节(预处理、ONNX推理、解码、NMS)
/// 全部封装在具体模型中. 目前提供:
/// - **YOLOv8**: ONNX Runtime 推理 + YOLOv8 检测头解码, 文件: `yolov8.rs`
///
/// ## Model Trait
/// 统一的模型接口，定义标准流程: preprocess → run → postprocess
///
/// ## 使用示例
/// ```no_run
/// use helmet_rs::models::{InferenceParams, Model, YOLOv8, YOLOv8Config};
///
/// # fn main() -> anyhow::Result<()> {
/// let mut model = YOLOv8::new(YOLOv8Config::new("models/best.onnx"))?;
/// let image = image::open("input/images/test.jpg")?;
/// let params = InferenceParams { conf: 0.25, iou: 0.45 };
/// let outputs = model.forward(&[image], &params)?;
/// # Ok(())
/// # }
/// ```
use anyhow::Result;
use image::DynamicImage;
use ndarray::{Array, IxDyn};

use crate::detection::RawOutput;

/// 推理阈值 (每次调用时由 Detector 传入)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceParams {
    pub conf: f32,
    pub iou: f32,
}

/// 统一的深度学习模型接口
///
/// ## 核心流程
/// ```text
/// 原始图片 → preprocess → ndarray张量
///          ↓
///     推理引擎 run
///          ↓
///     原始输出 → postprocess → RawOutput (已完成阈值过滤与NMS)
/// ```
pub trait Model {
    /// 预处理: 图片 → NCHW 张量
    fn preprocess(&mut self, images: &[DynamicImage]) -> Result<Array<f32, IxDyn>>;

    /// 推理: 执行模型前向传播, 返回原始输出
    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>>;

    /// 后处理: 原始输出 → 每张图片一个 RawOutput
    ///
    /// # Arguments
    /// * `xs` - 模型原始输出
    /// * `xs0` - 原始图片(用于坐标还原)
    /// * `params` - 置信度/IOU阈值
    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[DynamicImage],
        params: &InferenceParams,
    ) -> Result<Vec<RawOutput>>;

    /// 完整的推理流程: preprocess → run → postprocess
    ///
    /// 返回值与 `images` 一一对应
    fn forward(
        &mut self,
        images: &[DynamicImage],
        params: &InferenceParams,
    ) -> Result<Vec<RawOutput>> {
        let xs = self.preprocess(images)?;
        let ys = self.run(xs)?;
        self.postprocess(ys, images, params)
    }

    /// 打印模型信息
    fn summary(&self) {}
}

pub mod yolov8; // YOLOv8 完整模型 + 实现 Model trait

pub use yolov8::{YOLOv8, YOLOv8Config};
