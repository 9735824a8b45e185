// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ONNX Runtime 推理后端
//!
//! 负责: 会话构建、执行提供者(EP)选择、张量输入输出转换

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use ndarray::{Array, IxDyn};
use ort::execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

/// 执行提供者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

impl FromStr for OrtEP {
    type Err = anyhow::Error;

    /// 支持 `cpu`, `cuda`, `cuda:1`, `trt`, `tensorrt:0`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        let (name, id) = match s.split_once(':') {
            Some((name, id)) => (
                name.to_string(),
                id.parse::<i32>()
                    .map_err(|_| anyhow!("invalid device id in `{}`", s))?,
            ),
            None => (s.clone(), 0),
        };
        match name.as_str() {
            "cpu" => Ok(OrtEP::CPU),
            "cuda" | "gpu" => Ok(OrtEP::CUDA(id)),
            "trt" | "tensorrt" => Ok(OrtEP::Trt(id)),
            _ => Err(anyhow!("unknown device `{}` (expected cpu, cuda[:id] or trt[:id])", s)),
        }
    }
}

/// 后端构建参数
#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: PathBuf,
    pub ep: OrtEP,
    pub image_size: (u32, u32), // (height, width)
    pub intra_threads: Option<usize>,
}

pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    height: u32,
    width: u32,
}

impl OrtBackend {
    pub fn build(config: OrtConfig) -> Result<Self> {
        let mut builder =
            Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
        if let Some(n) = config.intra_threads {
            builder = builder.with_intra_threads(n)?;
        }

        // 注册失败时 ORT 会自动回退到 CPU
        builder = match config.ep {
            OrtEP::CPU => builder,
            OrtEP::CUDA(id) => builder.with_execution_providers([
                CUDAExecutionProvider::default().with_device_id(id).build(),
            ])?,
            OrtEP::Trt(id) => builder.with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(id)
                    .build(),
                CUDAExecutionProvider::default().with_device_id(id).build(),
            ])?,
        };

        let session = builder.commit_from_file(&config.f)?;
        log::info!(
            "✅ ONNX模型加载成功: {} ({:?})",
            config.f.display(),
            config.ep
        );

        Ok(Self {
            session,
            ep: config.ep,
            height: config.image_size.0,
            width: config.image_size.1,
        })
    }

    /// 前向推理, 返回所有输出张量 (按模型输出顺序)
    pub fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        let t = std::time::Instant::now();
        let n_outputs = self.session.outputs.len();
        let input = Tensor::from_array(xs)?;
        let outputs = self.session.run(ort::inputs![input])?;
        if profile {
            log::debug!("[ORT Run]: {:?}", t.elapsed());
        }

        let mut ys = Vec::with_capacity(n_outputs);
        for i in 0..n_outputs {
            let (shape, data) = outputs[i].try_extract_tensor::<f32>()?;
            let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
            ys.push(Array::from_shape_vec(IxDyn(&dims), data.to_vec())?);
        }
        Ok(ys)
    }

    pub fn ep(&self) -> &OrtEP {
        &self.ep
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }
}
