//! TorchScript 格式的分割网络.

use super::SegmentationModel;
use crate::{AnalysisError, AnalysisResult};
use ndarray::Array4;
use std::path::Path;
use tch::{CModule, Device, Kind, Tensor};

/// 通过 libtorch 加载的 TorchScript 分割网络. 有 CUDA 时使用 GPU.
pub struct TorchSegmenter {
    module: CModule,
    device: Device,
}

fn inference_err(e: tch::TchError) -> AnalysisError {
    AnalysisError::Inference(e.to_string())
}

impl TorchSegmenter {
    /// 从 `.pt` 文件加载, 并切换到推理模式.
    pub fn open<P: AsRef<Path>>(path: P) -> AnalysisResult<Self> {
        let path = path.as_ref();
        let device = Device::cuda_if_available();
        let mut module = CModule::load_on_device(path, device)
            .map_err(|e| AnalysisError::InvalidArtifact(format!("{}: {e}", path.display())))?;
        module.set_eval();
        log::debug!("loaded segmentation network {} on {device:?}", path.display());
        Ok(Self { module, device })
    }
}

impl SegmentationModel for TorchSegmenter {
    fn forward(&self, input: Array4<f32>) -> AnalysisResult<Array4<f32>> {
        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let data = input.into_raw_vec();
        let input = Tensor::from_slice(&data)
            .reshape(shape.as_slice())
            .to_device(self.device);

        let output = tch::no_grad(|| self.module.forward_ts(&[input])).map_err(inference_err)?;
        let output = output
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .contiguous();

        let dim = match output.size().as_slice() {
            &[a, b, c, d] => (a as usize, b as usize, c as usize, d as usize),
            other => {
                return Err(AnalysisError::Inference(format!(
                    "分割网络输出维度为 {other:?}, 期望 4 维"
                )))
            }
        };
        let mut buf = vec![0f32; output.numel()];
        output.copy_data(&mut buf, buf.len());
        Array4::from_shape_vec(dim, buf).map_err(|e| AnalysisError::Inference(e.to_string()))
    }
}
