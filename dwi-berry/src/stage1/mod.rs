//! 第一阶段: 基于 U-Net 的切片分割.
//!
//! 每个切片的处理流程:
//!
//! 1. DWI 截断到 \[0, 5000\] 后除以 5000, ADC 截断到 \[-0.004, 0.008\] 后平移并除以 0.012.
//! 2. 将两者堆叠为双通道图像, 双线性插值缩放到 224x224, 转为 `(1, 2, 224, 224)` 张量.
//! 3. 调用网络, 输出以 0.5 二值化, 再以相同插值方式缩放回切片原尺寸.
//!
//! 缩放回原尺寸后的浮点掩膜 **不再** 二值化, 因此边缘处可能出现 (0, 1) 之间的值.

#[cfg(feature = "torch")]
mod torch;

#[cfg(feature = "torch")]
pub use torch::TorchSegmenter;

use crate::consts::{thresh, UNET_CHANNELS, UNET_INPUT_SIZE};
use crate::{AnalysisError, AnalysisResult, IntensityWindow, LesionPair};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, LumaA};
use ndarray::{Array2, Array4, ArrayView2};

/// 插值核. 三角核即双线性插值, 缩小时按比例扩大支撑域, 起到抗混叠作用.
const FILTER: FilterType = FilterType::Triangle;

/// 网络输出张量的形状.
const OUTPUT_DIM: (usize, usize, usize, usize) = (1, 1, UNET_INPUT_SIZE, UNET_INPUT_SIZE);

/// 切片分割网络.
///
/// 输入形状为 `(1, 2, 224, 224)`, 通道依次为归一化的 DWI 与 ADC;
/// 输出形状必须为 `(1, 1, 224, 224)`. 每次调用都拿到一份独立的输入张量.
pub trait SegmentationModel {
    /// 推理模式下的前向计算.
    fn forward(&self, input: Array4<f32>) -> AnalysisResult<Array4<f32>>;
}

impl<M: SegmentationModel + ?Sized> SegmentationModel for &M {
    #[inline]
    fn forward(&self, input: Array4<f32>) -> AnalysisResult<Array4<f32>> {
        (**self).forward(input)
    }
}

impl<M: SegmentationModel + ?Sized> SegmentationModel for Box<M> {
    #[inline]
    fn forward(&self, input: Array4<f32>) -> AnalysisResult<Array4<f32>> {
        (**self).forward(input)
    }
}

/// 将一对 DWI/ADC 切片转换为网络输入张量.
///
/// 张量的 `[0, c, i, j]` 对应缩放后图像第 `c` 通道的 `(x = i, y = j)` 处.
pub fn prepare_input(dwi: ArrayView2<f32>, adc: ArrayView2<f32>) -> AnalysisResult<Array4<f32>> {
    let (w, h) = dwi.dim();
    if adc.dim() != (w, h) {
        let (aw, ah) = adc.dim();
        return Err(AnalysisError::ShapeMismatch {
            dwi: (w, h, 1),
            adc: (aw, ah, 1),
        });
    }
    if w == 0 || h == 0 {
        return Err(AnalysisError::Inference(format!("无法缩放空切片 {:?}", (w, h))));
    }

    const DWI: IntensityWindow = IntensityWindow::dwi();
    const ADC: IntensityWindow = IntensityWindow::adc();
    let stacked = ImageBuffer::from_fn(w as u32, h as u32, |x, y| {
        let pos = (x as usize, y as usize);
        LumaA([DWI.eval(dwi[pos]), ADC.eval(adc[pos])])
    });
    let side = UNET_INPUT_SIZE as u32;
    let resized = imageops::resize(&stacked, side, side, FILTER);

    Ok(Array4::from_shape_fn(
        (1, UNET_CHANNELS, UNET_INPUT_SIZE, UNET_INPUT_SIZE),
        |(_, c, i, j)| resized.get_pixel(i as u32, j as u32).0[c],
    ))
}

/// 把网络输出以 0.5 二值化, 再缩放回 `(w, h)`.
pub fn restore_mask(output: &Array4<f32>, (w, h): (usize, usize)) -> AnalysisResult<Array2<f32>> {
    if output.dim() != OUTPUT_DIM {
        return Err(AnalysisError::Inference(format!(
            "分割网络输出形状为 {:?}, 期望 {OUTPUT_DIM:?}",
            output.dim()
        )));
    }
    let side = UNET_INPUT_SIZE as u32;
    let binary: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_fn(side, side, |i, j| {
        let p = output[(0, 0, i as usize, j as usize)];
        Luma([if p >= thresh::SEGMENT { 1.0 } else { 0.0 }])
    });
    let back = imageops::resize(&binary, w as u32, h as u32, FILTER);
    Ok(Array2::from_shape_fn((w, h), |(x, y)| {
        back.get_pixel(x as u32, y as u32).0[0]
    }))
}

/// 用单个网络分割一对切片, 得到与切片同形状的掩膜.
pub fn segment_slice<M: SegmentationModel + ?Sized>(
    model: &M,
    dwi: ArrayView2<f32>,
    adc: ArrayView2<f32>,
) -> AnalysisResult<Array2<f32>> {
    let input = prepare_input(dwi, adc)?;
    restore_mask(&model.forward(input)?, dwi.dim())
}

/// 用灌注、非灌注两个网络分割同一对切片.
///
/// 输入只预处理一次, 但两个网络各自拿到一份拷贝.
pub fn segment_slice_pair<M: SegmentationModel + ?Sized>(
    models: &LesionPair<&M>,
    dwi: ArrayView2<f32>,
    adc: ArrayView2<f32>,
) -> AnalysisResult<LesionPair<Array2<f32>>> {
    let input = prepare_input(dwi, adc)?;
    let perfusion = restore_mask(&models.perfusion.forward(input.clone())?, dwi.dim())?;
    let non_perfusion = restore_mask(&models.non_perfusion.forward(input)?, dwi.dim())?;
    Ok(LesionPair::new(perfusion, non_perfusion))
}
