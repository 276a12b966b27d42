//! 第二阶段: 逐体素概率分类.
//!
//! 分类器只处理候选体素 (见 [`crate::features`]), 非候选位置一律为 0.

mod forest;

pub use forest::{RandomForest, TreeNode};

use crate::{AnalysisError, AnalysisResult, Idx2d};
use ndarray::{Array1, Array2, ArrayView2};

/// 逐体素概率分类器.
///
/// 实现方需要保证调用期间只读, 同一实例可以被不同切片重复使用.
pub trait VoxelClassifier {
    /// 对 `features` 的每一行给出正类 (病灶) 概率. 返回值长度必须等于行数.
    fn predict_proba(&self, features: ArrayView2<f32>) -> AnalysisResult<Array1<f32>>;
}

impl<C: VoxelClassifier + ?Sized> VoxelClassifier for &C {
    #[inline]
    fn predict_proba(&self, features: ArrayView2<f32>) -> AnalysisResult<Array1<f32>> {
        (**self).predict_proba(features)
    }
}

impl<C: VoxelClassifier + ?Sized> VoxelClassifier for Box<C> {
    #[inline]
    fn predict_proba(&self, features: ArrayView2<f32>) -> AnalysisResult<Array1<f32>> {
        (**self).predict_proba(features)
    }
}

/// 对候选特征分类并以 `threshold` 二值化 (`p >= threshold` 记为 1).
///
/// 没有候选体素时返回 `Ok(None)`, 此时不会调用分类器.
pub fn classify<C: VoxelClassifier + ?Sized>(
    classifier: &C,
    features: ArrayView2<f32>,
    threshold: f32,
) -> AnalysisResult<Option<Array1<f32>>> {
    if features.nrows() == 0 {
        return Ok(None);
    }
    let proba = classifier.predict_proba(features)?;
    if proba.len() != features.nrows() {
        return Err(AnalysisError::Inference(format!(
            "分类器输出长度 {} 与候选个数 {} 不一致",
            proba.len(),
            features.nrows()
        )));
    }
    Ok(Some(proba.mapv_into(|p| if p >= threshold { 1.0 } else { 0.0 })))
}

/// 把预测结果填回形状为 `(w, h)` 的全 0 切片掩膜.
///
/// `preds` 为 `None` 时得到全 0 掩膜.
///
/// # 注意
///
/// `preds` 与 `positions` 长度不同, 或者位置越界时程序 panic.
pub fn assemble_slice_mask(
    shape: Idx2d,
    positions: &[Idx2d],
    preds: Option<&Array1<f32>>,
) -> Array2<f32> {
    let mut mask = Array2::zeros(shape);
    if let Some(preds) = preds {
        assert_eq!(positions.len(), preds.len());
        for (&pos, &p) in positions.iter().zip(preds) {
            mask[pos] = p;
        }
    }
    mask
}
