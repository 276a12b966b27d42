//! 评测: 将预测结果与人工标注的 ROI 比较.
//!
//! 只统计 `DWI > 1000` 的体素. 预测值严格大于 0.15 记为阳性, ROI 非 0 记为阳性.
//! AUC 直接使用连续的预测值.

use crate::consts::thresh;
use crate::{round2, AnalysisError, AnalysisResult, Idx3d, LesionKind};
use itertools::izip;
use ndarray::ArrayView3;
use ordered_float::OrderedFloat;

/// 混淆矩阵.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Confusion {
    /// 真阳性.
    pub tp: usize,
    /// 假阳性.
    pub fp: usize,
    /// 真阴性.
    pub tn: usize,
    /// 假阴性.
    pub fn_: usize,
}

impl Confusion {
    /// 参与统计的体素个数.
    #[inline]
    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    #[inline]
    fn ratio(num: usize, den: usize) -> Option<f64> {
        (den > 0).then(|| num as f64 / den as f64)
    }

    /// `TP / (TP + FN)`.
    pub fn sensitivity(&self) -> Option<f64> {
        Self::ratio(self.tp, self.tp + self.fn_)
    }

    /// `TN / (FP + TN)`.
    pub fn specificity(&self) -> Option<f64> {
        Self::ratio(self.tn, self.fp + self.tn)
    }

    /// `(TP + TN) / 总数`.
    pub fn accuracy(&self) -> Option<f64> {
        Self::ratio(self.tp + self.tn, self.total())
    }
}

/// 评测结果. 分母为 0 或者只有一类样本时, 对应指标为 `None`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EvalReport {
    /// 混淆矩阵.
    pub confusion: Confusion,

    /// 准确率.
    pub accuracy: Option<f64>,

    /// 特异度.
    pub specificity: Option<f64>,

    /// 灵敏度.
    pub sensitivity: Option<f64>,

    /// ROC 曲线下面积.
    pub auc: Option<f64>,
}

#[inline]
fn metric_to_display(m: Option<f64>) -> String {
    match m {
        // `{:?}` 让 1.0 显示为 `1.0` 而不是 `1`.
        Some(v) => format!("{:?}", round2(v)),
        None => "/".to_string(),
    }
}

impl EvalReport {
    /// 面向医生的一句话描述, 数值保留两位小数, 无定义的指标显示为 `/`.
    pub fn describe(&self, kind: LesionKind) -> String {
        format!(
            "与真实结果相比，{}数据模型预测结果准确率为{}，特异度为{}，灵敏度为{}，AUC为{}",
            kind.display_name(),
            metric_to_display(self.accuracy),
            metric_to_display(self.specificity),
            metric_to_display(self.sensitivity),
            metric_to_display(self.auc),
        )
    }
}

/// 检查 `found` 与 DWI 形状 `expected` 一致.
#[inline]
fn check_dim(name: &'static str, found: Idx3d, expected: Idx3d) -> AnalysisResult<()> {
    if found == expected {
        Ok(())
    } else {
        Err(AnalysisError::VolumeMismatch {
            name,
            expected,
            found,
        })
    }
}

/// 评测 `pred` 相对 `roi` 的表现. 三个体数据形状必须一致.
pub fn evaluate(
    roi: ArrayView3<f32>,
    pred: ArrayView3<f32>,
    dwi: ArrayView3<f32>,
) -> AnalysisResult<EvalReport> {
    check_dim("ROI", roi.dim(), dwi.dim())?;
    check_dim("预测结果", pred.dim(), dwi.dim())?;

    let mut confusion = Confusion::default();
    let mut scored = Vec::new();
    for (&gt, &p, &d) in izip!(roi.iter(), pred.iter(), dwi.iter()) {
        if d <= thresh::CANDIDATE_DWI {
            continue;
        }
        let truth = gt != 0.0;
        match (truth, p > thresh::EVAL) {
            (true, true) => confusion.tp += 1,
            (true, false) => confusion.fn_ += 1,
            (false, true) => confusion.fp += 1,
            (false, false) => confusion.tn += 1,
        }
        scored.push((p, truth));
    }
    log::debug!("evaluated {} voxels: {confusion:?}", confusion.total());

    Ok(EvalReport {
        confusion,
        accuracy: confusion.accuracy(),
        specificity: confusion.specificity(),
        sensitivity: confusion.sensitivity(),
        auc: auc(&mut scored),
    })
}

/// 由 (得分, 真值) 计算 AUC, 即 Mann-Whitney U 统计量除以正负样本对数.
/// 相同得分取平均秩. 只有一类样本时返回 `None`.
pub fn auc(scored: &mut [(f32, bool)]) -> Option<f64> {
    let n_pos = scored.iter().filter(|(_, t)| *t).count();
    let n_neg = scored.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    scored.sort_unstable_by_key(|&(s, _)| OrderedFloat(s));
    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < scored.len() {
        let mut j = i + 1;
        while j < scored.len() && scored[j].0 == scored[i].0 {
            j += 1;
        }
        // 秩从 1 开始, [i, j) 的平均秩为 (i + 1 + j) / 2.
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        let pos = scored[i..j].iter().filter(|(_, t)| *t).count();
        rank_sum += avg_rank * pos as f64;
        i = j;
    }

    let (n_pos, n_neg) = (n_pos as f64, n_neg as f64);
    Some((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}
