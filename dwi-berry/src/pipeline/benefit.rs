//! 治疗获益指标.
//!
//! 指标为 `max(0, 非灌注 / 灌注 * 100 - 100)`. 仅第二阶段模式下按体素值求和,
//! 联合模式下按大于 0.2 的体素计数.

use crate::{AnalysisError, AnalysisResult};
use ndarray::ArrayView3;

/// 由分子分母计算获益. 分母为 0 时返回 [`AnalysisError::DivisionUndefined`].
pub fn benefit(non_perfusion: f64, perfusion: f64) -> AnalysisResult<f64> {
    if perfusion == 0.0 {
        return Err(AnalysisError::DivisionUndefined);
    }
    Ok((non_perfusion / perfusion * 100.0 - 100.0).max(0.0))
}

/// 按体素值之和计算获益.
pub fn benefit_by_sum(
    perfusion: ArrayView3<f32>,
    non_perfusion: ArrayView3<f32>,
) -> AnalysisResult<f64> {
    let sum = |a: ArrayView3<f32>| a.iter().map(|&v| v as f64).sum::<f64>();
    benefit(sum(non_perfusion), sum(perfusion))
}

/// 按严格大于 `threshold` 的体素个数计算获益.
pub fn benefit_by_count(
    perfusion: ArrayView3<f32>,
    non_perfusion: ArrayView3<f32>,
    threshold: f32,
) -> AnalysisResult<f64> {
    let count = |a: ArrayView3<f32>| a.iter().filter(|&&v| v > threshold).count() as f64;
    benefit(count(non_perfusion), count(perfusion))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_never_negative() {
        assert_eq!(benefit(10.0, 20.0).unwrap(), 0.0);
        assert_eq!(benefit(0.0, 20.0).unwrap(), 0.0);
        assert_eq!(benefit(30.0, 20.0).unwrap(), 50.0);
        assert_eq!(benefit(20.0, 20.0).unwrap(), 0.0);
    }

    #[test]
    fn test_zero_denominator() {
        assert!(matches!(
            benefit(1.0, 0.0),
            Err(AnalysisError::DivisionUndefined)
        ));
    }

    #[test]
    fn test_sum_and_count() {
        let mut perf = Array3::<f32>::zeros((2, 2, 1));
        let mut nonperf = Array3::<f32>::zeros((2, 2, 1));
        perf[(0, 0, 0)] = 1.0;
        perf[(1, 1, 0)] = 0.1;
        nonperf.fill(0.55);

        // 2.2 / 1.1
        let b = benefit_by_sum(perf.view(), nonperf.view()).unwrap();
        assert!((b - 100.0).abs() < 1e-4);

        // 4 / 1
        let b = benefit_by_count(perf.view(), nonperf.view(), 0.2).unwrap();
        assert_eq!(b, 300.0);
    }
}
