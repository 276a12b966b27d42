//! 候选体素与邻域特征提取.
//!
//! 对第 `z` 层切片, 所有满足 `dwi[x, y, z] > 1000` 的位置都是候选体素.
//! 每个候选体素的特征由 27 个 DWI 邻域值和 27 个 ADC 邻域值依次拼接而成,
//! 越界邻居记为 0 (补零, 不做镜像或边缘复制).

mod neighbour;

pub use neighbour::{value_or_zero, Offset3d, NEIGHBOUR27};

use crate::consts::{thresh, FEATURE_LEN};
use crate::data::check_same_shape;
use crate::{AnalysisResult, Idx2d};
use ndarray::{Array2, ArrayView2, ArrayView3, Axis};
use neighbour::extend_neighbourhood;

/// 某一层切片的候选体素集合.
///
/// `features` 的第 `i` 行对应 `positions[i]`, 二者长度始终一致.
#[derive(Clone, Debug)]
pub struct Candidates {
    features: Array2<f32>,
    positions: Vec<Idx2d>,
}

impl Candidates {
    /// 候选体素个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// 是否没有候选体素.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// 特征矩阵, 形状为 `(候选个数, 54)`.
    #[inline]
    pub fn features(&self) -> ArrayView2<'_, f32> {
        self.features.view()
    }

    /// 候选位置 `(x, y)`, 按 x 在外、y 在内的顺序排列.
    #[inline]
    pub fn positions(&self) -> &[Idx2d] {
        &self.positions
    }

    /// 拆分为 (特征矩阵, 位置).
    #[inline]
    pub fn into_parts(self) -> (Array2<f32>, Vec<Idx2d>) {
        (self.features, self.positions)
    }

    fn from_buf(buf: Vec<f32>, positions: Vec<Idx2d>) -> Self {
        debug_assert_eq!(buf.len(), positions.len() * FEATURE_LEN);
        // 该操作不会生成 `Err`, 可直接 unwrap.
        let features = Array2::from_shape_vec((positions.len(), FEATURE_LEN), buf).unwrap();
        Self {
            features,
            positions,
        }
    }
}

/// 把 `(x, y, z)` 的 54 维特征追加到 `buf`: 先 DWI 邻域, 再 ADC 邻域.
#[inline]
fn push_feature(buf: &mut Vec<f32>, dwi: &ArrayView3<f32>, adc: &ArrayView3<f32>, pos: crate::Idx3d) {
    extend_neighbourhood(buf, dwi, pos);
    extend_neighbourhood(buf, adc, pos);
}

/// 按顺序提取第 `z` 层的候选体素与特征.
///
/// # 注意
///
/// `z` 越界时程序 panic.
pub fn extract_candidates_seq(
    dwi: ArrayView3<f32>,
    adc: ArrayView3<f32>,
    z: usize,
) -> AnalysisResult<Candidates> {
    check_same_shape(dwi, adc)?;
    let mut positions = Vec::new();
    let mut buf = Vec::new();
    // `indexed_iter` 按逻辑顺序遍历: x 在外, y 在内, 与内存布局无关.
    for ((x, y), &v) in dwi.index_axis(Axis(2), z).indexed_iter() {
        if v > thresh::CANDIDATE_DWI {
            push_feature(&mut buf, &dwi, &adc, (x, y, z));
            positions.push((x, y));
        }
    }
    Ok(Candidates::from_buf(buf, positions))
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};

        /// 借助 `rayon`, 按 x 行并行提取第 `z` 层的候选体素与特征.
        /// 结果 (包括顺序) 与 [`extract_candidates_seq`] 完全一致.
        ///
        /// # 注意
        ///
        /// `z` 越界时程序 panic.
        pub fn par_extract_candidates(
            dwi: ArrayView3<f32>,
            adc: ArrayView3<f32>,
            z: usize,
        ) -> AnalysisResult<Candidates> {
            check_same_shape(dwi, adc)?;
            let (w, h, _) = dwi.dim();
            assert!(z < dwi.dim().2, "切片索引越界");
            let rows: Vec<(Vec<f32>, Vec<Idx2d>)> = (0..w)
                .into_par_iter()
                .map(|x| {
                    let mut buf = Vec::new();
                    let mut positions = Vec::new();
                    for y in 0..h {
                        if dwi[(x, y, z)] > thresh::CANDIDATE_DWI {
                            push_feature(&mut buf, &dwi, &adc, (x, y, z));
                            positions.push((x, y));
                        }
                    }
                    (buf, positions)
                })
                .collect();

            let n = rows.iter().map(|(_, p)| p.len()).sum();
            let mut buf = Vec::with_capacity(n * FEATURE_LEN);
            let mut positions = Vec::with_capacity(n);
            for (b, p) in rows {
                buf.extend(b);
                positions.extend(p);
            }
            Ok(Candidates::from_buf(buf, positions))
        }

        /// 提取第 `z` 层的候选体素与特征. 打开 `rayon` feature 时按行并行.
        #[inline]
        pub fn extract_candidates(
            dwi: ArrayView3<f32>,
            adc: ArrayView3<f32>,
            z: usize,
        ) -> AnalysisResult<Candidates> {
            par_extract_candidates(dwi, adc, z)
        }
    } else {
        /// 提取第 `z` 层的候选体素与特征. 打开 `rayon` feature 时按行并行.
        #[inline]
        pub fn extract_candidates(
            dwi: ArrayView3<f32>,
            adc: ArrayView3<f32>,
            z: usize,
        ) -> AnalysisResult<Candidates> {
            extract_candidates_seq(dwi, adc, z)
        }
    }
}
