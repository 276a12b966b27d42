//! 流水线编排.
//!
//! 两种模式:
//!
//! 1. `Random Forest`: 仅第二阶段. 逐切片提取候选并分类, 进度为 `(z + 1) / depth * 100`.
//! 2. `Random Forest+U-Net`: 先对所有切片运行第一阶段 (进度 `(z + 1) / depth * 50`),
//!   再逐切片运行第二阶段并与同切片、同类型的第一阶段掩膜逐元素相乘
//!   (进度 `(z + 1) / depth * 50 + 50`).
//!
//! 两种模式结束时都会发出 [`Progress::Done`].

mod benefit;
mod cancel;
mod progress;

pub use benefit::{benefit, benefit_by_count, benefit_by_sum};
pub use cancel::CancelToken;
pub use progress::{Callback, LogProgress, Progress, ProgressSink};

use crate::consts::{thresh, MODE_RANDOM_FOREST, MODE_RANDOM_FOREST_UNET};
use crate::data::check_same_shape;
use crate::features::extract_candidates;
use crate::stage1::{segment_slice_pair, SegmentationModel};
use crate::stage2::{assemble_slice_mask, classify, VoxelClassifier};
use crate::{round2, AnalysisError, AnalysisResult, LesionPair};
use ndarray::{Array2, Array3, ArrayView3, Axis, Zip};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// 分析模式.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Mode {
    /// 仅第二阶段.
    RandomForest,

    /// 第一阶段 + 第二阶段.
    RandomForestUnet,
}

impl Mode {
    /// 模式名称, 即外部传入的字符串.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RandomForest => MODE_RANDOM_FOREST,
            Self::RandomForestUnet => MODE_RANDOM_FOREST_UNET,
        }
    }
}

impl FromStr for Mode {
    type Err = AnalysisError;

    /// 只接受完全相同的两个字符串, 不忽略大小写或空白.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            MODE_RANDOM_FOREST => Ok(Self::RandomForest),
            MODE_RANDOM_FOREST_UNET => Ok(Self::RandomForestUnet),
            other => Err(AnalysisError::InvalidMode(other.to_owned())),
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次分析的结果.
#[derive(Clone, Debug)]
pub struct Analysis {
    /// 两类病灶的结果体数据, 形状与输入相同.
    pub volumes: LesionPair<Array3<f32>>,

    /// 获益指标, 非负. 分母为 0 时记为 0.
    pub benefit: f64,
}

impl Analysis {
    /// 两类病灶中不小于展示阈值 (0.2) 的体素个数.
    pub fn lesion_voxels(&self) -> LesionPair<usize> {
        self.volumes
            .as_ref()
            .map(|v| v.iter().filter(|&&p| p >= thresh::DISPLAY).count())
    }

    /// 保留两位小数的获益指标.
    #[inline]
    pub fn benefit_rounded(&self) -> f64 {
        round2(self.benefit)
    }

    /// 以展示阈值 (0.2) 二值化后的结果, 用于前端显示.
    pub fn display_masks(&self) -> LesionPair<Array3<f32>> {
        self.volumes
            .as_ref()
            .map(|v| v.mapv(|p| if p >= thresh::DISPLAY { 1.0 } else { 0.0 }))
    }
}

/// 分析流水线. 持有分类器和分割网络的引用, 本身不拥有模型.
///
/// 同一个 `Pipeline` 一次只能运行一个分析. 需要并发时请使用 [`crate::models::ModelPool`].
pub struct Pipeline<'a> {
    classifiers: LesionPair<&'a dyn VoxelClassifier>,
    segmenters: Option<LesionPair<&'a dyn SegmentationModel>>,
    cancel: Option<CancelToken>,
}

impl<'a> Pipeline<'a> {
    /// 仅使用第二阶段分类器创建. 此时只能运行 [`Mode::RandomForest`].
    pub fn new(classifiers: LesionPair<&'a dyn VoxelClassifier>) -> Self {
        Self {
            classifiers,
            segmenters: None,
            cancel: None,
        }
    }

    /// 加入第一阶段分割网络.
    pub fn with_segmenters(mut self, segmenters: LesionPair<&'a dyn SegmentationModel>) -> Self {
        self.segmenters = Some(segmenters);
        self
    }

    /// 加入取消标志.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// 是否可以运行联合模式.
    #[inline]
    pub fn has_segmenters(&self) -> bool {
        self.segmenters.is_some()
    }

    /// 解析模式字符串后运行. 模式不合法时在任何计算开始之前返回
    /// [`AnalysisError::InvalidMode`].
    pub fn run_named(
        &self,
        mode: &str,
        dwi: ArrayView3<f32>,
        adc: ArrayView3<f32>,
        progress: &mut dyn ProgressSink,
    ) -> AnalysisResult<Analysis> {
        let mode: Mode = mode.parse()?;
        self.run(mode, dwi, adc, progress)
    }

    /// 运行分析.
    ///
    /// 任何错误都会中止分析, 不返回部分结果.
    pub fn run(
        &self,
        mode: Mode,
        dwi: ArrayView3<f32>,
        adc: ArrayView3<f32>,
        progress: &mut dyn ProgressSink,
    ) -> AnalysisResult<Analysis> {
        check_same_shape(dwi, adc)?;
        log::info!("running `{mode}` on volume {:?}", dwi.dim());
        let (volumes, benefit) = match mode {
            Mode::RandomForest => {
                let volumes = self.run_stage2(dwi, adc, None, progress)?;
                let b = benefit_by_sum(volumes.perfusion.view(), volumes.non_perfusion.view());
                (volumes, b)
            }
            Mode::RandomForestUnet => {
                let segmenters = self.segmenters.as_ref().ok_or(AnalysisError::MissingModel)?;
                let coarse = self.run_stage1(segmenters, dwi, adc, progress)?;
                let volumes = self.run_stage2(dwi, adc, Some(&coarse), progress)?;
                let b = benefit_by_count(
                    volumes.perfusion.view(),
                    volumes.non_perfusion.view(),
                    thresh::DISPLAY,
                );
                (volumes, b)
            }
        };
        progress.emit(Progress::Done);

        let benefit = match benefit {
            Ok(b) => b,
            Err(AnalysisError::DivisionUndefined) => {
                log::warn!("no perfusion lesion found, benefit is reported as 0");
                0.0
            }
            Err(e) => return Err(e),
        };
        log::info!("analysis finished, benefit = {benefit:.2}");
        Ok(Analysis { volumes, benefit })
    }

    fn check_cancel(&self, completed: usize, total: usize) -> AnalysisResult<()> {
        match &self.cancel {
            Some(token) => token.check(completed, total),
            None => Ok(()),
        }
    }

    /// 第一阶段: 逐切片分割, 进度位于 `(0, 50]`.
    fn run_stage1(
        &self,
        segmenters: &LesionPair<&'a dyn SegmentationModel>,
        dwi: ArrayView3<f32>,
        adc: ArrayView3<f32>,
        progress: &mut dyn ProgressSink,
    ) -> AnalysisResult<LesionPair<Array3<f32>>> {
        let depth = dwi.len_of(Axis(2));
        let mut out = LesionPair::new(Array3::zeros(dwi.dim()), Array3::zeros(dwi.dim()));
        for z in 0..depth {
            self.check_cancel(z, 2 * depth)?;
            let masks = segment_slice_pair(
                segmenters,
                dwi.index_axis(Axis(2), z),
                adc.index_axis(Axis(2), z),
            )?;
            out.perfusion
                .index_axis_mut(Axis(2), z)
                .assign(&masks.perfusion);
            out.non_perfusion
                .index_axis_mut(Axis(2), z)
                .assign(&masks.non_perfusion);
            log::debug!("stage 1: slice {z} done");
            progress.emit(Progress::Percent((z + 1) as f64 / depth as f64 * 50.0));
        }
        Ok(out)
    }

    /// 第二阶段: 逐切片分类. 给出 `gate` 时与之逐元素相乘, 进度位于 `(50, 100]`;
    /// 否则进度位于 `(0, 100]`.
    fn run_stage2(
        &self,
        dwi: ArrayView3<f32>,
        adc: ArrayView3<f32>,
        gate: Option<&LesionPair<Array3<f32>>>,
        progress: &mut dyn ProgressSink,
    ) -> AnalysisResult<LesionPair<Array3<f32>>> {
        let depth = dwi.len_of(Axis(2));
        let (offset, scale, total) = match gate {
            Some(_) => (50.0, 50.0, 2 * depth),
            None => (0.0, 100.0, depth),
        };
        let mut out = LesionPair::new(Array3::zeros(dwi.dim()), Array3::zeros(dwi.dim()));
        for z in 0..depth {
            self.check_cancel(total - depth + z, total)?;
            let mut masks = self.classify_slice(dwi, adc, z)?;
            if let Some(gate) = gate {
                let apply = |mask: &mut Array2<f32>, coarse: &Array3<f32>| {
                    Zip::from(mask)
                        .and(coarse.index_axis(Axis(2), z))
                        .for_each(|m, &c| *m *= c);
                };
                apply(&mut masks.perfusion, &gate.perfusion);
                apply(&mut masks.non_perfusion, &gate.non_perfusion);
            }
            out.perfusion
                .index_axis_mut(Axis(2), z)
                .assign(&masks.perfusion);
            out.non_perfusion
                .index_axis_mut(Axis(2), z)
                .assign(&masks.non_perfusion);
            progress.emit(Progress::Percent(
                (z + 1) as f64 / depth as f64 * scale + offset,
            ));
        }
        Ok(out)
    }

    /// 对第 `z` 层切片提取候选并用两个分类器分别以 0.3 二值化.
    fn classify_slice(
        &self,
        dwi: ArrayView3<f32>,
        adc: ArrayView3<f32>,
        z: usize,
    ) -> AnalysisResult<LesionPair<Array2<f32>>> {
        let (w, h, _) = dwi.dim();
        let candidates = extract_candidates(dwi, adc, z)?;
        log::debug!("stage 2: slice {z} has {} candidates", candidates.len());

        let features = candidates.features();
        let perfusion = classify(self.classifiers.perfusion, features, thresh::CLASSIFY)?;
        let non_perfusion = classify(self.classifiers.non_perfusion, features, thresh::CLASSIFY)?;
        let positions = candidates.positions();
        Ok(LesionPair::new(
            assemble_slice_mask((w, h), positions, perfusion.as_ref()),
            assemble_slice_mask((w, h), positions, non_perfusion.as_ref()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage1::tests::ConstSegmenter;
    use crate::stage2::tests::ConstClassifier;
    use ndarray::{Array1, ArrayView2};

    /// 中心体素 DWI 大于 3000 时给出 1, 否则给出 0.
    struct BrightCentre;

    impl VoxelClassifier for BrightCentre {
        fn predict_proba(&self, features: ArrayView2<f32>) -> AnalysisResult<Array1<f32>> {
            Ok(features
                .column(13)
                .mapv(|v| if v > 3000.0 { 1.0 } else { 0.0 }))
        }
    }

    struct Failing;

    impl VoxelClassifier for Failing {
        fn predict_proba(&self, _: ArrayView2<f32>) -> AnalysisResult<Array1<f32>> {
            Err(AnalysisError::Inference("boom".to_owned()))
        }
    }

    const ONE: ConstClassifier = ConstClassifier(1.0);
    const ONE_SEG: ConstSegmenter = ConstSegmenter(1.0);
    const ZERO_SEG: ConstSegmenter = ConstSegmenter(0.0);

    fn classifiers<'a>(
        perfusion: &'a dyn VoxelClassifier,
        non_perfusion: &'a dyn VoxelClassifier,
    ) -> LesionPair<&'a dyn VoxelClassifier> {
        LesionPair::new(perfusion, non_perfusion)
    }

    fn segmenters<'a>(
        perfusion: &'a dyn SegmentationModel,
        non_perfusion: &'a dyn SegmentationModel,
    ) -> LesionPair<&'a dyn SegmentationModel> {
        LesionPair::new(perfusion, non_perfusion)
    }

    fn volumes(shape: crate::Idx3d, dwi: f32) -> (Array3<f32>, Array3<f32>) {
        (Array3::from_elem(shape, dwi), Array3::from_elem(shape, 0.001))
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Random Forest".parse::<Mode>().unwrap(), Mode::RandomForest);
        assert_eq!(
            "Random Forest+U-Net".parse::<Mode>().unwrap(),
            Mode::RandomForestUnet
        );
        for bad in ["random forest", "U-Net", "", "Random Forest "] {
            assert!(matches!(
                bad.parse::<Mode>(),
                Err(AnalysisError::InvalidMode(_))
            ));
        }
        assert_eq!(Mode::RandomForestUnet.to_string(), "Random Forest+U-Net");
    }

    #[test]
    fn test_all_bright_all_lesion() {
        let (dwi, adc) = volumes((5, 4, 3), 2000.0);
        let pipeline = Pipeline::new(classifiers(&ONE, &ONE));
        let mut events = vec![];
        let res = pipeline
            .run(Mode::RandomForest, dwi.view(), adc.view(), &mut events)
            .unwrap();
        assert!(res.volumes.perfusion.iter().all(|&v| v == 1.0));
        assert!(res.volumes.non_perfusion.iter().all(|&v| v == 1.0));
        assert_eq!(res.benefit, 0.0);
        assert_eq!(res.lesion_voxels(), LesionPair::new(60, 60));
    }

    #[test]
    fn test_all_dark_no_lesion() {
        let (dwi, adc) = volumes((5, 4, 3), 500.0);
        let pipeline = Pipeline::new(classifiers(&ONE, &ONE));
        let res = pipeline
            .run_named("Random Forest", dwi.view(), adc.view(), &mut ())
            .unwrap();
        assert!(res.volumes.perfusion.iter().all(|&v| v == 0.0));
        assert!(res.volumes.non_perfusion.iter().all(|&v| v == 0.0));
        assert_eq!(res.benefit, 0.0);
    }

    #[test]
    fn test_zero_stage1_gates_everything() {
        let (dwi, adc) = volumes((6, 5, 2), 2000.0);
        let pipeline = Pipeline::new(classifiers(&ONE, &ONE))
            .with_segmenters(segmenters(&ZERO_SEG, &ZERO_SEG));
        let res = pipeline
            .run(Mode::RandomForestUnet, dwi.view(), adc.view(), &mut ())
            .unwrap();
        assert!(res.volumes.perfusion.iter().all(|&v| v == 0.0));
        assert!(res.volumes.non_perfusion.iter().all(|&v| v == 0.0));
        assert_eq!(res.benefit, 0.0);
    }

    #[test]
    fn test_combined_only_where_both_stages_fire() {
        // 只有 x < 3 的位置是候选.
        let mut dwi = Array3::from_elem((6, 5, 2), 500.0f32);
        dwi.slice_mut(ndarray::s![..3, .., ..]).fill(2000.0);
        let adc = Array3::zeros((6, 5, 2));

        let pipeline = Pipeline::new(classifiers(&ONE, &ONE))
            .with_segmenters(segmenters(&ONE_SEG, &ZERO_SEG));
        let res = pipeline
            .run(Mode::RandomForestUnet, dwi.view(), adc.view(), &mut ())
            .unwrap();
        for ((x, _, _), &v) in res.volumes.perfusion.indexed_iter() {
            assert!(if x < 3 { close(v, 1.0) } else { v == 0.0 });
        }
        assert!(res.volumes.non_perfusion.iter().all(|&v| v == 0.0));
        assert_eq!(res.lesion_voxels(), LesionPair::new(30, 0));
        assert_eq!(res.benefit, 0.0);
    }

    #[test]
    fn test_benefit_by_sum() {
        let dwi = Array3::from_shape_fn((4, 4, 2), |(x, _, _)| if x < 2 { 4000.0 } else { 2000.0 });
        let adc = Array3::zeros((4, 4, 2));
        let pipeline = Pipeline::new(classifiers(&BrightCentre, &ONE));
        let res = pipeline
            .run(Mode::RandomForest, dwi.view(), adc.view(), &mut ())
            .unwrap();
        assert_eq!(res.lesion_voxels(), LesionPair::new(16, 32));
        assert!((res.benefit - 100.0).abs() < 1e-9);
        assert_eq!(res.benefit_rounded(), 100.0);
        assert!(res.benefit >= 0.0);
    }

    #[test]
    fn test_progress_stage2_only() {
        let (dwi, adc) = volumes((3, 3, 4), 2000.0);
        let pipeline = Pipeline::new(classifiers(&ONE, &ONE));
        let mut events = vec![];
        pipeline
            .run(Mode::RandomForest, dwi.view(), adc.view(), &mut events)
            .unwrap();
        use Progress::*;
        assert_eq!(
            events,
            [Percent(25.0), Percent(50.0), Percent(75.0), Percent(100.0), Done]
        );
    }

    #[test]
    fn test_progress_combined() {
        let (dwi, adc) = volumes((3, 3, 4), 2000.0);
        let pipeline = Pipeline::new(classifiers(&ONE, &ONE))
            .with_segmenters(segmenters(&ONE_SEG, &ONE_SEG));
        let mut events = vec![];
        pipeline
            .run(Mode::RandomForestUnet, dwi.view(), adc.view(), &mut events)
            .unwrap();
        let rendered: Vec<String> = events.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            rendered,
            ["12.5", "25.0", "37.5", "50.0", "62.5", "75.0", "87.5", "100.0", "分析已完成！"]
        );
    }

    #[test]
    fn test_rejected_before_computation() {
        let (dwi, adc) = volumes((3, 3, 2), 2000.0);
        let pipeline = Pipeline::new(classifiers(&ONE, &ONE));
        let mut events = vec![];
        assert!(matches!(
            pipeline.run_named("SVM", dwi.view(), adc.view(), &mut events),
            Err(AnalysisError::InvalidMode(_))
        ));
        assert!(matches!(
            pipeline.run(Mode::RandomForestUnet, dwi.view(), adc.view(), &mut events),
            Err(AnalysisError::MissingModel)
        ));
        let bad_adc = Array3::zeros((3, 3, 3));
        assert!(matches!(
            pipeline.run(Mode::RandomForest, dwi.view(), bad_adc.view(), &mut events),
            Err(AnalysisError::ShapeMismatch { .. })
        ));
        assert!(events.is_empty());
    }

    #[test]
    fn test_model_failure_aborts() {
        let (dwi, adc) = volumes((3, 3, 2), 2000.0);
        let pipeline = Pipeline::new(classifiers(&ONE, &Failing));
        let mut events = vec![];
        assert!(matches!(
            pipeline.run(Mode::RandomForest, dwi.view(), adc.view(), &mut events),
            Err(AnalysisError::Inference(_))
        ));
        assert!(!events.contains(&Progress::Done));
    }

    #[test]
    fn test_cancel_at_slice_boundary() {
        let (dwi, adc) = volumes((3, 3, 3), 2000.0);
        let token = CancelToken::new();
        let pipeline = Pipeline::new(classifiers(&ONE, &ONE)).with_cancel(token.clone());

        // 第一个切片完成后取消.
        let canceller = token.clone();
        let mut sink = Callback(move |_: Progress| canceller.cancel());
        assert!(matches!(
            pipeline.run(Mode::RandomForest, dwi.view(), adc.view(), &mut sink),
            Err(AnalysisError::Cancelled {
                completed: 1,
                total: 3
            })
        ));

        // 联合模式下计数包括第一阶段.
        let pipeline = pipeline.with_segmenters(segmenters(&ONE_SEG, &ONE_SEG));
        assert!(matches!(
            pipeline.run(Mode::RandomForestUnet, dwi.view(), adc.view(), &mut ()),
            Err(AnalysisError::Cancelled {
                completed: 0,
                total: 6
            })
        ));
    }
}
