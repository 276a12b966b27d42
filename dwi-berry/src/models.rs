//! 预训练模型的加载与复用.
//!
//! 模型在进程启动时显式加载一次, 之后只读. 并发请求时每个请求独占一个副本.

use crate::pipeline::Pipeline;
use crate::stage2::{RandomForest, VoxelClassifier};
use crate::{AnalysisResult, LesionPair};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

cfg_if::cfg_if! {
    if #[cfg(feature = "torch")] {
        use crate::stage1::{SegmentationModel, TorchSegmenter};
    }
}

/// 灌注 U-Net 的默认文件名.
pub const PERF_UNET: &str = "perf_unet.pt";

/// 非灌注 U-Net 的默认文件名.
pub const NONPERF_UNET: &str = "nonperf_unet.pt";

/// 灌注随机森林的默认文件名.
pub const PERF_FOREST: &str = "perf_rf_3.bin";

/// 非灌注随机森林的默认文件名.
pub const NONPERF_FOREST: &str = "nonperf_rf_3.bin";

/// 默认模型目录 `{home}/model`. 无法确定 home 目录时返回 `None`.
#[inline]
pub fn home_model_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("model"))
}

/// 四个模型文件的路径.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelPaths {
    /// 第一阶段分割网络.
    pub unet: LesionPair<PathBuf>,

    /// 第二阶段分类器.
    pub forest: LesionPair<PathBuf>,
}

impl ModelPaths {
    /// 使用默认文件名, 从目录 `dir` 下寻找模型.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            unet: LesionPair::new(dir.join(PERF_UNET), dir.join(NONPERF_UNET)),
            forest: LesionPair::new(dir.join(PERF_FOREST), dir.join(NONPERF_FOREST)),
        }
    }
}

/// 一套完整的模型: 两个随机森林, 以及 (打开 `torch` feature 时) 两个分割网络.
pub struct ModelSet {
    classifiers: LesionPair<RandomForest>,

    #[cfg(feature = "torch")]
    segmenters: Option<LesionPair<TorchSegmenter>>,
}

impl ModelSet {
    /// 从磁盘加载. 未打开 `torch` feature 时不读取分割网络,
    /// 此时只能运行仅第二阶段模式.
    pub fn load(paths: &ModelPaths) -> AnalysisResult<Self> {
        let classifiers = LesionPair::new(
            RandomForest::open(&paths.forest.perfusion)?,
            RandomForest::open(&paths.forest.non_perfusion)?,
        );

        #[cfg(feature = "torch")]
        let segmenters = Some(LesionPair::new(
            TorchSegmenter::open(&paths.unet.perfusion)?,
            TorchSegmenter::open(&paths.unet.non_perfusion)?,
        ));

        if cfg!(feature = "torch") {
            log::info!("loaded classifiers and segmentation networks");
        } else {
            log::info!("loaded classifiers, segmentation networks are unavailable without `torch`");
        }
        Ok(Self {
            classifiers,
            #[cfg(feature = "torch")]
            segmenters,
        })
    }

    /// 仅由分类器组成.
    pub fn from_classifiers(classifiers: LesionPair<RandomForest>) -> Self {
        Self {
            classifiers,
            #[cfg(feature = "torch")]
            segmenters: None,
        }
    }

    /// 两个分类器.
    #[inline]
    pub fn classifiers(&self) -> &LesionPair<RandomForest> {
        &self.classifiers
    }

    /// 创建借用本模型集的流水线.
    pub fn pipeline(&self) -> Pipeline<'_> {
        let c = &self.classifiers;
        let p = Pipeline::new(LesionPair::new(
            &c.perfusion as &dyn VoxelClassifier,
            &c.non_perfusion as &dyn VoxelClassifier,
        ));
        self.attach_segmenters(p)
    }

    #[cfg(feature = "torch")]
    fn attach_segmenters<'a>(&'a self, p: Pipeline<'a>) -> Pipeline<'a> {
        match &self.segmenters {
            Some(s) => p.with_segmenters(LesionPair::new(
                &s.perfusion as &dyn SegmentationModel,
                &s.non_perfusion as &dyn SegmentationModel,
            )),
            None => p,
        }
    }

    #[cfg(not(feature = "torch"))]
    #[inline]
    fn attach_segmenters<'a>(&'a self, p: Pipeline<'a>) -> Pipeline<'a> {
        p
    }
}

/// 模型副本池.
///
/// 每个副本都有一个排他入口. 请求按轮转顺序领取副本, 在整个分析期间持有它.
pub struct ModelPool {
    entries: Vec<Mutex<ModelSet>>,
    turn: AtomicUsize,
}

impl ModelPool {
    /// 由已加载的副本创建. `replicas` 为空时返回 `None`.
    pub fn new(replicas: Vec<ModelSet>) -> Option<Self> {
        if replicas.is_empty() {
            return None;
        }
        Some(Self {
            entries: replicas.into_iter().map(Mutex::new).collect(),
            turn: AtomicUsize::new(0),
        })
    }

    /// 从 `paths` 加载 `workers` 份副本 (至少 1 份).
    pub fn load(paths: &ModelPaths, workers: usize) -> AnalysisResult<Self> {
        let workers = workers.max(1);
        let mut v = Vec::with_capacity(workers);
        for _ in 0..workers {
            v.push(Mutex::new(ModelSet::load(paths)?));
        }
        log::info!("model pool ready with {workers} replicas");
        Ok(Self {
            entries: v,
            turn: AtomicUsize::new(0),
        })
    }

    /// 副本个数.
    #[inline]
    pub fn worker_len(&self) -> usize {
        self.entries.len()
    }

    /// 领取下一个副本. 副本正被占用时阻塞.
    pub fn acquire(&self) -> MutexGuard<'_, ModelSet> {
        let slot = self.next_slot();
        // 模型只读, 持有者 panic 不会破坏模型状态.
        self.entries[slot]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_slot(&self) -> usize {
        self.turn.fetch_add(1, Ordering::Relaxed) % self.worker_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::FEATURE_LEN;
    use crate::pipeline::Mode;
    use crate::stage2::TreeNode;
    use ndarray::Array3;

    fn constant_forest(proba: f32) -> RandomForest {
        RandomForest::new(FEATURE_LEN, vec![vec![TreeNode::Leaf { proba }]]).unwrap()
    }

    #[test]
    fn test_default_paths() {
        let p = ModelPaths::from_dir("/opt/model");
        assert_eq!(p.unet.perfusion, Path::new("/opt/model/perf_unet.pt"));
        assert_eq!(p.forest.non_perfusion, Path::new("/opt/model/nonperf_rf_3.bin"));
    }

    #[cfg(not(feature = "torch"))]
    #[test]
    fn test_load_forests_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        constant_forest(1.0).save(dir.path().join(PERF_FOREST)).unwrap();
        constant_forest(0.0).save(dir.path().join(NONPERF_FOREST)).unwrap();

        let set = ModelSet::load(&ModelPaths::from_dir(dir.path())).unwrap();
        let pipeline = set.pipeline();
        assert!(!pipeline.has_segmenters());

        let dwi = Array3::from_elem((3, 3, 2), 1500.0f32);
        let adc = Array3::zeros((3, 3, 2));
        let res = pipeline
            .run(Mode::RandomForest, dwi.view(), adc.view(), &mut ())
            .unwrap();
        assert!(res.volumes.perfusion.iter().all(|&v| v == 1.0));
        assert!(res.volumes.non_perfusion.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ModelSet::load(&ModelPaths::from_dir(dir.path())).is_err());
    }

    #[test]
    fn test_pool_round_robin() {
        let pool = ModelPool::new(vec![
            ModelSet::from_classifiers(LesionPair::new(constant_forest(0.1), constant_forest(0.1))),
            ModelSet::from_classifiers(LesionPair::new(constant_forest(0.9), constant_forest(0.9))),
        ])
        .unwrap();
        assert_eq!(pool.worker_len(), 2);
        assert!(ModelPool::new(vec![]).is_none());

        let first = pool.acquire().classifiers().perfusion.clone();
        let second = pool.acquire().classifiers().perfusion.clone();
        let third = pool.acquire().classifiers().perfusion.clone();
        assert_ne!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn test_pool_shared_across_threads() {
        let pool = ModelPool::new(
            (0..2)
                .map(|_| {
                    ModelSet::from_classifiers(LesionPair::new(
                        constant_forest(1.0),
                        constant_forest(1.0),
                    ))
                })
                .collect(),
        )
        .unwrap();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let set = pool.acquire();
                    let dwi = Array3::from_elem((4, 4, 2), 2000.0f32);
                    let adc = Array3::zeros((4, 4, 2));
                    let res = set
                        .pipeline()
                        .run(Mode::RandomForest, dwi.view(), adc.view(), &mut ())
                        .unwrap();
                    assert_eq!(res.lesion_voxels(), LesionPair::new(32, 32));
                });
            }
        });
    }
}
