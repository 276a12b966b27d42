//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{round2, Idx2d, Idx3d, LesionKind, LesionPair};
pub use crate::{AnalysisError, AnalysisResult};

pub use crate::data::{
    load_imgs, to_nii, Affine, IntensityWindow, LoadedImages, MriVolume, NiftiExport,
    NiftiHeaderAttr,
};

pub use crate::consts::{thresh, MODE_RANDOM_FOREST, MODE_RANDOM_FOREST_UNET};

pub use crate::features::{extract_candidates, Candidates};
pub use crate::stage1::{segment_slice, SegmentationModel};
pub use crate::stage2::{classify, RandomForest, VoxelClassifier};

#[cfg(feature = "torch")]
pub use crate::stage1::TorchSegmenter;

pub use crate::pipeline::{Analysis, CancelToken, Mode, Pipeline, Progress, ProgressSink};

pub use crate::eval::{evaluate, EvalReport};
pub use crate::models::{home_model_dir, ModelPaths, ModelPool, ModelSet};
pub use crate::preview::save_slices;
