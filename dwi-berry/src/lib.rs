#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 对配准好的 DWI/ADC 脑部 MRI 扫描运行两阶段缺血性卒中病灶分析,
//! 给出灌注 (perfusion) / 非灌注 (non-perfusion) 病灶图与治疗获益指标.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 两个模态的体数据必须已经配准 (形状一致). 本 crate 不做重采样,
//!   形状不一致时返回 [`AnalysisError::ShapeMismatch`].
//! 2. 预训练的分割网络和体素分类器均由外部产出, 在进程启动时加载一次
//!   ([`models::ModelSet`]), 之后以显式引用的形式交给 [`pipeline::Pipeline`].
//! 3. 所有数组都按照 nifti 惯例以 \[x, y, z\] (宽, 高, 切片) 访问.
//!
//! # 开发计划
//!
//! ### DWI / ADC nifti 加载与导出 ✅
//!
//! 读取时压缩单例维度, 同时从 DWI header 取得仿射矩阵;
//! 导出时原样携带该仿射矩阵.
//!
//! 实现位于 `dwi-berry/src/data`.
//!
//! ### 体素邻域特征提取 ✅
//!
//! 以 DWI > 1000 作为候选体素, 为每个候选体素拼接 3x3x3 邻域的
//! DWI 与 ADC 值 (共 54 维), 越界处补 0.
//!
//! 实现位于 `dwi-berry/src/features`.
//!
//! ### 第二阶段: 随机森林逐体素分类 ✅
//!
//! 实现位于 `dwi-berry/src/stage2`.
//!
//! ### 第一阶段: U-Net 切片分割 ✅
//!
//! 切片归一化、双通道堆叠、224x224 插值缩放与回缩放. 网络本身以
//! trait 注入, `torch` feature 打开时提供 TorchScript 实现.
//!
//! 实现位于 `dwi-berry/src/stage1`.
//!
//! ### 流水线编排、进度汇报与获益指标 ✅
//!
//! 实现位于 `dwi-berry/src/pipeline`.
//!
//! ### 评测 (准确率, 特异度, 灵敏度, AUC) ✅
//!
//! 实现位于 `dwi-berry/src/eval.rs`.
//!
//! ### 小功能 ✅
//!
//! 1. 结果切片 PNG 预览. ✅
//! 2. 模型副本池, 支持并发请求. ✅
//! 3. 切片边界处的取消检查. ✅

/// 二维索引, 按 `(x, y)` 排列.
pub type Idx2d = (usize, usize);

/// 三维索引, 按 `(x, y, z)` 排列.
pub type Idx3d = (usize, usize, usize);

pub mod consts;

/// nii 文件的加载、导出和强度窗口.
pub mod data;

mod error;

pub use error::{AnalysisError, AnalysisResult};

pub use data::{load_imgs, to_nii, Affine, IntensityWindow, LoadedImages, MriVolume, NiftiExport};

pub mod features;

pub mod stage1;

pub mod stage2;

pub mod pipeline;

pub mod eval;

pub mod models;

pub mod preview;

pub mod prelude;

/// 灌注 / 非灌注两类病灶各自一份的数据.
///
/// 流水线中的模型、分类器、掩膜和结果都成对出现, 该结构让两者始终以相同方式处理.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LesionPair<T> {
    /// 灌注病灶.
    pub perfusion: T,

    /// 非灌注病灶.
    pub non_perfusion: T,
}

impl<T> LesionPair<T> {
    /// 直接初始化.
    #[inline]
    pub fn new(perfusion: T, non_perfusion: T) -> Self {
        Self {
            perfusion,
            non_perfusion,
        }
    }

    /// 对两类病灶分别施加 `f`.
    #[inline]
    pub fn map<U, F: FnMut(T) -> U>(self, mut f: F) -> LesionPair<U> {
        LesionPair {
            perfusion: f(self.perfusion),
            non_perfusion: f(self.non_perfusion),
        }
    }

    /// 获得引用对.
    #[inline]
    pub fn as_ref(&self) -> LesionPair<&T> {
        LesionPair {
            perfusion: &self.perfusion,
            non_perfusion: &self.non_perfusion,
        }
    }

    /// 按 (灌注, 非灌注) 顺序迭代.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (LesionKind, &T)> {
        [
            (LesionKind::Perfusion, &self.perfusion),
            (LesionKind::NonPerfusion, &self.non_perfusion),
        ]
        .into_iter()
    }
}

/// 病灶类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LesionKind {
    /// 灌注病灶.
    Perfusion,

    /// 非灌注病灶.
    NonPerfusion,
}

impl LesionKind {
    /// 展示用名称.
    #[inline]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Perfusion => "Perfusion",
            Self::NonPerfusion => "Non-Perfusion",
        }
    }

    /// 结果文件名前缀.
    #[inline]
    pub const fn file_prefix(&self) -> &'static str {
        match self {
            Self::Perfusion => "perf",
            Self::NonPerfusion => "nonperf",
        }
    }
}

impl std::fmt::Display for LesionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// 四舍五入保留两位小数, 用于展示.
#[inline]
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
