//! 运行时错误.

use crate::Idx3d;
use std::path::PathBuf;
use thiserror::Error;

/// 分析流程的运行时错误.
///
/// 任何一个错误都会中止整次分析, 已经完成的切片结果不会返回.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// 给出了路径, 但文件无法读取或不是合法的体数据.
    #[error("无法加载体数据 `{}`: {source}", .path.display())]
    Load {
        /// 出错的文件.
        path: PathBuf,

        /// 底层错误.
        #[source]
        source: nifti::NiftiError,
    },

    /// 体数据维度不是 3 (压缩单例维度之后).
    #[error("体数据 `{}` 维度不符: 期望 3 维, 实际形状 {shape:?}", .path.display())]
    NotVolume {
        /// 出错的文件.
        path: PathBuf,

        /// 压缩后的形状.
        shape: Vec<usize>,
    },

    /// DWI 与 ADC 形状不一致.
    #[error("DWI 与 ADC 形状不一致: {dwi:?} vs {adc:?}")]
    ShapeMismatch {
        /// DWI 形状.
        dwi: Idx3d,

        /// ADC 形状.
        adc: Idx3d,
    },

    /// 评测时某个体数据与 DWI 形状不一致.
    #[error("{name} 形状 {found:?} 与 DWI {expected:?} 不一致")]
    VolumeMismatch {
        /// 体数据名称.
        name: &'static str,

        /// DWI 形状.
        expected: Idx3d,

        /// 实际形状.
        found: Idx3d,
    },

    /// 无法识别的分析模式.
    #[error("无法识别的分析模式 `{0}`")]
    InvalidMode(String),

    /// 获益指标的分母为 0.
    #[error("获益指标分母为 0")]
    DivisionUndefined,

    /// 模型调用失败 (张量形状不符、后端错误等). 不会重试.
    #[error("模型调用失败: {0}")]
    Inference(String),

    /// 缺少必要的输入体数据.
    #[error("缺少输入: {0}")]
    MissingInput(&'static str),

    /// 联合模式需要的第一阶段分割模型未加载.
    #[error("未加载第一阶段分割模型")]
    MissingModel,

    /// 模型文件内容不合法.
    #[error("模型文件不合法: {0}")]
    InvalidArtifact(String),

    /// 在第 `completed` 个切片边界处被取消.
    #[error("分析已取消 ({completed}/{total})")]
    Cancelled {
        /// 已完成的切片个数.
        completed: usize,

        /// 切片总数.
        total: usize,
    },

    /// 导出/写入失败.
    #[error("导出失败: {0}")]
    Export(#[from] nifti::NiftiError),

    /// 预览图写入失败.
    #[error("预览图写入失败: {0}")]
    Preview(#[from] image::ImageError),

    /// 其他底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 分析流程运行时结果.
pub type AnalysisResult<T> = Result<T, AnalysisError>;
