//! 结果体数据的导出.

use super::{write_affine_into, Affine, BoxedHeader, NiftiHeaderAttr};
use crate::{AnalysisResult, Idx3d};
use ndarray::{Array3, ArrayView3};
use nifti::writer::WriterOptions;
use nifti::NiftiHeader;
use std::path::Path;

/// 可导出的 nii 体数据: 结果数组加上原始 DWI 的仿射矩阵.
///
/// 不做重采样, 数据以 `f32` 原样写出.
#[derive(Debug, Clone)]
pub struct NiftiExport {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl NiftiHeaderAttr for NiftiExport {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl NiftiExport {
    /// 数据形状 `(x, y, z)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// 写到 `path`. 文件名以 `.gz` 结尾时自动压缩.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> AnalysisResult<()> {
        WriterOptions::new(path.as_ref())
            .reference_header(&self.header)
            .write_nifti(&self.data)?;
        log::debug!("saved {:?} volume to {}", self.shape(), path.as_ref().display());
        Ok(())
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array3<f32> {
        self.data
    }
}

/// 将结果数组和仿射矩阵包装为可导出的 nii 对象.
pub fn to_nii(data: Array3<f32>, affine: &Affine) -> NiftiExport {
    let mut header = Box::<NiftiHeader>::default();
    write_affine_into(&mut header, affine);
    NiftiExport { header, data }
}
