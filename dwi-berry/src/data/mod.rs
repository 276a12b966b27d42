use std::ops::{Index, IndexMut};
use std::path::Path;

use ndarray::{Array3, ArrayD, ArrayView2, ArrayView3, Axis, Ix3};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::{AnalysisError, AnalysisResult, Idx3d};

mod affine;
mod export;
mod window;

pub use affine::{affine_from_header, write_affine_into, Affine, IDENTITY_AFFINE};
pub use export::{to_nii, NiftiExport};
pub use window::IntensityWindow;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// nii 文件 header 的共用属性.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取体素到物理空间的仿射矩阵. 规则与 nifti 标准一致:
    /// `sform_code > 0` 时取 srow, 否则 `qform_code > 0` 时取四元数, 否则仅按 pixdim 缩放.
    #[inline]
    fn affine(&self) -> Affine {
        affine_from_header(self.header())
    }

    /// 获取单个体素分辨率, 以毫米为单位, 按 `[x, y, z]` 排列.
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, x, y, z, ..] = self.header().pixdim;
        [x as f64, y as f64, z as f64]
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }
}

/// nii 格式 3D MRI 扫描 (DWI 或 ADC), 包括 header 和强度数据. 强度以 `f32` 保存,
/// 按 `[x, y, z]` 访问.
#[derive(Debug, Clone)]
pub struct MriVolume {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl NiftiHeaderAttr for MriVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for MriVolume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for MriVolume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

/// 去掉单例维度, 但至少保留 3 维.
///
/// 从最后一维开始检查, 因此 `[x, y, z, 1]` 与 `[1, x, y, z]` 都会得到 `[x, y, z]`,
/// 而只有一个切片的 `[x, y, 1]` 保持不变.
fn squeeze(mut data: ArrayD<f32>) -> ArrayD<f32> {
    while data.ndim() > 3 {
        match data.shape().iter().rposition(|&len| len == 1) {
            Some(axis) => data = data.remove_axis(Axis(axis)),
            None => break,
        }
    }
    data
}

impl MriVolume {
    /// 打开 nii (或 nii.gz) 文件格式的 3D MRI 扫描. `path` 为文件的本地路径.
    ///
    /// 文件无法读取时返回 [`AnalysisError::Load`]; 压缩单例维度后仍不是 3 维时返回
    /// [`AnalysisError::NotVolume`].
    pub fn open<P: AsRef<Path>>(path: P) -> AnalysisResult<Self> {
        let path = path.as_ref();
        let load_err = |source| AnalysisError::Load {
            path: path.to_owned(),
            source,
        };
        let obj = ReaderOptions::new().read_file(path).map_err(load_err)?;
        let header = Box::new(obj.header().clone());

        // 保持 nifti 的 [x, y, z] 轴序, 不做转置.
        let data = squeeze(obj.into_volume().into_ndarray::<f32>().map_err(load_err)?);
        let shape = data.shape().to_vec();
        let data = data
            .into_dimensionality::<Ix3>()
            .map_err(|_| AnalysisError::NotVolume {
                path: path.to_owned(),
                shape,
            })?;

        Ok(Self { header, data })
    }

    /// 根据裸数据和仿射矩阵直接创建实体. 其余 header 字段取默认值.
    ///
    /// `data` 按照 nifti 惯用标准以 \[x, y, z\] 格式存储.
    pub fn from_array(data: Array3<f32>, affine: &Affine) -> Self {
        let mut header = Box::<NiftiHeader>::default();
        write_affine_into(&mut header, affine);
        Self { header, data }
    }

    /// 数据形状 `(x, y, z)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 切片个数.
    #[inline]
    pub fn len_z(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// 获取第 `z_index` 层切片视图, 形状为 `(x, y)`.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(2), z_index)
    }

    /// 获取能按升序迭代所有切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = ArrayView2<'_, f32>> {
        self.data.axis_iter(Axis(2))
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array3<f32> {
        self.data
    }
}

/// [`load_imgs`] 的结果. 只包含实际给出的输入, 缺失项为 `None` 而不是默认值.
#[derive(Debug, Clone, Default)]
pub struct LoadedImages {
    /// DWI 体数据.
    pub dwi: Option<Array3<f32>>,

    /// ADC 体数据.
    pub adc: Option<Array3<f32>>,

    /// DWI 的仿射矩阵. 仅在给出 DWI 时存在.
    pub affine: Option<Affine>,
}

impl LoadedImages {
    /// 取出分析所需的 (DWI, ADC, 仿射矩阵) 三元组, 并检查两个模态形状一致.
    pub fn into_analysis_input(self) -> AnalysisResult<(Array3<f32>, Array3<f32>, Affine)> {
        let dwi = self.dwi.ok_or(AnalysisError::MissingInput("dwi"))?;
        let adc = self.adc.ok_or(AnalysisError::MissingInput("adc"))?;
        let affine = self.affine.ok_or(AnalysisError::MissingInput("affine"))?;
        check_same_shape(dwi.view(), adc.view())?;
        Ok((dwi, adc, affine))
    }
}

/// 分别加载 ADC 与 DWI 文件. 任一路径为 `None` 时跳过对应项.
///
/// 给出了路径但加载失败时返回 `Err`.
pub fn load_imgs(adc_path: Option<&Path>, dwi_path: Option<&Path>) -> AnalysisResult<LoadedImages> {
    let mut res = LoadedImages::default();
    if let Some(p) = adc_path {
        res.adc = Some(MriVolume::open(p)?.into_raw());
    }
    if let Some(p) = dwi_path {
        let dwi = MriVolume::open(p)?;
        res.affine = Some(dwi.affine());
        res.dwi = Some(dwi.into_raw());
    }
    log::debug!(
        "load_imgs: dwi = {:?}, adc = {:?}",
        res.dwi.as_ref().map(|d| d.dim()),
        res.adc.as_ref().map(|a| a.dim())
    );
    Ok(res)
}

/// 检查 DWI 和 ADC 形状一致, 不一致时返回 [`AnalysisError::ShapeMismatch`].
#[inline]
pub fn check_same_shape(dwi: ArrayView3<f32>, adc: ArrayView3<f32>) -> AnalysisResult<()> {
    if dwi.dim() == adc.dim() {
        Ok(())
    } else {
        Err(AnalysisError::ShapeMismatch {
            dwi: dwi.dim(),
            adc: adc.dim(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    #[test]
    fn test_squeeze_keeps_three_axes() {
        let a = squeeze(Array::zeros(IxDyn(&[4, 5, 6, 1])));
        assert_eq!(a.shape(), &[4, 5, 6]);

        let a = squeeze(Array::zeros(IxDyn(&[1, 4, 5, 6])));
        assert_eq!(a.shape(), &[4, 5, 6]);

        // 单切片体数据不能被压成 2 维.
        let a = squeeze(Array::zeros(IxDyn(&[4, 5, 1, 1])));
        assert_eq!(a.shape(), &[4, 5, 1]);

        let a = squeeze(Array::zeros(IxDyn(&[4, 5, 6, 2])));
        assert_eq!(a.shape(), &[4, 5, 6, 2]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = MriVolume::open("/definitely/not/here.nii").unwrap_err();
        assert!(matches!(err, AnalysisError::Load { .. }));
    }

    #[test]
    fn test_load_imgs_omits_absent_inputs() {
        let res = load_imgs(None, None).unwrap();
        assert!(res.dwi.is_none() && res.adc.is_none() && res.affine.is_none());
        assert!(matches!(
            res.into_analysis_input(),
            Err(AnalysisError::MissingInput("dwi"))
        ));
    }

    #[test]
    fn test_load_imgs_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let dwi_affine: Affine = [
            [-1.5, 0.0, 0.0, 90.0],
            [0.0, 1.5, 0.0, -110.0],
            [0.0, 0.0, 5.0, -30.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let dwi_path = dir.path().join("dwi.nii.gz");
        let adc_path = dir.path().join("adc.nii");
        let dwi = Array3::from_shape_fn((6, 5, 3), |(x, y, z)| (x * 300 + y * 20 + z) as f32);
        let adc = Array3::from_elem((6, 5, 3), 0.0007f32);
        to_nii(dwi, &dwi_affine).save(&dwi_path).unwrap();
        to_nii(adc, &IDENTITY_AFFINE).save(&adc_path).unwrap();

        // 只给 ADC 时, DWI 与仿射矩阵都缺失.
        let res = load_imgs(Some(&adc_path), None).unwrap();
        assert_eq!(res.adc.as_ref().map(|a| a.dim()), Some((6, 5, 3)));
        assert!(res.dwi.is_none() && res.affine.is_none());

        // 仿射矩阵取自 DWI, 而不是 ADC.
        let (dwi, adc, affine) = load_imgs(Some(&adc_path), Some(&dwi_path))
            .unwrap()
            .into_analysis_input()
            .unwrap();
        assert_eq!(dwi.dim(), (6, 5, 3));
        assert_eq!(adc.dim(), (6, 5, 3));
        assert_eq!(dwi[(5, 4, 2)], 1582.0);
        for (r0, r1) in affine.iter().zip(dwi_affine.iter()) {
            for (a, b) in r0.iter().zip(r1.iter()) {
                assert!((a - b).abs() < 1e-5);
            }
        }

        let missing = dir.path().join("missing.nii");
        assert!(matches!(
            load_imgs(Some(&missing), Some(&dwi_path)),
            Err(AnalysisError::Load { .. })
        ));
    }

    #[test]
    fn test_shape_mismatch() {
        let dwi = Array3::<f32>::zeros((4, 4, 2));
        let adc = Array3::<f32>::zeros((4, 5, 2));
        let err = check_same_shape(dwi.view(), adc.view()).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::ShapeMismatch {
                dwi: (4, 4, 2),
                adc: (4, 5, 2)
            }
        ));
    }

    #[test]
    fn test_volume_accessors() {
        let data = Array3::from_shape_fn((3, 4, 2), |(x, y, z)| (x * 100 + y * 10 + z) as f32);
        let v = MriVolume::from_array(data, &IDENTITY_AFFINE);
        assert_eq!(v.shape(), (3, 4, 2));
        assert_eq!(v.len_z(), 2);
        assert_eq!(v[(2, 3, 1)], 231.0);
        assert_eq!(v.slice_at(1)[(1, 2)], 121.0);
        assert_eq!(v.slice_iter().len(), 2);
        assert_eq!(v.affine(), IDENTITY_AFFINE);
    }
}
