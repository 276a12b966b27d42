//! 体素坐标到物理空间坐标的仿射矩阵.

use nifti::NiftiHeader;

/// 4x4 仿射矩阵, 按行存储 (`affine[row][col]`).
pub type Affine = [[f64; 4]; 4];

/// 单位仿射矩阵.
pub const IDENTITY_AFFINE: Affine = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// nifti 标准中的 "aligned" sform 代码.
const SFORM_ALIGNED: i16 = 2;

/// 从 header 中读取仿射矩阵.
///
/// 优先级与 nifti 标准一致: sform, 然后 qform, 最后退化为仅按 pixdim 缩放.
pub fn affine_from_header(header: &NiftiHeader) -> Affine {
    let row = |r: [f32; 4]| r.map(|v| v as f64);
    if header.sform_code > 0 {
        return [
            row(header.srow_x),
            row(header.srow_y),
            row(header.srow_z),
            [0.0, 0.0, 0.0, 1.0],
        ];
    }

    let [qfac, dx, dy, dz, ..] = header.pixdim.map(|v| v as f64);
    if header.qform_code > 0 {
        let b = header.quatern_b as f64;
        let c = header.quatern_c as f64;
        let d = header.quatern_d as f64;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if qfac < 0.0 { -1.0 } else { 1.0 };
        let dz = dz * qfac;

        return [
            [
                (a * a + b * b - c * c - d * d) * dx,
                (2.0 * b * c - 2.0 * a * d) * dy,
                (2.0 * b * d + 2.0 * a * c) * dz,
                header.quatern_x as f64,
            ],
            [
                (2.0 * b * c + 2.0 * a * d) * dx,
                (a * a + c * c - b * b - d * d) * dy,
                (2.0 * c * d - 2.0 * a * b) * dz,
                header.quatern_y as f64,
            ],
            [
                (2.0 * b * d - 2.0 * a * c) * dx,
                (2.0 * c * d + 2.0 * a * b) * dy,
                (a * a + d * d - c * c - b * b) * dz,
                header.quatern_z as f64,
            ],
            [0.0, 0.0, 0.0, 1.0],
        ];
    }

    [
        [dx, 0.0, 0.0, 0.0],
        [0.0, dy, 0.0, 0.0],
        [0.0, 0.0, dz, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// 将仿射矩阵以 sform 的形式写入 `header`, 同时按列范数更新 pixdim.
///
/// qform 被置为未知 (0), 因此之后以 [`affine_from_header`] 读取时一定取到 sform.
pub fn write_affine_into(header: &mut NiftiHeader, affine: &Affine) {
    let row = |r: &[f64; 4]| r.map(|v| v as f32);
    header.srow_x = row(&affine[0]);
    header.srow_y = row(&affine[1]);
    header.srow_z = row(&affine[2]);
    header.sform_code = SFORM_ALIGNED;
    header.qform_code = 0;

    for col in 0..3 {
        let norm = (0..3).map(|r| affine[r][col].powi(2)).sum::<f64>().sqrt();
        header.pixdim[col + 1] = norm as f32;
    }
}
