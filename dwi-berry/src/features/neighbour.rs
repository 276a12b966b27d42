//! 3x3x3 邻域.

use crate::consts::NEIGHBOURHOOD_LEN;
use crate::Idx3d;
use ndarray::ArrayView3;

/// 3D 偏移量.
pub type Offset3d = (isize, isize, isize);

/// 生成 27 个邻域偏移. 顺序为 dx 最外层, dy 居中, dz 最内层, 每层依次取 -1, 0, 1.
const fn neighbour27() -> [Offset3d; NEIGHBOURHOOD_LEN] {
    let mut ans = [(0, 0, 0); NEIGHBOURHOOD_LEN];
    let mut i = 0;
    let mut dx = -1;
    while dx <= 1 {
        let mut dy = -1;
        while dy <= 1 {
            let mut dz = -1;
            while dz <= 1 {
                ans[i] = (dx, dy, dz);
                i += 1;
                dz += 1;
            }
            dy += 1;
        }
        dx += 1;
    }
    ans
}

/// 特征向量使用的 27 个邻域偏移, 顺序固定.
///
/// 分类器是按该顺序训练的, 不能改动.
pub const NEIGHBOUR27: [Offset3d; NEIGHBOURHOOD_LEN] = neighbour27();

/// 获得 `pos + offset` 处的体素值. 越界 (包括负方向) 时返回 0.
#[inline]
pub fn value_or_zero(data: &ArrayView3<f32>, (x, y, z): Idx3d, (dx, dy, dz): Offset3d) -> f32 {
    let pos = (|| {
        Some((
            x.checked_add_signed(dx)?,
            y.checked_add_signed(dy)?,
            z.checked_add_signed(dz)?,
        ))
    })();
    pos.and_then(|p| data.get(p)).copied().unwrap_or(0.0)
}

/// 将 `pos` 的 27 邻域值按 [`NEIGHBOUR27`] 的顺序追加到 `buf`.
#[inline]
pub fn extend_neighbourhood(buf: &mut Vec<f32>, data: &ArrayView3<f32>, pos: Idx3d) {
    buf.extend(NEIGHBOUR27.iter().map(|off| value_or_zero(data, pos, *off)));
}
