//! 结果切片的 PNG 预览.
//!
//! 每个切片单独做 min-max 拉伸到 \[0, 255\]. 图像的行对应 x, 列对应 y.

use image::{GrayImage, ImageError, ImageResult, Luma};
use ndarray::{ArrayView2, ArrayView3, Axis};
use std::path::{Path, PathBuf};

/// 将切片转为 8 位灰度图.
///
/// 给出 `threshold` 时先二值化 (`v >= threshold` 记为 1). 切片为常数时整张图为黑色.
pub fn slice_gray(slice: ArrayView2<f32>, threshold: Option<f32>) -> GrayImage {
    let value = |v: f32| match threshold {
        Some(t) => {
            if v >= t {
                1.0
            } else {
                0.0
            }
        }
        None => v,
    };
    let (min, max) = slice
        .iter()
        .map(|&v| value(v))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;

    let (nx, ny) = slice.dim();
    let mut buf = GrayImage::new(ny as u32, nx as u32);
    for ((x, y), &v) in slice.indexed_iter() {
        let gray = if range > 0.0 {
            ((value(v) - min) / range * 255.0).round() as u8
        } else {
            0
        };
        buf.put_pixel(y as u32, x as u32, Luma([gray]));
    }
    buf
}

/// 将 `volume` 的每个切片写为 `dir/{prefix}_{z}.png`, 返回写出的路径.
pub fn save_slices<P: AsRef<Path>>(
    volume: ArrayView3<f32>,
    threshold: Option<f32>,
    dir: P,
    prefix: &str,
) -> ImageResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(ImageError::IoError)?;
    let mut saved = Vec::with_capacity(volume.len_of(Axis(2)));
    for (z, slice) in volume.axis_iter(Axis(2)).enumerate() {
        let path = dir.join(format!("{prefix}_{z}.png"));
        slice_gray(slice, threshold).save(&path)?;
        saved.push(path);
    }
    log::debug!("saved {} previews to {}", saved.len(), dir.display());
    Ok(saved)
}
