//! 对 `dwi-berry` 模型与结果路径的更一层封装.

use dwi_berry::models::{self, ModelPaths};
use dwi_berry::LesionKind;
use std::env;
use std::path::{Path, PathBuf};

/// 获取模型目录.
///
/// 1. 若环境变量 `$STROKE_MODEL_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/model`. 无法确定 home 目录时返回 `None`.
pub fn model_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var("STROKE_MODEL_DIR") {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => models::home_model_dir(),
    }
}

/// 从 `$STROKE_MODEL_DIR` 或者 `$HOME/model` 下寻找四个模型文件.
#[inline]
pub fn model_paths_from_env_or_home() -> Option<ModelPaths> {
    model_dir_from_env_or_home().map(ModelPaths::from_dir)
}

/// 获取结果目录.
///
/// 1. 若环境变量 `$STROKE_RESULT_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `./result`.
pub fn result_dir_from_env_or_cwd() -> PathBuf {
    match env::var("STROKE_RESULT_DIR") {
        Ok(d) if !d.is_empty() => PathBuf::from(d),
        _ => PathBuf::from("result"),
    }
}

/// 去掉 `.nii.gz` 或 `.nii` 后缀的文件名.
pub fn nii_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    for suffix in [".nii.gz", ".nii"] {
        if let Some(stem) = name.strip_suffix(suffix) {
            return stem.to_owned();
        }
    }
    name
}

/// 结果文件路径 `dir/{perf|nonperf}_{stem}.nii.gz`.
pub fn result_path(dir: &Path, kind: LesionKind, dwi_path: &Path) -> PathBuf {
    dir.join(format!("{}_{}.nii.gz", kind.file_prefix(), nii_stem(dwi_path)))
}
