//! 程序运行函数.

use crate::result::{CaseOutcome, RunReport};
use dwi_berry::consts::thresh;
use dwi_berry::models::{ModelPaths, ModelPool, ModelSet};
use dwi_berry::pipeline::{LogProgress, Mode};
use dwi_berry::{
    eval, load_imgs, preview, to_nii, AnalysisError, AnalysisResult, LesionKind, MriVolume,
};
use std::path::{Path, PathBuf};
use std::thread;
use utils::loader;

/// 一次分析运行的参数.
pub struct RunConfig {
    /// (DWI, ADC) 文件对.
    pub cases: Vec<(PathBuf, PathBuf)>,
    pub mode: Mode,
    pub out: PathBuf,
    pub models: ModelPaths,
    pub previews: bool,
}

/// 实际运行. 每个病例一个线程, 病例之间竞争模型副本.
pub fn run(cfg: &RunConfig) -> AnalysisResult<RunReport> {
    let workers = utils::cpus().min(cfg.cases.len()).max(1);
    let pool = ModelPool::load(&cfg.models, workers)?;
    check_mode(cfg.mode, &pool.acquire())?;
    std::fs::create_dir_all(&cfg.out)?;

    println!(
        "Running `{}` on {} case(s) with {workers} model replica(s)...",
        cfg.mode,
        cfg.cases.len()
    );
    let report = thread::scope(|s| {
        let pool = &pool;
        let handles: Vec<_> = cfg
            .cases
            .iter()
            .map(|(dwi, adc)| s.spawn(move || run_case(pool, cfg, dwi, adc)))
            .collect();

        RunReport::from_iter(
            cfg.cases.iter().map(|(dwi, _)| dwi.clone()).zip(
                handles
                    .into_iter()
                    .map(|th| th.join().expect("Thread joining error")),
            ),
        )
    });
    Ok(report)
}

/// 检查 `models` 能否运行 `mode`. 组合模式需要两个分割网络.
fn check_mode(mode: Mode, models: &ModelSet) -> AnalysisResult<()> {
    if mode == Mode::RandomForestUnet && !models.pipeline().has_segmenters() {
        return Err(AnalysisError::MissingModel);
    }
    Ok(())
}

fn run_case(
    pool: &ModelPool,
    cfg: &RunConfig,
    dwi_path: &Path,
    adc_path: &Path,
) -> AnalysisResult<CaseOutcome> {
    let (dwi, adc, affine) = load_imgs(Some(adc_path), Some(dwi_path))?.into_analysis_input()?;

    let analysis = {
        let models = pool.acquire();
        models
            .pipeline()
            .run(cfg.mode, dwi.view(), adc.view(), &mut LogProgress)?
    };
    let lesion_voxels = analysis.lesion_voxels();
    let benefit = analysis.benefit_rounded();

    let mut outputs = vec![];
    if cfg.previews {
        let dir = cfg.out.join("previews").join(loader::nii_stem(dwi_path));
        for (kind, v) in analysis.volumes.iter() {
            outputs.extend(preview::save_slices(
                v.view(),
                Some(thresh::DISPLAY),
                &dir,
                kind.file_prefix(),
            )?);
        }
    }

    let volumes = analysis.volumes;
    for (kind, v) in [
        (LesionKind::Perfusion, volumes.perfusion),
        (LesionKind::NonPerfusion, volumes.non_perfusion),
    ] {
        let path = loader::result_path(&cfg.out, kind, dwi_path);
        to_nii(v, &affine).save(&path)?;
        outputs.push(path);
    }
    log::info!("{} finished", dwi_path.display());

    Ok(CaseOutcome {
        lesion_voxels,
        benefit,
        outputs,
    })
}

/// 评测已保存的预测结果, 返回描述语句.
pub fn evaluate(roi: &Path, pred: &Path, dwi: &Path, kind: LesionKind) -> AnalysisResult<String> {
    let roi = MriVolume::open(roi)?.into_raw();
    let pred = MriVolume::open(pred)?.into_raw();
    let dwi = MriVolume::open(dwi)?.into_raw();
    let report = eval::evaluate(roi.view(), pred.view(), dwi.view())?;
    log::debug!("{report:?}");
    Ok(report.describe(kind))
}

/// 将已保存的结果逐切片写为 PNG, 返回切片个数.
pub fn save_previews(volume: &Path, out: &Path, raw: bool) -> AnalysisResult<usize> {
    let v = MriVolume::open(volume)?;
    let threshold = (!raw).then_some(thresh::RESULT_PREVIEW);
    let saved = preview::save_slices(v.data(), threshold, out, &loader::nii_stem(volume))?;
    Ok(saved.len())
}
