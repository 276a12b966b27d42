//! 卒中病灶分析命令行工具.

mod result;
mod runner;

use clap::{Parser, Subcommand};
use dwi_berry::consts::MODE_RANDOM_FOREST;
use dwi_berry::models::ModelPaths;
use dwi_berry::pipeline::Mode;
use dwi_berry::LesionKind;
use std::path::PathBuf;
use std::process::ExitCode;
use utils::loader;

#[derive(Parser, Debug)]
#[command(name = "analyze", version, about = "DWI/ADC 卒中病灶两阶段分析")]
struct Args {
    /// 输出调试日志.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 对一个或多个病例运行分析, 写出结果体数据.
    Run {
        /// DWI 文件, 可重复给出.
        #[arg(long, required = true)]
        dwi: Vec<PathBuf>,

        /// ADC 文件, 与 `--dwi` 按顺序一一对应.
        #[arg(long, required = true)]
        adc: Vec<PathBuf>,

        /// `Random Forest` 或 `Random Forest+U-Net`.
        #[arg(long, default_value = MODE_RANDOM_FOREST)]
        mode: String,

        /// 结果目录. 默认为 `$STROKE_RESULT_DIR` 或 `./result`.
        #[arg(long)]
        out: Option<PathBuf>,

        /// 模型目录. 默认为 `$STROKE_MODEL_DIR` 或 `$HOME/model`.
        #[arg(long)]
        models: Option<PathBuf>,

        /// 同时写出每个切片的 PNG 预览.
        #[arg(long, default_value_t = false)]
        previews: bool,
    },

    /// 将已保存的结果体数据逐切片写为 PNG 预览 (以 0.25 二值化).
    Preview {
        #[arg(long)]
        volume: PathBuf,

        /// 预览目录. 默认为结果目录下的 `previews`.
        #[arg(long)]
        out: Option<PathBuf>,

        /// 不做二值化, 直接按 min-max 拉伸.
        #[arg(long, default_value_t = false)]
        raw: bool,
    },

    /// 将已保存的预测结果与 ROI 比较.
    Eval {
        #[arg(long)]
        roi: PathBuf,

        #[arg(long)]
        pred: PathBuf,

        #[arg(long)]
        dwi: PathBuf,

        /// 预测结果为非灌注病灶.
        #[arg(long, default_value_t = false)]
        non_perfusion: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if let Err(e) = simple_logger::SimpleLogger::new().with_level(level).init() {
        eprintln!("{e}");
    }

    match args.command {
        Command::Run {
            dwi,
            adc,
            mode,
            out,
            models,
            previews,
        } => {
            // 模式在任何加载之前检查.
            let mode: Mode = match mode.parse() {
                Ok(m) => m,
                Err(e) => {
                    log::error!("{e}");
                    return ExitCode::FAILURE;
                }
            };
            if dwi.len() != adc.len() {
                log::error!("`--dwi` 与 `--adc` 个数不一致: {} vs {}", dwi.len(), adc.len());
                return ExitCode::FAILURE;
            }
            let Some(models) = models.or_else(loader::model_dir_from_env_or_home) else {
                log::error!("无法确定模型目录, 请使用 `--models` 或 `$STROKE_MODEL_DIR`");
                return ExitCode::FAILURE;
            };
            let cfg = runner::RunConfig {
                cases: dwi.into_iter().zip(adc).collect(),
                mode,
                out: out.unwrap_or_else(loader::result_dir_from_env_or_cwd),
                models: ModelPaths::from_dir(models),
                previews,
            };

            match runner::run(&cfg) {
                Ok(report) => {
                    if let Err(e) = report.print() {
                        log::error!("{e}");
                    }
                    if report.failures() == 0 {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    }
                }
                Err(e) => {
                    log::error!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Preview { volume, out, raw } => {
            let out = out.unwrap_or_else(|| loader::result_dir_from_env_or_cwd().join("previews"));
            match runner::save_previews(&volume, &out, raw) {
                Ok(n) => {
                    println!("Saved {n} slice(s) to {}", out.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    log::error!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Eval {
            roi,
            pred,
            dwi,
            non_perfusion,
        } => {
            let kind = if non_perfusion {
                LesionKind::NonPerfusion
            } else {
                LesionKind::Perfusion
            };
            match runner::evaluate(&roi, &pred, &dwi, kind) {
                Ok(text) => {
                    println!("{text}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    log::error!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
