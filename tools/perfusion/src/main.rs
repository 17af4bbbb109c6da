//! 由 DSC-MRI 4D 信号计算脑灌注参数图.
//!
//! ```text
//! perfusion <dsc.nii.gz> <mask.nii.gz> <out_dir> [--te 0.03] [--tr 1.5] [--apply-mask] ...
//! ```
//!
//! 相对路径若不存在, 会在 `$DSC_DATA_DIR` (默认 `$HOME/dataset/dsc`) 下查找.

mod result;
mod runner;

use clap::Parser;
use dsc_berry::consts::{aif, deconv, DEFAULT_TE};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::path::PathBuf;

/// 命令行参数.
#[derive(Parser, Debug)]
#[command(version, about = "由 DSC-MRI 4D 信号计算脑灌注参数图")]
pub struct Args {
    /// 4D DSC nifti 文件.
    pub dsc: PathBuf,

    /// 3D 脑掩膜 nifti 文件, 大于 0 的体素视为脑内.
    pub mask: PathBuf,

    /// 输出目录, 不存在时自动创建.
    pub out_dir: PathBuf,

    /// 回波时间 (秒).
    #[arg(long, default_value_t = DEFAULT_TE)]
    pub te: f64,

    /// 重复时间 (秒). 未指定时读取 header 的 pixdim[4], 仍无效则取 1.5.
    #[arg(long)]
    pub tr: Option<f64>,

    /// 将掩膜外的输出体素置为 NaN.
    #[arg(long)]
    pub apply_mask: bool,

    /// 空间高斯平滑 sigma (体素), 0 表示关闭.
    #[arg(long, default_value_t = 0.0)]
    pub spatial_sigma: f64,

    /// 时间高斯平滑 sigma (帧), 0 表示关闭.
    #[arg(long, default_value_t = 0.0)]
    pub temporal_sigma: f64,

    /// AIF 候选体素个数.
    #[arg(long, default_value_t = aif::NUM_CANDIDATES)]
    pub num_candidates: usize,

    /// AIF 候选体素的信号下降阈值.
    #[arg(long, default_value_t = aif::DROP_THRESHOLD)]
    pub drop_threshold: f64,

    /// 反卷积正则化常数.
    #[arg(long, default_value_t = deconv::REGULARIZATION)]
    pub regularization: f64,

    /// 工作线程数, 默认为全部可用核心.
    #[arg(long)]
    pub threads: Option<usize>,

    /// 输出调试日志.
    #[arg(short, long)]
    pub verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).init()?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads.unwrap_or_else(utils::cpus))
        .build_global()?;

    let report = runner::run(&args)?;
    report.analyze();
    Ok(())
}
