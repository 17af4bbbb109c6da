//! 程序运行函数.

use crate::result::RunReport;
use crate::Args;
use anyhow::Context;
use dsc_berry::consts::DEFAULT_TR;
use dsc_berry::prelude::*;
use log::{info, warn};
use std::fs;
use std::path::Path;
use std::time::Instant;
use utils::loader;

/// 扩展名.
const NII_GZ: &str = "nii.gz";

/// 确定 TR: 命令行 > header > 默认值.
fn resolve_tr(flag: Option<f64>, scan: &DscScan) -> f64 {
    if let Some(tr) = flag {
        return tr;
    }
    match scan.repetition_time() {
        Some(tr) => {
            info!("使用 header 中的 TR = {tr} s");
            tr
        }
        None => {
            warn!("header 中没有有效的 TR, 使用默认值 {DEFAULT_TR} s");
            DEFAULT_TR
        }
    }
}

/// 保存全部输出.
fn save_all(out: &PerfusionOutput, dir: &Path, scan: &DscScan) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("无法创建输出目录 {}", dir.display()))?;
    let header = Some(scan.header());

    for (name, series) in out.series.named() {
        let path = dir.join(format!("{name}.{NII_GZ}"));
        save_series(&path, series.view(), header)
            .with_context(|| format!("无法写入 {}", path.display()))?;
    }
    for (name, map) in out.maps.named() {
        let path = dir.join(format!("{name}.{NII_GZ}"));
        save_map(&path, map.view(), header).with_context(|| format!("无法写入 {}", path.display()))?;
    }
    let path = dir.join("aif.npz");
    save_aif_npz(&path, &out.aif).with_context(|| format!("无法写入 {}", path.display()))?;
    Ok(())
}

/// 实际运行.
pub fn run(args: &Args) -> anyhow::Result<RunReport> {
    let dsc = loader::resolve_input(&args.dsc);
    let mask = loader::resolve_input(&args.mask);
    info!("读取扫描 {} 与掩膜 {}", dsc.display(), mask.display());
    let data = DscData::open(&dsc, &mask).context("读取输入数据失败")?;
    info!(
        "空间形状 {:?}, 共 {} 个体素, 体素尺寸 {:?}, 体素体积 {:.3}",
        data.scan.shape(),
        data.scan.size(),
        data.scan.pix_dim(),
        data.scan.voxel()
    );

    let params = PerfusionParams {
        te: args.te,
        tr: resolve_tr(args.tr, &data.scan),
        spatial_sigma: args.spatial_sigma,
        temporal_sigma: args.temporal_sigma,
        apply_mask: args.apply_mask,
        num_candidates: args.num_candidates,
        drop_threshold: args.drop_threshold,
        regularization: args.regularization,
        ..Default::default()
    };
    let engine = Perfusion::new(params).context("参数不合法")?;

    let start = Instant::now();
    let out = engine
        .run(data.scan.data(), data.mask.data())
        .context("灌注计算失败")?;
    let elapsed = start.elapsed();

    info!("保存结果到 {}", args.out_dir.display());
    save_all(&out, &args.out_dir, &data.scan)?;

    Ok(RunReport::new(&out, elapsed, data.mask.data()))
}
