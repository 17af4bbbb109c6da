//! 参数图, 弛豫率时间序列与 AIF 曲线的持久化存储.
//!
//! 参数图与时间序列以 `f32` nifti 格式保存, 路径以 `.gz` 结尾时自动压缩.

use super::DataError;
use crate::AifCurves;
use ndarray::{ArrayView3, ArrayView4};
use ndarray_npy::NpzWriter;
use nifti::writer::WriterOptions;
use nifti::NiftiHeader;
use std::fs::File;
use std::path::Path;

/// 将 3D 参数图保存为 nifti 文件. `reference` 通常为输入扫描的 header,
/// 用于保留仿射变换等空间信息.
pub fn save_map<P: AsRef<Path>>(
    path: P,
    map: ArrayView3<f64>,
    reference: Option<&NiftiHeader>,
) -> Result<(), DataError> {
    let data = map.mapv(|v| v as f32);
    let writer = WriterOptions::new(path.as_ref());
    match reference {
        Some(h) => writer.reference_header(h).write_nifti(&data)?,
        None => writer.write_nifti(&data)?,
    }
    Ok(())
}

/// 将 4D 时间序列保存为 nifti 文件. 参数含义同 [`save_map`].
pub fn save_series<P: AsRef<Path>>(
    path: P,
    series: ArrayView4<f64>,
    reference: Option<&NiftiHeader>,
) -> Result<(), DataError> {
    let data = series.mapv(|v| v as f32);
    let writer = WriterOptions::new(path.as_ref());
    match reference {
        Some(h) => writer.reference_header(h).write_nifti(&data)?,
        None => writer.write_nifti(&data)?,
    }
    Ok(())
}

/// 将 AIF 的四条曲线保存到压缩 npz 文件,
/// 条目名分别为 `raw`, `smoothed`, `delta_r2star`, `standardized`.
pub fn save_aif_npz<P: AsRef<Path>>(path: P, aif: &AifCurves) -> Result<(), DataError> {
    let mut npz = NpzWriter::new_compressed(File::create(path.as_ref())?);
    npz.add_array("raw", &aif.raw)?;
    npz.add_array("smoothed", &aif.smoothed)?;
    npz.add_array("delta_r2star", &aif.delta_r2star)?;
    npz.add_array("standardized", &aif.standardized)?;
    npz.finish()?;
    Ok(())
}
