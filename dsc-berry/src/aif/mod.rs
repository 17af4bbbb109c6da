//! 动脉输入函数 (AIF) 的自动检测与后处理.
//!
//! 检测流程:
//!
//! 1. 掩膜内体素按 `(x, y, z)` 的 C 顺序展开;
//! 2. 以前 5 帧均值为基线, 计算信号下降幅度 `baseline - min`, 保留超过阈值的体素;
//! 3. 按下降幅度从大到小 (相同时按展开序号从小到大) 取前 N 个候选;
//! 4. 候选曲线 PCA 降到 2 维, 取离质心最近的候选.

mod embed;
mod smooth;

pub use smooth::{flatten_edges, savgol_coeffs, savgol_filter};

use crate::consts::aif::*;
use crate::deconv::standardize;
use crate::relaxivity::{delta_r2star, BaselineWindow};
use crate::{Idx3d, PerfResult, PerfusionError};
use embed::{nearest_to_centroid, pca_embedding};
use itertools::Itertools;
use log::debug;
use nalgebra::DMatrix;
use ndarray::{s, Array1, ArrayView1, ArrayView3, ArrayView4};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;

/// 被选为 AIF 的体素.
#[derive(Clone, Debug, PartialEq)]
pub struct AifCandidate {
    /// 体素索引 `(x, y, z)`.
    pub index: Idx3d,

    /// 该体素的信号下降幅度.
    pub drop: f64,

    /// 该体素的原始信号曲线.
    pub curve: Array1<f64>,

    /// 参与 PCA 的候选个数.
    pub candidates: usize,
}

/// 单条曲线的信号下降幅度: 前 5 帧均值减去最小值.
///
/// 曲线含有非有限值时返回 NaN, 该体素不会成为候选.
fn signal_drop(curve: ArrayView1<f64>) -> f64 {
    if curve.is_empty() || curve.iter().any(|v| !v.is_finite()) {
        return f64::NAN;
    }
    let n = DROP_BASELINE_LEN.min(curve.len());
    let baseline = curve.slice(s![..n]).sum() / n as f64;
    let min = curve.iter().copied().fold(f64::INFINITY, f64::min);
    baseline - min
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::prelude::*;

        fn voxel_drops(signal: ArrayView4<f64>, positions: &[Idx3d]) -> Vec<f64> {
            positions
                .par_iter()
                .map(|&(x, y, z)| signal_drop(signal.slice(s![x, y, z, ..])))
                .collect()
        }
    } else {
        fn voxel_drops(signal: ArrayView4<f64>, positions: &[Idx3d]) -> Vec<f64> {
            positions
                .iter()
                .map(|&(x, y, z)| signal_drop(signal.slice(s![x, y, z, ..])))
                .collect()
        }
    }
}

/// 在掩膜内自动检测 AIF 体素.
///
/// `signal` 为 `(x, y, z, t)` 的信号强度, `mask` 的形状必须与其前三维一致.
/// 只有下降幅度严格大于 `drop_threshold` 的体素才是候选, 最多保留 `num_candidates` 个.
///
/// # 错误
///
/// - 形状不一致时返回 [`PerfusionError::ShapeMismatch`];
/// - 没有任何候选时返回 [`PerfusionError::NoAifCandidates`].
pub fn detect_aif(
    signal: ArrayView4<f64>,
    mask: ArrayView3<bool>,
    num_candidates: usize,
    drop_threshold: f64,
) -> PerfResult<AifCandidate> {
    let (sx, sy, sz, t) = signal.dim();
    if mask.dim() != (sx, sy, sz) {
        return Err(PerfusionError::ShapeMismatch {
            mask: mask.dim(),
            signal: (sx, sy, sz),
        });
    }

    let positions: Vec<Idx3d> = mask
        .indexed_iter()
        .filter_map(|(pos, &inside)| inside.then_some(pos))
        .collect();
    let drops = voxel_drops(signal, &positions);

    let ranked: Vec<usize> = (0..positions.len())
        .filter(|&i| drops[i] > drop_threshold)
        .sorted_by_key(|&i| (Reverse(OrderedFloat(drops[i])), i))
        .take(num_candidates)
        .collect();
    if ranked.is_empty() {
        return Err(PerfusionError::NoAifCandidates {
            threshold: drop_threshold,
        });
    }

    let best = if ranked.len() == 1 {
        0
    } else {
        let data = DMatrix::from_fn(ranked.len(), t, |r, c| {
            let (x, y, z) = positions[ranked[r]];
            signal[(x, y, z, c)]
        });
        nearest_to_centroid(&pca_embedding(&data, PCA_COMPONENTS)).unwrap_or(0)
    };

    let chosen = ranked[best];
    let (x, y, z) = positions[chosen];
    debug!(
        "AIF 体素 {:?}, 下降幅度 {:.2}, 候选 {} 个 (掩膜内 {} 个体素)",
        (x, y, z),
        drops[chosen],
        ranked.len(),
        positions.len()
    );
    Ok(AifCandidate {
        index: (x, y, z),
        drop: drops[chosen],
        curve: signal.slice(s![x, y, z, ..]).to_owned(),
        candidates: ranked.len(),
    })
}

/// AIF 曲线及其派生形式.
#[derive(Clone, Debug, PartialEq)]
pub struct AifCurves {
    /// 原始信号.
    pub raw: Array1<f64>,

    /// Savitzky-Golay 平滑并首尾平坦化后的信号.
    pub smoothed: Array1<f64>,

    /// 平滑信号的 ΔR2*.
    pub delta_r2star: Array1<f64>,

    /// 标准化 (零均值, 单位方差) 后的 ΔR2*, 作为反卷积核.
    pub standardized: Array1<f64>,
}

impl AifCurves {
    /// 分析 AIF 曲线所需的最少帧数.
    pub fn min_frames(window: BaselineWindow) -> usize {
        SAVGOL_WINDOW
            .max(FLAT_EDGE_LEN + FLAT_EDGE_SPAN)
            .max(DROP_BASELINE_LEN)
            .max(window.end())
    }

    /// 由原始信号曲线计算各派生曲线. `eps` 为标准化时加在标准差上的小量.
    ///
    /// 曲线长度小于 [`AifCurves::min_frames`] 时 panic.
    pub fn from_raw(raw: Array1<f64>, te: f64, window: BaselineWindow, eps: f64) -> Self {
        let smoothed = flatten_edges(
            savgol_filter(raw.view(), SAVGOL_WINDOW, SAVGOL_ORDER),
            FLAT_EDGE_LEN,
            FLAT_EDGE_SPAN,
        );
        let delta_r2star = delta_r2star(smoothed.view(), te, window);
        let standardized = standardize(delta_r2star.view(), eps);
        Self {
            raw,
            smoothed,
            delta_r2star,
            standardized,
        }
    }

    /// 曲线帧数.
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// 曲线是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::deconv::STD_EPS;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array3, Array4};

    const T: usize = 20;

    fn bolus(depth: f64) -> Array1<f64> {
        Array1::from_shape_fn(T, |i| {
            let d = i as f64 - 11.0;
            if d.abs() > 5.0 {
                1000.0
            } else {
                1000.0 - depth * (-d * d / 4.0).exp()
            }
        })
    }

    fn volume_with(curves: &[(Idx3d, Array1<f64>)]) -> Array4<f64> {
        let mut vol = Array4::from_elem((3, 3, 2, T), 1000.0);
        for ((x, y, z), c) in curves {
            vol.slice_mut(s![*x, *y, *z, ..]).assign(c);
        }
        vol
    }

    #[test]
    fn test_signal_drop() {
        let c = bolus(150.0);
        assert_abs_diff_eq!(signal_drop(c.view()), 150.0, epsilon = 1e-6);
        let mut bad = c.clone();
        bad[3] = f64::NAN;
        assert!(signal_drop(bad.view()).is_nan());
    }

    #[test]
    fn test_single_voxel_selected() {
        let vol = volume_with(&[((1, 2, 1), bolus(150.0)), ((0, 0, 0), bolus(60.0))]);
        let mask = Array3::from_elem((3, 3, 2), true);
        let aif = detect_aif(vol.view(), mask.view(), 200, 100.0).unwrap();
        assert_eq!(aif.index, (1, 2, 1));
        assert_eq!(aif.candidates, 1);
        assert_abs_diff_eq!(aif.drop, 150.0, epsilon = 1e-6);
        assert_eq!(aif.curve, bolus(150.0));
    }

    #[test]
    fn test_no_candidates() {
        let vol = volume_with(&[((1, 1, 1), bolus(90.0))]);
        let mask = Array3::from_elem((3, 3, 2), true);
        let err = detect_aif(vol.view(), mask.view(), 200, 100.0).unwrap_err();
        assert_eq!(err, PerfusionError::NoAifCandidates { threshold: 100.0 });

        // 候选体素在掩膜之外.
        let vol = volume_with(&[((1, 1, 1), bolus(300.0))]);
        let mut mask = Array3::from_elem((3, 3, 2), true);
        mask[(1, 1, 1)] = false;
        assert!(detect_aif(vol.view(), mask.view(), 200, 100.0).is_err());
    }

    #[test]
    fn test_shape_mismatch() {
        let vol = volume_with(&[]);
        let mask = Array3::from_elem((3, 3, 3), true);
        let err = detect_aif(vol.view(), mask.view(), 200, 100.0).unwrap_err();
        assert_eq!(
            err,
            PerfusionError::ShapeMismatch {
                mask: (3, 3, 3),
                signal: (3, 3, 2)
            }
        );
    }

    #[test]
    fn test_tie_prefers_first_in_order() {
        let vol = volume_with(&[((2, 0, 1), bolus(300.0)), ((0, 1, 0), bolus(300.0))]);
        let mask = Array3::from_elem((3, 3, 2), true);
        let aif = detect_aif(vol.view(), mask.view(), 1, 100.0).unwrap();
        assert_eq!(aif.index, (0, 1, 0));
    }

    #[test]
    fn test_selects_typical_candidate() {
        // 下降幅度 200, 210, 190, 400; 均值 250, 离质心最近的是 210.
        let vol = volume_with(&[
            ((0, 0, 0), bolus(200.0)),
            ((0, 1, 0), bolus(210.0)),
            ((1, 0, 0), bolus(190.0)),
            ((2, 2, 1), bolus(400.0)),
        ]);
        let mask = Array3::from_elem((3, 3, 2), true);
        let aif = detect_aif(vol.view(), mask.view(), 200, 100.0).unwrap();
        assert_eq!(aif.candidates, 4);
        assert_eq!(aif.index, (0, 1, 0));
    }

    #[test]
    fn test_top_n_limits_candidates() {
        let vol = volume_with(&[
            ((0, 0, 0), bolus(200.0)),
            ((0, 1, 0), bolus(210.0)),
            ((1, 0, 0), bolus(190.0)),
            ((2, 2, 1), bolus(400.0)),
        ]);
        let mask = Array3::from_elem((3, 3, 2), true);
        let aif = detect_aif(vol.view(), mask.view(), 2, 100.0).unwrap();
        assert_eq!(aif.candidates, 2);
        assert!(aif.index == (2, 2, 1) || aif.index == (0, 1, 0));
    }

    #[test]
    fn test_curves_from_raw() {
        let raw = bolus(400.0);
        let curves = AifCurves::from_raw(raw.clone(), 0.03, BaselineWindow::standard(), STD_EPS);
        assert_eq!(curves.len(), T);
        assert!(!curves.is_empty());
        assert_eq!(curves.raw, raw);
        assert!(curves.smoothed.slice(s![..5]).iter().all(|v| *v == curves.smoothed[0]));

        let k = &curves.standardized;
        let mean = k.sum() / T as f64;
        let var = k.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / T as f64;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(var, 1.0, epsilon = 1e-6);

        // 峰值位置不变.
        let argmax = |a: &Array1<f64>| a.iter().position_max_by(|a, b| a.total_cmp(b)).unwrap();
        assert_eq!(argmax(&curves.delta_r2star), 11);
    }

    #[test]
    fn test_min_frames() {
        assert_eq!(AifCurves::min_frames(BaselineWindow::standard()), 10);
        assert_eq!(AifCurves::min_frames(BaselineWindow::new(0, 3).unwrap()), 8);
    }
}
