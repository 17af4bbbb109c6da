//! BSW (Boxerman-Schmainda-Weisskoff) 渗漏校正.
//!
//! 对每个体素做线性回归 `tissue(t) ~ K2 · ∫AIF + K1`, 然后从组织曲线中减去
//! `K2 · ∫AIF`, 校正前后的曲线用 Simpson 公式积分得到 rCBV.

use crate::fitting::{cumulative_trapezoid, linregress, simpson};
use crate::relaxivity::finite_or_zero;
use crate::{check_abort, Idx3d, PerfResult, PerfusionError};
use log::debug;
use ndarray::{Array1, Array3, ArrayView1, ArrayView3, ArrayView4, Axis, Zip};
use std::sync::atomic::AtomicBool;

/// 单个体素的校正结果.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct VoxelLeakage {
    /// 校正前的 rCBV.
    pub rcbv_uncorrected: f64,

    /// 校正后的 rCBV.
    pub rcbv_corrected: f64,

    /// 回归截距.
    pub k1: f64,

    /// 回归斜率, 即渗漏系数.
    pub k2: f64,
}

/// 对单条组织 ΔR2* 曲线做渗漏校正.
///
/// `aif_int` 为 AIF ΔR2* 的累积梯形积分, `time` 为采样时刻. 三者长度必须一致.
pub fn correct_curve(
    tissue: ArrayView1<f64>,
    aif_int: ArrayView1<f64>,
    time: ArrayView1<f64>,
) -> VoxelLeakage {
    let fit = linregress(aif_int, tissue);
    let k2 = fit.slope();
    let corrected: Array1<f64> = Zip::from(&tissue)
        .and(&aif_int)
        .map_collect(|&c, &a| c - k2 * a);

    VoxelLeakage {
        rcbv_uncorrected: finite_or_zero(simpson(tissue, time)),
        rcbv_corrected: finite_or_zero(simpson(corrected.view(), time)),
        k1: fit.intercept(),
        k2,
    }
}

/// 渗漏校正得到的四张参数图. 掩膜外为 0.
#[derive(Clone, Debug, PartialEq)]
pub struct LeakageMaps {
    /// 校正前的 rCBV.
    pub rcbv_uncorrected: Array3<f64>,

    /// 校正后的 rCBV.
    pub rcbv_corrected: Array3<f64>,

    /// K1.
    pub k1: Array3<f64>,

    /// K2.
    pub k2: Array3<f64>,
}

impl LeakageMaps {
    /// 全零参数图.
    pub fn zeros(shape: Idx3d) -> Self {
        Self {
            rcbv_uncorrected: Array3::zeros(shape),
            rcbv_corrected: Array3::zeros(shape),
            k1: Array3::zeros(shape),
            k2: Array3::zeros(shape),
        }
    }
}

/// 对掩膜内所有体素做 BSW 渗漏校正.
///
/// `delta` 为 `(x, y, z, t)` 的组织 ΔR2*, `aif_delta` 为 AIF 的 ΔR2*, `time` 为采样时刻.
/// 逐 z 层处理, 每层开始前检查 `abort`.
///
/// `aif_delta`, `time` 的长度与 `delta` 的时间轴不一致时 panic.
///
/// # 错误
///
/// - 掩膜形状与 `delta` 前三维不一致时返回 [`PerfusionError::ShapeMismatch`];
/// - `abort` 被置位时返回 [`PerfusionError::Cancelled`].
pub fn bsw_correction(
    delta: ArrayView4<f64>,
    aif_delta: ArrayView1<f64>,
    mask: ArrayView3<bool>,
    time: ArrayView1<f64>,
    abort: Option<&AtomicBool>,
) -> PerfResult<LeakageMaps> {
    let (sx, sy, sz, t) = delta.dim();
    if mask.dim() != (sx, sy, sz) {
        return Err(PerfusionError::ShapeMismatch {
            mask: mask.dim(),
            signal: (sx, sy, sz),
        });
    }
    assert_eq!(aif_delta.len(), t, "AIF 长度与时间轴不一致");
    assert_eq!(time.len(), t, "时间向量长度与时间轴不一致");

    let aif_int = cumulative_trapezoid(aif_delta, time);
    if aif_int.iter().all(|&v| v == aif_int[0]) {
        debug!("AIF 累积积分为常数, 渗漏回归退化: K2 = 0, K1 = 组织均值");
    }

    let mut maps = LeakageMaps::zeros((sx, sy, sz));
    for z in 0..sz {
        check_abort(abort)?;
        let slab = delta.index_axis(Axis(2), z);
        let zip = Zip::from(maps.rcbv_uncorrected.index_axis_mut(Axis(2), z))
            .and(maps.rcbv_corrected.index_axis_mut(Axis(2), z))
            .and(maps.k1.index_axis_mut(Axis(2), z))
            .and(maps.k2.index_axis_mut(Axis(2), z))
            .and(mask.index_axis(Axis(2), z))
            .and(slab.lanes(Axis(2)));
        zip_for_each!(
            zip,
            |u: &mut f64,
             c: &mut f64,
             k1: &mut f64,
             k2: &mut f64,
             &inside: &bool,
             tissue: ArrayView1<f64>| {
                if inside {
                    let v = correct_curve(tissue, aif_int.view(), time);
                    *u = v.rcbv_uncorrected;
                    *c = v.rcbv_corrected;
                    *k1 = v.k1;
                    *k2 = v.k2;
                }
            }
        );
    }
    Ok(maps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{s, Array4};
    use std::sync::atomic::Ordering;

    const T: usize = 21;
    const TR: f64 = 1.5;

    fn time() -> Array1<f64> {
        Array1::from_shape_fn(T, |i| i as f64 * TR)
    }

    fn aif() -> Array1<f64> {
        Array1::from_shape_fn(T, |i| {
            let d = i as f64 - 8.0;
            20.0 * (-d * d / 6.0).exp()
        })
    }

    #[test]
    fn test_recovers_k1_k2() {
        let t = time();
        let aif_int = cumulative_trapezoid(aif().view(), t.view());
        let tissue = aif_int.mapv(|a| 0.05 * a + 0.7);
        let v = correct_curve(tissue.view(), aif_int.view(), t.view());
        assert_abs_diff_eq!(v.k2, 0.05, epsilon = 1e-10);
        assert_abs_diff_eq!(v.k1, 0.7, epsilon = 1e-10);
        // 校正后为常数 0.7.
        assert_abs_diff_eq!(v.rcbv_corrected, 0.7 * (T - 1) as f64 * TR, epsilon = 1e-8);
        assert_abs_diff_eq!(v.rcbv_uncorrected, simpson(tissue.view(), t.view()), epsilon = 1e-12);
    }

    #[test]
    fn test_corrected_not_above_uncorrected() {
        let t = time();
        let a = aif();
        let aif_int = cumulative_trapezoid(a.view(), t.view());
        // 随时间上升的组织曲线与单调的 ∫AIF 正相关.
        let tissue = Zip::from(&t).and(&aif_int).map_collect(|&x, &i| 0.2 * x + 0.02 * i);
        let v = correct_curve(tissue.view(), aif_int.view(), t.view());
        assert!(v.k2 > 0.0);
        assert!(v.rcbv_corrected <= v.rcbv_uncorrected);
    }

    #[test]
    fn test_degenerate_regression() {
        let t = time();
        let aif_int = Array1::zeros(T);
        let tissue = Array1::from_shape_fn(T, |i| i as f64);
        let v = correct_curve(tissue.view(), aif_int.view(), t.view());
        assert_eq!(v.k2, 0.0);
        assert_abs_diff_eq!(v.k1, 10.0);
        assert_abs_diff_eq!(v.rcbv_corrected, v.rcbv_uncorrected);
    }

    fn volume() -> (Array4<f64>, Array3<bool>) {
        let a = aif();
        let mut delta = Array4::zeros((3, 2, 2, T));
        for ((x, y, z, i), v) in delta.indexed_iter_mut() {
            *v = a[i] * (0.1 + 0.1 * (x + y + z) as f64);
        }
        let mut mask = Array3::from_elem((3, 2, 2), true);
        mask[(2, 1, 0)] = false;
        mask[(0, 0, 1)] = false;
        (delta, mask)
    }

    #[test]
    fn test_volume_matches_curve() {
        let (delta, mask) = volume();
        let t = time();
        let a = aif();
        let maps = bsw_correction(delta.view(), a.view(), mask.view(), t.view(), None).unwrap();
        let aif_int = cumulative_trapezoid(a.view(), t.view());
        for ((x, y, z), &inside) in mask.indexed_iter() {
            let idx = (x, y, z);
            if inside {
                let v = correct_curve(delta.slice(s![x, y, z, ..]), aif_int.view(), t.view());
                assert_abs_diff_eq!(
                    maps.rcbv_uncorrected[idx],
                    v.rcbv_uncorrected,
                    epsilon = 1e-12
                );
                assert_abs_diff_eq!(maps.rcbv_corrected[idx], v.rcbv_corrected, epsilon = 1e-12);
                assert_abs_diff_eq!(maps.k1[idx], v.k1, epsilon = 1e-12);
                assert_abs_diff_eq!(maps.k2[idx], v.k2, epsilon = 1e-12);
                assert!(maps.rcbv_uncorrected[idx] > 0.0);
            } else {
                assert_eq!(maps.rcbv_uncorrected[idx], 0.0);
                assert_eq!(maps.rcbv_corrected[idx], 0.0);
                assert_eq!(maps.k1[idx], 0.0);
                assert_eq!(maps.k2[idx], 0.0);
            }
        }
    }

    #[test]
    fn test_shape_mismatch_and_abort() {
        let (delta, _) = volume();
        let t = time();
        let a = aif();
        let mask = Array3::from_elem((3, 2, 1), true);
        assert!(matches!(
            bsw_correction(delta.view(), a.view(), mask.view(), t.view(), None),
            Err(PerfusionError::ShapeMismatch { .. })
        ));

        let mask = Array3::from_elem((3, 2, 2), true);
        let abort = AtomicBool::new(false);
        abort.store(true, Ordering::Relaxed);
        assert_eq!(
            bsw_correction(delta.view(), a.view(), mask.view(), t.view(), Some(&abort)),
            Err(PerfusionError::Cancelled)
        );
    }
}
