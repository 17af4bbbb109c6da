//! 基于正则化 SVD 的反卷积.
//!
//! 组织 ΔR2* 曲线可以写成 `C = A · r`, 其中 `A` 是由标准化 AIF 构造的下三角 Toeplitz
//! 卷积矩阵, `r` 为 (缩放后的) 残差函数. 这里对 `A` 做奇异值分解,
//! 用 `V · diag(1 / (s + λ)) · Uᵀ` 作为正则化伪逆.

use crate::consts::deconv::*;
use crate::relaxivity::finite_or_zero;
use crate::{check_abort, PerfResult, PerfusionError};
use itertools::Itertools;
use nalgebra::DMatrix;
use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView3, ArrayView4, Axis, Zip};
use std::sync::atomic::AtomicBool;

/// 标准化为零均值, 单位方差: `(x - mean) / (std + eps)`, `std` 为总体标准差.
///
/// 结果中的非有限值置零. 空输入返回空数组.
pub fn standardize(x: ArrayView1<f64>, eps: f64) -> Array1<f64> {
    if x.is_empty() {
        return Array1::zeros(0);
    }
    let n = x.len() as f64;
    let mean = x.sum() / n;
    let std = (x.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n).sqrt();
    x.mapv(|v| finite_or_zero((v - mean) / (std + eps)))
}

/// 由卷积核构造 `T x T` 的下三角 Toeplitz 矩阵, 即 `A[i.., i] = kernel[..T - i]`.
pub fn convolution_matrix(kernel: ArrayView1<f64>) -> Array2<f64> {
    let t = kernel.len();
    Array2::from_shape_fn((t, t), |(i, j)| if i >= j { kernel[i - j] } else { 0.0 })
}

/// 正则化伪逆 `V · diag(1 / (s + λ)) · Uᵀ`. 非有限元素置零.
pub fn regularized_pinv(a: &Array2<f64>, regularization: f64) -> Array2<f64> {
    let (rows, cols) = a.dim();
    let mat = DMatrix::from_fn(rows, cols, |i, j| a[(i, j)]);
    let svd = mat.svd(true, true);
    // 请求了 `u` 与 `v_t`, 此处一定存在.
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        unreachable!()
    };
    let inv_s: Vec<f64> = svd
        .singular_values
        .iter()
        .map(|&s| 1.0 / (s + regularization))
        .collect();

    Array2::from_shape_fn((cols, rows), |(i, j)| {
        let v: f64 = inv_s
            .iter()
            .enumerate()
            .map(|(k, &w)| v_t[(k, i)] * w * u[(j, k)])
            .sum();
        finite_or_zero(v)
    })
}

/// 第一个最大值的位置. 数组为空时返回 `None`.
#[inline]
fn first_argmax(x: ArrayView1<f64>) -> Option<usize> {
    x.iter().position_min_by(|a, b| b.total_cmp(a))
}

/// 单个体素的血流动力学参数.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct VoxelHemodynamics {
    /// 残差函数的最大值.
    pub rcbf: f64,

    /// 达峰时间.
    pub ttp: f64,

    /// 首次到达峰值 10% 的时间. 峰值非正时为 0.
    pub tt0: f64,
}

/// 预先计算好卷积矩阵及其伪逆的反卷积器.
///
/// 构建之后只读, 可以在线程之间共享.
#[derive(Clone, Debug)]
pub struct Deconvolver {
    kernel: Array1<f64>,
    operator: Array2<f64>,
    pinv: Array2<f64>,
    regularization: f64,
}

impl Deconvolver {
    /// 由 AIF 的 ΔR2* 曲线构建. 曲线先被标准化.
    pub fn new(aif_delta: ArrayView1<f64>, regularization: f64) -> Self {
        Self::with_kernel(standardize(aif_delta, STD_EPS), regularization)
    }

    /// 由已经标准化的卷积核构建.
    pub fn with_kernel(kernel: Array1<f64>, regularization: f64) -> Self {
        let operator = convolution_matrix(kernel.view());
        let pinv = regularized_pinv(&operator, regularization);
        Self {
            kernel,
            operator,
            pinv,
            regularization,
        }
    }

    /// 卷积核.
    #[inline]
    pub fn kernel(&self) -> ArrayView1<'_, f64> {
        self.kernel.view()
    }

    /// 正则化常数.
    #[inline]
    pub fn regularization(&self) -> f64 {
        self.regularization
    }

    /// 时间帧数.
    #[inline]
    pub fn frames(&self) -> usize {
        self.kernel.len()
    }

    /// 正向卷积 `A · residue`.
    pub fn convolve(&self, residue: ArrayView1<f64>) -> Array1<f64> {
        self.operator.dot(&residue)
    }

    /// 用正则化伪逆求残差函数.
    pub fn residue(&self, curve: ArrayView1<f64>) -> Array1<f64> {
        self.pinv.dot(&curve).mapv(finite_or_zero)
    }

    /// 分析单条组织 ΔR2* 曲线. 曲线全为零时返回 `None`.
    ///
    /// 曲线先减去前 5 帧均值再反卷积; TTP 与 TT0 基于未平移的曲线.
    pub fn analyze(
        &self,
        curve: ArrayView1<f64>,
        time: ArrayView1<f64>,
    ) -> Option<VoxelHemodynamics> {
        if curve.iter().all(|&v| v == 0.0) {
            return None;
        }

        let n = BASELINE_LEN.min(curve.len());
        let baseline = curve.slice(s![..n]).sum() / n as f64;
        let residue = self.residue(curve.mapv(|v| v - baseline).view());
        let rcbf = residue.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let peak_at = first_argmax(curve)?;
        let peak = curve[peak_at];
        let tt0 = if peak > 0.0 {
            let threshold = ONSET_FRACTION * peak;
            curve
                .iter()
                .position(|&v| v >= threshold)
                .map_or(0.0, |i| time[i])
        } else {
            0.0
        };

        Some(VoxelHemodynamics {
            rcbf: finite_or_zero(rcbf),
            ttp: time[peak_at],
            tt0,
        })
    }
}

/// 反卷积得到的三张参数图. 掩膜外及全零体素为 0.
#[derive(Clone, Debug, PartialEq)]
pub struct DeconvMaps {
    /// rCBF.
    pub rcbf: Array3<f64>,

    /// TTP.
    pub ttp: Array3<f64>,

    /// TT0.
    pub tt0: Array3<f64>,
}

/// 对掩膜内所有体素反卷积.
///
/// 逐 z 层处理, 每层开始前检查 `abort`. `time` 与 `delta` 的时间轴长度必须等于
/// `deconvolver` 的帧数, 否则程序 panic.
///
/// # 错误
///
/// - 掩膜形状与 `delta` 前三维不一致时返回 [`PerfusionError::ShapeMismatch`];
/// - `abort` 被置位时返回 [`PerfusionError::Cancelled`].
pub fn deconvolve_volume(
    delta: ArrayView4<f64>,
    mask: ArrayView3<bool>,
    time: ArrayView1<f64>,
    deconvolver: &Deconvolver,
    abort: Option<&AtomicBool>,
) -> PerfResult<DeconvMaps> {
    let (sx, sy, sz, t) = delta.dim();
    if mask.dim() != (sx, sy, sz) {
        return Err(PerfusionError::ShapeMismatch {
            mask: mask.dim(),
            signal: (sx, sy, sz),
        });
    }
    assert_eq!(deconvolver.frames(), t, "AIF 长度与时间轴不一致");
    assert_eq!(time.len(), t, "时间向量长度与时间轴不一致");

    let shape = (sx, sy, sz);
    let mut maps = DeconvMaps {
        rcbf: Array3::zeros(shape),
        ttp: Array3::zeros(shape),
        tt0: Array3::zeros(shape),
    };
    for z in 0..sz {
        check_abort(abort)?;
        let slab = delta.index_axis(Axis(2), z);
        let zip = Zip::from(maps.rcbf.index_axis_mut(Axis(2), z))
            .and(maps.ttp.index_axis_mut(Axis(2), z))
            .and(maps.tt0.index_axis_mut(Axis(2), z))
            .and(mask.index_axis(Axis(2), z))
            .and(slab.lanes(Axis(2)));
        zip_for_each!(
            zip,
            |rcbf: &mut f64,
             ttp: &mut f64,
             tt0: &mut f64,
             &inside: &bool,
             curve: ArrayView1<f64>| {
                if !inside {
                    return;
                }
                if let Some(h) = deconvolver.analyze(curve, time) {
                    *rcbf = h.rcbf;
                    *ttp = h.ttp;
                    *tt0 = h.tt0;
                }
            }
        );
    }
    Ok(maps)
}

/// MTT = rCBV / rCBF, 仅在 rCBF 大于阈值处计算, 其余为 0.
pub fn mean_transit_time(rcbv: ArrayView3<f64>, rcbf: ArrayView3<f64>) -> Array3<f64> {
    Zip::from(&rcbv).and(&rcbf).map_collect(|&v, &f| {
        if f > RCBF_THRESHOLD {
            finite_or_zero(v / f)
        } else {
            0.0
        }
    })
}
