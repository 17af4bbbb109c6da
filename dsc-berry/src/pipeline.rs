//! 灌注计算流程编排.
//!
//! 信号 -> (可选) 高斯平滑 -> R2*, ΔR2* -> AIF 检测 -> BSW 渗漏校正 -> SVD 反卷积 -> MTT
//! -> (可选) 掩膜外置为哨兵值.

use crate::aif::{detect_aif, AifCandidate, AifCurves};
use crate::consts::deconv::STD_EPS;
use crate::consts::{aif, deconv, DEFAULT_TE, DEFAULT_TR};
use crate::deconv::{deconvolve_volume, mean_transit_time, Deconvolver};
use crate::filter::{gaussian_filter_spatial, gaussian_filter_temporal};
use crate::leakage::bsw_correction;
use crate::relaxivity::{delta_r2star_volume, r2star_volume, BaselineWindow};
use crate::{check_abort, PerfResult, PerfusionError};
use log::{info, warn};
use ndarray::{Array1, Array3, Array4, ArrayView3, ArrayView4, ArrayViewMut1, Axis, Zip};
use std::sync::atomic::AtomicBool;

/// 灌注计算参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PerfusionParams {
    /// 回波时间 (秒).
    pub te: f64,

    /// 重复时间, 即采样间隔 (秒).
    pub tr: f64,

    /// 空间高斯平滑 sigma (体素). 0 表示不平滑.
    pub spatial_sigma: f64,

    /// 时间高斯平滑 sigma (帧). 0 表示不平滑.
    pub temporal_sigma: f64,

    /// 是否将掩膜外的体素置为 `sentinel`.
    pub apply_mask: bool,

    /// 掩膜外体素的哨兵值.
    pub sentinel: f64,

    /// AIF 候选体素个数上限.
    pub num_candidates: usize,

    /// AIF 候选体素的信号下降幅度阈值.
    pub drop_threshold: f64,

    /// 反卷积奇异值正则化常数.
    pub regularization: f64,

    /// 计算 R2*, ΔR2* 时的基线窗口.
    pub baseline: BaselineWindow,
}

impl Default for PerfusionParams {
    fn default() -> Self {
        Self {
            te: DEFAULT_TE,
            tr: DEFAULT_TR,
            spatial_sigma: 0.0,
            temporal_sigma: 0.0,
            apply_mask: false,
            sentinel: f64::NAN,
            num_candidates: aif::NUM_CANDIDATES,
            drop_threshold: aif::DROP_THRESHOLD,
            regularization: deconv::REGULARIZATION,
            baseline: BaselineWindow::standard(),
        }
    }
}

impl PerfusionParams {
    /// 检查参数合法性.
    pub fn validate(&self) -> PerfResult<()> {
        use PerfusionError::InvalidParam;

        let positive = |v: f64| v.is_finite() && v > 0.0;
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !positive(self.te) {
            return Err(InvalidParam("TE 必须为正"));
        }
        if !positive(self.tr) {
            return Err(InvalidParam("TR 必须为正"));
        }
        if !non_negative(self.spatial_sigma) || !non_negative(self.temporal_sigma) {
            return Err(InvalidParam("平滑 sigma 不能为负"));
        }
        if !non_negative(self.regularization) {
            return Err(InvalidParam("正则化常数不能为负"));
        }
        if self.num_candidates == 0 {
            return Err(InvalidParam("AIF 候选个数必须为正"));
        }
        if self.drop_threshold.is_nan() {
            return Err(InvalidParam("信号下降阈值不能为 NaN"));
        }
        if self.baseline.is_empty() {
            return Err(InvalidParam("基线窗口不能为空"));
        }
        Ok(())
    }

    /// 计算所需的最少时间帧数.
    #[inline]
    pub fn min_frames(&self) -> usize {
        AifCurves::min_frames(self.baseline).max(deconv::BASELINE_LEN)
    }
}

/// 将 `mask` 之外的体素置为 `value`.
fn fill_outside_3d(map: &mut Array3<f64>, mask: ArrayView3<bool>, value: f64) {
    Zip::from(map).and(&mask).for_each(|v, &inside| {
        if !inside {
            *v = value;
        }
    });
}

/// 八张参数图.
#[derive(Clone, Debug, PartialEq)]
pub struct ParametricMaps {
    /// 校正前的 rCBV.
    pub rcbv_uncorrected: Array3<f64>,

    /// 校正后的 rCBV.
    pub rcbv_corrected: Array3<f64>,

    /// 渗漏回归截距.
    pub k1: Array3<f64>,

    /// 渗漏系数.
    pub k2: Array3<f64>,

    /// rCBF.
    pub rcbf: Array3<f64>,

    /// 平均通过时间.
    pub mtt: Array3<f64>,

    /// 达峰时间.
    pub ttp: Array3<f64>,

    /// 到达时间.
    pub tt0: Array3<f64>,
}

impl ParametricMaps {
    /// 按导出文件名 (不含扩展名) 列出所有参数图.
    pub fn named(&self) -> [(&'static str, &Array3<f64>); 8] {
        [
            ("rCBV_uncorrected", &self.rcbv_uncorrected),
            ("rCBV_corrected", &self.rcbv_corrected),
            ("K2", &self.k2),
            ("K1", &self.k1),
            ("rCBF", &self.rcbf),
            ("MTT", &self.mtt),
            ("TTP", &self.ttp),
            ("TT0", &self.tt0),
        ]
    }

    fn fill_outside(&mut self, mask: ArrayView3<bool>, value: f64) {
        for map in [
            &mut self.rcbv_uncorrected,
            &mut self.rcbv_corrected,
            &mut self.k1,
            &mut self.k2,
            &mut self.rcbf,
            &mut self.mtt,
            &mut self.ttp,
            &mut self.tt0,
        ] {
            fill_outside_3d(map, mask, value);
        }
    }
}

/// 4D 弛豫率时间序列.
#[derive(Clone, Debug, PartialEq)]
pub struct RelaxivitySeries {
    /// R2*(t), 非负.
    pub r2star: Array4<f64>,

    /// ΔR2*(t).
    pub delta_r2star: Array4<f64>,
}

impl RelaxivitySeries {
    /// 按导出文件名 (不含扩展名) 列出两个时间序列.
    pub fn named(&self) -> [(&'static str, &Array4<f64>); 2] {
        [
            ("R2star_timeseries", &self.r2star),
            ("deltaR2star_timeseries", &self.delta_r2star),
        ]
    }

    fn fill_outside(&mut self, mask: ArrayView3<bool>, value: f64) {
        for series in [&mut self.r2star, &mut self.delta_r2star] {
            let zip = Zip::from(series.lanes_mut(Axis(3))).and(&mask);
            zip_for_each!(zip, |mut lane: ArrayViewMut1<f64>, &inside: &bool| {
                if !inside {
                    lane.fill(value);
                }
            });
        }
    }
}

/// 一次灌注计算的全部输出.
#[derive(Clone, Debug)]
pub struct PerfusionOutput {
    /// 参数图.
    pub maps: ParametricMaps,

    /// AIF 曲线.
    pub aif: AifCurves,

    /// 被选为 AIF 的体素.
    pub candidate: AifCandidate,

    /// 弛豫率时间序列.
    pub series: RelaxivitySeries,
}

/// 灌注计算器. 持有已验证的参数.
#[derive(Clone, Debug)]
pub struct Perfusion {
    params: PerfusionParams,
}

impl Perfusion {
    /// 用给定参数构建计算器. 参数不合法时返回 [`PerfusionError::InvalidParam`].
    pub fn new(params: PerfusionParams) -> PerfResult<Self> {
        params.validate()?;
        if params.regularization == 0.0 {
            warn!("正则化常数为 0, 反卷积对噪声会非常敏感");
        }
        Ok(Self { params })
    }

    /// 获取参数.
    #[inline]
    pub fn params(&self) -> &PerfusionParams {
        &self.params
    }

    /// 采样时刻 `t_i = i * tr`.
    pub fn time_vector(&self, frames: usize) -> Array1<f64> {
        Array1::from_shape_fn(frames, |i| i as f64 * self.params.tr)
    }

    /// 对 `(x, y, z, t)` 信号与掩膜运行完整的灌注计算.
    #[inline]
    pub fn run(
        &self,
        signal: ArrayView4<f64>,
        mask: ArrayView3<bool>,
    ) -> PerfResult<PerfusionOutput> {
        self.run_inner(signal, mask, None)
    }

    /// 同 [`Perfusion::run`], 但会在各阶段之间以及体素批次 (z 层) 之间检查 `abort`,
    /// 被置位时返回 [`PerfusionError::Cancelled`].
    #[inline]
    pub fn run_cancellable(
        &self,
        signal: ArrayView4<f64>,
        mask: ArrayView3<bool>,
        abort: &AtomicBool,
    ) -> PerfResult<PerfusionOutput> {
        self.run_inner(signal, mask, Some(abort))
    }

    fn run_inner(
        &self,
        signal: ArrayView4<f64>,
        mask: ArrayView3<bool>,
        abort: Option<&AtomicBool>,
    ) -> PerfResult<PerfusionOutput> {
        let p = &self.params;
        let (sx, sy, sz, frames) = signal.dim();
        if mask.dim() != (sx, sy, sz) {
            return Err(PerfusionError::ShapeMismatch {
                mask: mask.dim(),
                signal: (sx, sy, sz),
            });
        }
        let required = p.min_frames();
        if frames < required {
            return Err(PerfusionError::TooFewFrames { frames, required });
        }
        info!(
            "开始灌注计算: 空间形状 {:?}, {} 帧, 掩膜内 {} 个体素",
            (sx, sy, sz),
            frames,
            mask.iter().filter(|v| **v).count()
        );

        check_abort(abort)?;
        let smoothed = (p.spatial_sigma > 0.0 || p.temporal_sigma > 0.0).then(|| {
            info!("高斯平滑: 空间 sigma = {}, 时间 sigma = {}", p.spatial_sigma, p.temporal_sigma);
            let mut data = signal.to_owned();
            gaussian_filter_spatial(data.view_mut(), p.spatial_sigma);
            gaussian_filter_temporal(data.view_mut(), p.temporal_sigma);
            data
        });
        let signal = match &smoothed {
            Some(s) => s.view(),
            None => signal.view(),
        };

        check_abort(abort)?;
        info!("计算 R2* 与 ΔR2* 时间序列");
        let r2star = r2star_volume(signal, p.te, p.baseline);
        let delta = delta_r2star_volume(signal, p.te, p.baseline);

        check_abort(abort)?;
        info!("检测 AIF");
        let candidate = detect_aif(signal, mask, p.num_candidates, p.drop_threshold)?;
        info!(
            "AIF 位于 {:?}, 下降幅度 {:.2}, 共 {} 个候选",
            candidate.index, candidate.drop, candidate.candidates
        );
        let aif = AifCurves::from_raw(candidate.curve.clone(), p.te, p.baseline, STD_EPS);
        let time = self.time_vector(frames);

        info!("BSW 渗漏校正");
        let leakage = bsw_correction(
            delta.view(),
            aif.delta_r2star.view(),
            mask,
            time.view(),
            abort,
        )?;

        info!("SVD 反卷积, 正则化常数 {}", p.regularization);
        let deconvolver = Deconvolver::with_kernel(aif.standardized.clone(), p.regularization);
        let hemo = deconvolve_volume(delta.view(), mask, time.view(), &deconvolver, abort)?;
        let mtt = mean_transit_time(leakage.rcbv_corrected.view(), hemo.rcbf.view());

        let mut maps = ParametricMaps {
            rcbv_uncorrected: leakage.rcbv_uncorrected,
            rcbv_corrected: leakage.rcbv_corrected,
            k1: leakage.k1,
            k2: leakage.k2,
            rcbf: hemo.rcbf,
            mtt,
            ttp: hemo.ttp,
            tt0: hemo.tt0,
        };
        let mut series = RelaxivitySeries {
            r2star,
            delta_r2star: delta,
        };
        if p.apply_mask {
            info!("掩膜外体素置为 {}", p.sentinel);
            maps.fill_outside(mask, p.sentinel);
            series.fill_outside(mask, p.sentinel);
        }
        info!("灌注计算完成");

        Ok(PerfusionOutput {
            maps,
            aif,
            candidate,
            series,
        })
    }
}
