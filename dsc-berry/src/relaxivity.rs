//! 信号强度到弛豫率的转换.
//!
//! - ΔR2*(t) = -(1/TE) · ln(S(t) / S0)
//! - R2*(t) = (1/TE) · ln(S0 / S(t)), 负值置零.
//!
//! 其中 S0 为基线窗口内的信号均值. 取对数之前信号与基线都会截断到
//! [`SIGNAL_EPS`] 以上, 结果中的非有限值一律置零.

use crate::consts::{BASELINE_END, BASELINE_START, SIGNAL_EPS};
use ndarray::{s, Array1, Array4, ArrayView1, ArrayView4, ArrayViewMut1, Axis, Zip};

/// 基线窗口, 左闭右开的帧索引区间.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BaselineWindow {
    start: usize,
    end: usize,
}

impl BaselineWindow {
    /// 构建基线窗口 `[start, end)`.
    ///
    /// 窗口为空时返回 `None`.
    pub fn new(start: usize, end: usize) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// 默认基线窗口, 即第 5 到第 9 帧.
    #[inline]
    pub const fn standard() -> Self {
        Self {
            start: BASELINE_START,
            end: BASELINE_END,
        }
    }

    /// 窗口起点 (包含).
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// 窗口终点 (不包含).
    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    /// 窗口帧数.
    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// 窗口是否为空. 由 [`BaselineWindow::new`] 构建的窗口永远非空, 反序列化得到的则未必.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 长度为 `frames` 的曲线能否容纳该窗口.
    #[inline]
    pub fn fits(&self, frames: usize) -> bool {
        self.end <= frames
    }

    /// 曲线在窗口内的均值.
    ///
    /// 窗口越界时 panic.
    #[inline]
    pub fn mean(&self, curve: ArrayView1<f64>) -> f64 {
        curve.slice(s![self.start..self.end]).sum() / self.len() as f64
    }
}

impl Default for BaselineWindow {
    #[inline]
    fn default() -> Self {
        Self::standard()
    }
}

/// 非有限值 (inf, NaN) 置零.
#[inline]
pub fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// 截断到 [`SIGNAL_EPS`] 以上. NaN 保持不变, 交由后续的非有限值检查处理.
#[inline]
fn clip_signal(v: f64) -> f64 {
    if v < SIGNAL_EPS {
        SIGNAL_EPS
    } else {
        v
    }
}

fn delta_r2star_into(
    curve: ArrayView1<f64>,
    mut out: ArrayViewMut1<f64>,
    te: f64,
    window: BaselineWindow,
) {
    let s0 = clip_signal(window.mean(curve));
    Zip::from(&mut out).and(&curve).for_each(|o, &s| {
        *o = finite_or_zero(-(clip_signal(s) / s0).ln() / te);
    });
}

fn r2star_into(
    curve: ArrayView1<f64>,
    mut out: ArrayViewMut1<f64>,
    te: f64,
    window: BaselineWindow,
) {
    let s0 = clip_signal(window.mean(curve));
    Zip::from(&mut out).and(&curve).for_each(|o, &s| {
        let v = (s0 / clip_signal(s)).ln() / te;
        *o = if v < 0.0 { 0.0 } else { finite_or_zero(v) };
    });
}

/// 计算单条信号曲线的 ΔR2*(t). `te` 为回波时间 (秒).
///
/// 当 `window` 超出曲线长度时 panic.
pub fn delta_r2star(curve: ArrayView1<f64>, te: f64, window: BaselineWindow) -> Array1<f64> {
    let mut out = Array1::zeros(curve.len());
    delta_r2star_into(curve, out.view_mut(), te, window);
    out
}

/// 计算单条信号曲线的 R2*(t). 信号高于基线的时间点置零, 因此结果非负.
///
/// 当 `window` 超出曲线长度时 panic.
pub fn r2star(curve: ArrayView1<f64>, te: f64, window: BaselineWindow) -> Array1<f64> {
    let mut out = Array1::zeros(curve.len());
    r2star_into(curve, out.view_mut(), te, window);
    out
}

/// 沿时间轴对整个 4D 信号计算 ΔR2*(t).
pub fn delta_r2star_volume(
    signal: ArrayView4<f64>,
    te: f64,
    window: BaselineWindow,
) -> Array4<f64> {
    let mut out = Array4::zeros(signal.raw_dim());
    let zip = Zip::from(out.lanes_mut(Axis(3))).and(signal.lanes(Axis(3)));
    zip_for_each!(zip, |o, s| delta_r2star_into(s, o, te, window));
    out
}

/// 沿时间轴对整个 4D 信号计算 R2*(t).
pub fn r2star_volume(signal: ArrayView4<f64>, te: f64, window: BaselineWindow) -> Array4<f64> {
    let mut out = Array4::zeros(signal.raw_dim());
    let zip = Zip::from(out.lanes_mut(Axis(3))).and(signal.lanes(Axis(3)));
    zip_for_each!(zip, |o, s| r2star_into(s, o, te, window));
    out
}
