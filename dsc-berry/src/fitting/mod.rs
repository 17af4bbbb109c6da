//! 曲线拟合与数值积分.
//!
//! 给定一系列点 `(x, y)`, 该模块可以拟合出多项式或直线, 并计算积分.

use ndarray::ArrayView1;

mod integrate;
mod polynomial;
mod regression;

pub use integrate::{cumulative_trapezoid, simpson, trapezoid};
pub use polynomial::Polynomial;
pub use regression::LinearFit;

/// 基于最小二乘法拟合 n 次多项式.
///
/// `x` 是自变量数组, `y` 是对应函数值, `degree` 是多项式次数.
/// 点数必须多于 `degree`, 否则程序 panic. 若法方程奇异, 则返回 `None`.
pub fn polyfit<'a>(
    x: ArrayView1<'a, f64>,
    y: ArrayView1<'a, f64>,
    degree: usize,
) -> Option<Polynomial> {
    polynomial::PolyImp::new(x, y, degree).fit()
}

/// 普通最小二乘直线拟合 `y ~ slope * x + intercept`.
///
/// 若 `x` 的方差为零, 返回的拟合会被标记为退化 (见 [`LinearFit::is_degenerate`]).
#[inline]
pub fn linregress(x: ArrayView1<f64>, y: ArrayView1<f64>) -> LinearFit {
    LinearFit::new(x, y)
}
