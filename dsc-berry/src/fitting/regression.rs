//! 普通最小二乘直线拟合.

use crate::relaxivity::finite_or_zero;
use ndarray::ArrayView1;

/// 直线拟合结果 `y ~ slope * x + intercept`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct LinearFit {
    slope: f64,
    intercept: f64,
    degenerate: bool,
}

impl LinearFit {
    /// 拟合 `x`, `y`. 两者长度必须一致且非空, 否则程序 panic.
    ///
    /// 若 `x` 的方差为零, 斜率无法确定: 此时斜率取 0, 截距取 `y` 的均值,
    /// 并标记为退化. 结果中的非有限值置零.
    pub fn new(x: ArrayView1<f64>, y: ArrayView1<f64>) -> Self {
        assert_eq!(x.len(), y.len(), "x 值和 y 值必须一一对应");
        assert!(!x.is_empty(), "至少需要一个点");

        let n = x.len() as f64;
        let mean_x = x.sum() / n;
        let mean_y = y.sum() / n;

        let (mut ssxm, mut ssxym) = (0.0, 0.0);
        for (&xi, &yi) in x.iter().zip(y.iter()) {
            let dx = xi - mean_x;
            ssxm += dx * dx;
            ssxym += dx * (yi - mean_y);
        }

        // `!(a > 0)` 同时覆盖 NaN.
        if !(ssxm > 0.0) {
            return Self {
                slope: 0.0,
                intercept: finite_or_zero(mean_y),
                degenerate: true,
            };
        }

        let slope = ssxym / ssxm;
        Self {
            slope: finite_or_zero(slope),
            intercept: finite_or_zero(mean_y - slope * mean_x),
            degenerate: false,
        }
    }

    /// 斜率.
    #[inline]
    pub fn slope(&self) -> f64 {
        self.slope
    }

    /// 截距.
    #[inline]
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// 自变量方差为零时, 拟合结果可以表示但没有意义.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// 求直线在 `x` 处的值.
    #[inline]
    pub fn eval(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

#[cfg(test)]
mod tests {
    use super::LinearFit;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    #[test]
    fn test_exact_line() {
        let x = Array1::linspace(0.0, 9.0, 10);
        let y = x.mapv(|v| 2.5 * v - 1.0);
        let fit = LinearFit::new(x.view(), y.view());
        assert!(!fit.is_degenerate());
        assert_abs_diff_eq!(fit.slope(), 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.intercept(), -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.eval(4.0), 9.0, epsilon = 1e-12);
    }

    #[test]
    fn test_noisy_line() {
        let x = array![0.0, 1.0, 2.0, 3.0];
        let y = array![0.1, 0.9, 2.1, 2.9];
        let fit = LinearFit::new(x.view(), y.view());
        assert_abs_diff_eq!(fit.slope(), 0.96, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.intercept(), 0.06, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate() {
        let x = Array1::<f64>::zeros(5);
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let fit = LinearFit::new(x.view(), y.view());
        assert!(fit.is_degenerate());
        assert_eq!(fit.slope(), 0.0);
        assert_abs_diff_eq!(fit.intercept(), 3.0);
    }
}
