//! 采样点上的数值积分.

use ndarray::{Array1, ArrayView1};

#[inline]
fn assert_same_len(y: &ArrayView1<f64>, x: &ArrayView1<f64>) {
    assert_eq!(y.len(), x.len(), "x 值和 y 值必须一一对应");
}

/// 累积梯形积分, 首项为 0, 返回值与输入等长.
pub fn cumulative_trapezoid(y: ArrayView1<f64>, x: ArrayView1<f64>) -> Array1<f64> {
    assert_same_len(&y, &x);
    let mut ans = Array1::zeros(y.len());
    for i in 1..y.len() {
        ans[i] = ans[i - 1] + (x[i] - x[i - 1]) * (y[i] + y[i - 1]) / 2.0;
    }
    ans
}

/// 梯形积分. 少于两个点时为 0.
pub fn trapezoid(y: ArrayView1<f64>, x: ArrayView1<f64>) -> f64 {
    assert_same_len(&y, &x);
    (1..y.len())
        .map(|i| (x[i] - x[i - 1]) * (y[i] + y[i - 1]) / 2.0)
        .sum()
}

/// 复合 Simpson 积分, 允许非等距采样.
///
/// 点数为偶数时 (区间数为奇数), 前 `n - 1` 个点使用复合 Simpson 公式,
/// 最后一个区间使用过末三点的二次插值积分. 少于三个点时退化为梯形积分.
pub fn simpson(y: ArrayView1<f64>, x: ArrayView1<f64>) -> f64 {
    assert_same_len(&y, &x);
    let n = y.len();
    if n < 3 {
        return trapezoid(y, x);
    }
    if n % 2 == 1 {
        return basic_simpson(y, x, n);
    }

    let h0 = x[n - 2] - x[n - 3];
    let h1 = x[n - 1] - x[n - 2];
    let alpha = (2.0 * h1 * h1 + 3.0 * h0 * h1) / (6.0 * (h0 + h1));
    let beta = (h1 * h1 + 3.0 * h0 * h1) / (6.0 * h0);
    let eta = h1 * h1 * h1 / (6.0 * h0 * (h0 + h1));

    basic_simpson(y, x, n - 1) + alpha * y[n - 1] + beta * y[n - 2] - eta * y[n - 3]
}

/// 对前 `len` 个点 (`len` 为奇数) 使用复合 Simpson 公式.
fn basic_simpson(y: ArrayView1<f64>, x: ArrayView1<f64>, len: usize) -> f64 {
    debug_assert!(len % 2 == 1 && len >= 3);
    (0..len - 2)
        .step_by(2)
        .map(|i| {
            let h0 = x[i + 1] - x[i];
            let h1 = x[i + 2] - x[i + 1];
            let hsum = h0 + h1;
            hsum / 6.0
                * (y[i] * (2.0 - h1 / h0)
                    + y[i + 1] * (hsum * hsum / (h0 * h1))
                    + y[i + 2] * (2.0 - h0 / h1))
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_cumulative_trapezoid() {
        let x = array![0.0, 1.0, 2.0, 4.0];
        let y = array![1.0, 3.0, 5.0, 5.0];
        let c = cumulative_trapezoid(y.view(), x.view());
        assert_eq!(c, array![0.0, 2.0, 6.0, 16.0]);
        assert_abs_diff_eq!(trapezoid(y.view(), x.view()), 16.0);
    }

    #[test]
    fn test_simpson_odd_exact_for_cubic() {
        let x = Array1::linspace(0.0, 4.0, 9);
        let y = x.mapv(|v| v * v * v - v);
        // ∫_0^4 (x^3 - x) dx = 64 - 8
        assert_abs_diff_eq!(simpson(y.view(), x.view()), 56.0, epsilon = 1e-10);
    }

    #[test]
    fn test_simpson_even_exact_for_quadratic() {
        let x = Array1::linspace(0.0, 5.0, 6);
        let y = x.mapv(|v| v * v);
        assert_abs_diff_eq!(simpson(y.view(), x.view()), 125.0 / 3.0, epsilon = 1e-10);

        // 非等距采样.
        let x = array![0.0, 0.5, 1.5, 2.0, 3.5, 4.0];
        let y = x.mapv(|v| 3.0 * v * v + 1.0);
        assert_abs_diff_eq!(simpson(y.view(), x.view()), 64.0 + 4.0, epsilon = 1e-10);
    }

    #[test]
    fn test_simpson_small() {
        let x = array![0.0, 2.0];
        let y = array![1.0, 3.0];
        assert_abs_diff_eq!(simpson(y.view(), x.view()), 4.0);
        let empty = Array1::<f64>::zeros(0);
        assert_eq!(simpson(empty.view(), empty.view()), 0.0);
    }

    #[test]
    fn test_simpson_zero_curve() {
        let x = Array1::linspace(0.0, 28.5, 20);
        let y = Array1::<f64>::zeros(20);
        assert_eq!(simpson(y.view(), x.view()), 0.0);
    }
}
