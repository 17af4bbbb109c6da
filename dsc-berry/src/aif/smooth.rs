//! AIF 曲线的平滑与首尾稳定化.

use crate::fitting::polyfit;
use ndarray::{s, Array1, ArrayView1};

/// Savitzky-Golay 中心点卷积权重.
///
/// 对窗口内偏移 `-half..=half` 拟合 `order` 次多项式并在 0 处求值, 该操作对 `y` 线性,
/// 因此权重即为对单位向量拟合后的求值结果.
pub fn savgol_coeffs(window: usize, order: usize) -> Array1<f64> {
    assert!(window % 2 == 1, "窗口长度必须为奇数");
    assert!(order < window, "多项式次数必须小于窗口长度");
    let half = (window / 2) as f64;
    let x = Array1::from_shape_fn(window, |i| i as f64 - half);
    Array1::from_shape_fn(window, |j| {
        let mut unit = Array1::zeros(window);
        unit[j] = 1.0;
        polyfit(x.view(), unit.view(), order).map_or(0.0, |p| p.eval(0.0))
    })
}

/// Savitzky-Golay 局部多项式平滑.
///
/// 内部点使用中心窗口的卷积权重; 两端 `window / 2` 个点对首 (尾) 整个窗口拟合多项式,
/// 再在对应位置求值.
///
/// `window` 必须为奇数, `order < window`, 且曲线长度不小于 `window`, 否则程序 panic.
pub fn savgol_filter(sig: ArrayView1<f64>, window: usize, order: usize) -> Array1<f64> {
    let weights = savgol_coeffs(window, order);
    let n = sig.len();
    assert!(n >= window, "曲线长度不能小于窗口长度");
    let half = window / 2;

    let mut ans = sig.to_owned();
    for i in half..n - half {
        ans[i] = weights.dot(&sig.slice(s![i - half..=i + half]));
    }

    let x = Array1::from_shape_fn(window, |i| i as f64);
    if let Some(p) = polyfit(x.view(), sig.slice(s![..window]), order) {
        for i in 0..half {
            ans[i] = p.eval(i as f64);
        }
    }
    let tail = n - window;
    if let Some(p) = polyfit(x.view(), sig.slice(s![tail..]), order) {
        for i in (n - half)..n {
            ans[i] = p.eval((i - tail) as f64);
        }
    }
    ans
}

/// 首尾平坦化.
///
/// 前 `edge` 个点替换为 `sig[edge..edge + span]` 的均值, 随后后 `edge`
/// 个点替换为 `sig[n - edge - span..n - edge]` 的均值.
/// 两步顺序执行, 曲线很短时后一步会看到前一步的结果.
///
/// 需要 `span > 0` 且 `edge + span <= n`, 否则程序 panic.
pub fn flatten_edges(mut sig: Array1<f64>, edge: usize, span: usize) -> Array1<f64> {
    let n = sig.len();
    assert!(span > 0, "均值窗口不能为空");
    assert!(edge + span <= n, "曲线过短, 无法平坦化首尾");

    let head = sig.slice(s![edge..edge + span]).sum() / span as f64;
    sig.slice_mut(s![..edge]).fill(head);

    let tail = sig.slice(s![n - edge - span..n - edge]).sum() / span as f64;
    sig.slice_mut(s![n - edge..]).fill(tail);
    sig
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_savgol_coeffs_7_2() {
        let w = savgol_coeffs(7, 2);
        let expect = [-2.0, 3.0, 6.0, 7.0, 6.0, 3.0, -2.0];
        for (got, e) in w.iter().zip(expect) {
            assert_abs_diff_eq!(*got, e / 21.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_savgol_preserves_quadratic() {
        let sig = Array1::from_shape_fn(20, |i| {
            let t = i as f64;
            0.3 * t * t - 2.0 * t + 11.0
        });
        let smoothed = savgol_filter(sig.view(), 7, 2);
        for (a, b) in smoothed.iter().zip(sig.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_savgol_reduces_noise() {
        let sig = Array1::from_shape_fn(30, |i| 100.0 + if i % 2 == 0 { 5.0 } else { -5.0 });
        let smoothed = savgol_filter(sig.view(), 7, 2);
        let dev = |a: &Array1<f64>| a.iter().map(|v| (v - 100.0).abs()).sum::<f64>();
        assert!(dev(&smoothed) < dev(&sig));
    }

    #[test]
    #[should_panic]
    fn test_savgol_too_short() {
        let sig = Array1::<f64>::zeros(5);
        let _ = savgol_filter(sig.view(), 7, 2);
    }

    #[test]
    fn test_flatten_edges() {
        let sig = Array1::from_shape_fn(20, |i| i as f64);
        let flat = flatten_edges(sig, 5, 3);
        for i in 0..5 {
            assert_abs_diff_eq!(flat[i], 6.0); // mean(5, 6, 7)
        }
        for i in 15..20 {
            assert_abs_diff_eq!(flat[i], 13.0); // mean(12, 13, 14)
        }
        for i in 5..15 {
            assert_abs_diff_eq!(flat[i], i as f64);
        }
    }

    #[test]
    fn test_flatten_edges_overlapping() {
        // n = 9: 尾部窗口 [1, 4) 与已平坦化的头部重叠.
        let sig = Array1::from_shape_fn(9, |i| i as f64);
        let flat = flatten_edges(sig, 5, 3);
        let head = 6.0;
        let tail = (head + head + head) / 3.0;
        assert_abs_diff_eq!(flat[0], head);
        assert_abs_diff_eq!(flat[8], tail);
    }
}
