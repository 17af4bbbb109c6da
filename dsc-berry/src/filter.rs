//! 4D 信号的高斯平滑.
//!
//! 可分离的一维高斯卷积, 边界按半采样对称方式反射 (`d c b a | a b c d | d c b a`),
//! 高斯核在 [`GAUSSIAN_TRUNCATE`] 倍 sigma 处截断.

use crate::consts::GAUSSIAN_TRUNCATE;
use ndarray::{Array1, ArrayView1, ArrayViewMut1, ArrayViewMut4, Axis, Zip};

/// 生成归一化的一维高斯核, 长度为 `2 * radius + 1`,
/// 其中 `radius = round(truncate * sigma)`.
///
/// `sigma` 必须为正, 否则程序 panic.
pub fn gaussian_kernel1d(sigma: f64, truncate: f64) -> Array1<f64> {
    assert!(sigma > 0.0, "sigma 必须为正");
    let radius = (truncate * sigma + 0.5) as usize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel = Array1::from_shape_fn(2 * radius + 1, |i| {
        let x = i as f64 - radius as f64;
        (-x * x / denom).exp()
    });
    let total = kernel.sum();
    kernel /= total;
    kernel
}

/// 反射边界下, 将可能越界的索引 `i` 映射回 `[0, n)`.
#[inline]
fn reflect_index(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period) as usize;
    if m < n {
        m
    } else {
        2 * n - 1 - m
    }
}

/// 以反射边界对 `src` 做一维卷积, 结果写入 `dst`.
fn convolve_reflect(src: ArrayView1<f64>, kernel: ArrayView1<f64>, mut dst: ArrayViewMut1<f64>) {
    let n = src.len();
    let radius = (kernel.len() / 2) as isize;
    for (i, out) in dst.iter_mut().enumerate() {
        *out = kernel
            .iter()
            .enumerate()
            .map(|(j, &k)| k * src[reflect_index(i as isize + j as isize - radius, n)])
            .sum();
    }
}

/// 沿 `axis` 对 4D 数据做一维高斯平滑. `sigma <= 0` 时不做任何事.
pub fn gaussian_filter1d(mut data: ArrayViewMut4<f64>, axis: Axis, sigma: f64) {
    if sigma <= 0.0 || data.len_of(axis) == 0 {
        return;
    }
    let kernel = gaussian_kernel1d(sigma, GAUSSIAN_TRUNCATE);
    let zip = Zip::from(data.lanes_mut(axis));
    zip_for_each!(zip, |mut lane: ArrayViewMut1<f64>| {
        let src = lane.to_owned();
        convolve_reflect(src.view(), kernel.view(), lane.view_mut());
    });
}

/// 对 4D 数据的三个空间轴 (x, y, z) 做各向同性高斯平滑, 时间轴不变.
pub fn gaussian_filter_spatial(mut data: ArrayViewMut4<f64>, sigma: f64) {
    for axis in 0..3 {
        gaussian_filter1d(data.view_mut(), Axis(axis), sigma);
    }
}

/// 沿时间轴做一维高斯平滑.
#[inline]
pub fn gaussian_filter_temporal(data: ArrayViewMut4<f64>, sigma: f64) {
    gaussian_filter1d(data, Axis(3), sigma);
}
