//! 候选曲线的 PCA 降维与质心最近点.

use itertools::Itertools;
use nalgebra::DMatrix;

/// 将每行一条曲线的 `data` 投影到前 `components` 个主成分上.
///
/// 返回 `(n, k)` 的嵌入矩阵, 其中 `k = min(components, n, t)`.
/// 主成分按奇异值从大到小排列.
pub(crate) fn pca_embedding(data: &DMatrix<f64>, components: usize) -> DMatrix<f64> {
    let (n, t) = data.shape();
    let k = components.min(n).min(t);

    let mut centered = data.clone();
    for mut col in centered.column_iter_mut() {
        let mean = col.mean();
        col.add_scalar_mut(-mean);
    }

    let svd = centered.clone().svd(false, true);
    // 请求了 `v_t`, 此处一定存在.
    let Some(v_t) = svd.v_t else {
        unreachable!()
    };
    let order: Vec<usize> = (0..svd.singular_values.len())
        .sorted_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]))
        .take(k)
        .collect();

    // (n, t) * (t, k)
    let basis = DMatrix::from_fn(t, k, |row, c| v_t[(order[c], row)]);
    centered * basis
}

/// 求单簇质心 (所有嵌入点的均值), 返回离质心欧氏距离最近的点的行号.
///
/// 距离相同时取行号最小者. `embedding` 为空时返回 `None`.
pub(crate) fn nearest_to_centroid(embedding: &DMatrix<f64>) -> Option<usize> {
    if embedding.nrows() == 0 {
        return None;
    }
    let centroid = embedding.row_mean();
    embedding
        .row_iter()
        .map(|row| (row - &centroid).norm_squared())
        .position_min_by(|a, b| a.total_cmp(b))
}
