//! 多项式曲线.

// ref: https://blog.csdn.net/u012494154/article/details/112519550

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1};

/// 多项式, 系数按升幂存储: `c[0] + c[1] x + c[2] x^2 + ...`.
#[derive(Clone, Debug, PartialEq)]
pub struct Polynomial(Array1<f64>);

impl Polynomial {
    /// 由升幂系数构建多项式.
    #[inline]
    pub fn new(coefficients: Array1<f64>) -> Self {
        Self(coefficients)
    }

    /// 升幂系数.
    #[inline]
    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.0.view()
    }

    /// 多项式次数.
    #[inline]
    pub fn degree(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// 求 `x` 处的函数值 (Horner).
    pub fn eval(&self, x: f64) -> f64 {
        self.0.iter().rev().fold(0.0, |acc, &cur| acc * x + cur)
    }
}

pub(crate) struct PolyImp<'a> {
    x: ArrayView1<'a, f64>,
    y: ArrayView1<'a, f64>,
    degree: usize,
}

impl<'a> PolyImp<'a> {
    pub fn new(x: ArrayView1<'a, f64>, y: ArrayView1<'a, f64>, degree: usize) -> Self {
        assert_eq!(x.len(), y.len(), "x 值和 y 值必须一一对应");
        assert!(x.len() > degree, "拟合点数必须多于多项式次数");
        Self { x, y, degree }
    }

    /// theta = (V^T V)^-1 V^T y.
    pub fn fit(&self) -> Option<Polynomial> {
        let v_mat = self.vandermonde();
        let y = DVector::from_iterator(self.y.len(), self.y.iter().copied());
        let normal = v_mat.tr_mul(&v_mat);
        let theta = normal.cholesky()?.solve(&v_mat.tr_mul(&y));

        debug_assert_eq!(theta.len(), self.degree + 1);
        Some(Polynomial(Array1::from_iter(theta.iter().copied())))
    }

    fn vandermonde(&self) -> DMatrix<f64> {
        // shape: (m, n); m = x.len(), n = self.degree + 1
        DMatrix::from_fn(self.x.len(), self.degree + 1, |m, n| self.x[m].powi(n as i32))
    }
}
