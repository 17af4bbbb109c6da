#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 从 DSC (dynamic susceptibility contrast) MR 4D 时间序列出发,
//! 计算脑灌注参数图.
//!
//! 该 crate 目前仅提供 `safe` 接口. 数值计算按体素独立进行,
//! 单个体素的数值异常 (如 NaN, inf) 只会影响该体素, 不会中断整个计算.
//!
//! # 注意
//!
//! 1. 4D 数据按照 `(x, y, z, t)` 组织, 与 nifti 文件的自然维度顺序一致.
//! 2. 结构性错误 (掩膜形状不一致、找不到 AIF 候选体素等) 会返回 `Err`,
//!   而不会 panic.
//! 3. 数值核心不处理任何文件格式, 文件读写位于 `data` 模块.
//!
//! # 开发计划
//!
//! ### 信号强度到弛豫率的转换 ✅
//!
//! ΔR2* 与 R2* (非负) 两种形式, 均支持单条曲线和整个 4D 体数据.
//!
//! 实现位于 `dsc-berry/src/relaxivity.rs`.
//!
//! ### 动脉输入函数 (AIF) 自动检测 ✅
//!
//! 信号下降幅度筛选 -> 取前 N 个候选 -> PCA 降维 -> 取最接近质心的体素.
//! 单簇 k-means 与 "质心 + 最近点" 等价, 因此直接使用后者.
//!
//! 之后进行 Savitzky-Golay 平滑与首尾平坦化.
//!
//! 实现位于 `dsc-berry/src/aif`.
//!
//! ### 最小二乘多项式拟合、线性回归、数值积分的纯 Rust 实现 ✅
//!
//! 实现位于 `dsc-berry/src/fitting`.
//!
//! ### BSW 渗漏校正 ✅
//!
//! 逐体素对 AIF 累积积分做线性回归, 得到 K1, K2 与校正前后的 rCBV.
//!
//! 实现位于 `dsc-berry/src/leakage.rs`.
//!
//! ### 基于 SVD 的正则化反卷积 ✅
//!
//! 由标准化 AIF 构造下三角 Toeplitz 卷积矩阵, 计算正则化伪逆,
//! 逐体素求残差函数, 得到 rCBF, MTT, TTP, TT0.
//!
//! 实现位于 `dsc-berry/src/deconv.rs`.
//!
//! ### 空间/时间高斯平滑 ✅
//!
//! 实现位于 `dsc-berry/src/filter.rs`.
//!
//! ### 流程编排与掩膜 ✅
//!
//! 实现位于 `dsc-berry/src/pipeline.rs`. 支持在体素批次之间取消计算.
//!
//! ### nifti 读写, AIF 曲线 npz 导出 ✅
//!
//! 实现位于 `dsc-berry/src/data`.
//!
//! ### 完善代码文档 ✅
//!
//! 给每个 public API 提供文档, 并视情况给 private
//! API 提供文档.

/// 三维索引 `(x, y, z)`.
pub type Idx3d = (usize, usize, usize);

/// 对 `ndarray::Zip` 逐元素执行闭包. 打开 `rayon` feature 时并行执行.
macro_rules! zip_for_each {
    ($zip: expr, $op: expr) => {{
        #[cfg(feature = "rayon")]
        $zip.par_for_each($op);
        #[cfg(not(feature = "rayon"))]
        $zip.for_each($op);
    }};
}

pub mod consts;

mod error;

pub use error::{PerfResult, PerfusionError};
pub(crate) use error::check_abort;

pub mod relaxivity;

pub mod fitting;

pub mod filter;

pub mod aif;

pub mod leakage;

pub mod deconv;

pub mod pipeline;

pub mod data;

pub mod prelude;

pub use aif::{AifCandidate, AifCurves};
pub use data::{BrainMask, DataError, DscData, DscScan, NiftiHeaderAttr};
pub use deconv::Deconvolver;
pub use pipeline::{ParametricMaps, Perfusion, PerfusionOutput, PerfusionParams, RelaxivitySeries};
pub use relaxivity::BaselineWindow;
