//! 运行时错误.

use crate::Idx3d;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// 灌注计算的结构性错误. 出现时整个计算中止.
///
/// 单个体素上的数值问题 (除零、对非正数取对数、病态伪逆等) 不属于这里,
/// 它们在体素内部被置零.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PerfusionError {
    /// 掩膜形状与 4D 信号的空间形状不一致.
    #[error("掩膜形状 {mask:?} 与信号空间形状 {signal:?} 不一致")]
    ShapeMismatch {
        /// 掩膜形状.
        mask: Idx3d,

        /// 信号前三维形状.
        signal: Idx3d,
    },

    /// 掩膜内没有任何体素的信号下降幅度超过阈值, 无法确定 AIF.
    #[error("掩膜内没有信号下降幅度超过 {threshold} 的体素, 无法检测 AIF")]
    NoAifCandidates {
        /// 使用的下降幅度阈值.
        threshold: f64,
    },

    /// 时间帧数不足以计算基线或平滑.
    ///
    /// 第一个字段是实际帧数, 第二个字段是最少需要的帧数.
    #[error("时间轴只有 {frames} 帧, 至少需要 {required} 帧")]
    TooFewFrames {
        /// 实际帧数.
        frames: usize,

        /// 最少帧数.
        required: usize,
    },

    /// 参数不合法.
    #[error("参数不合法: {0}")]
    InvalidParam(&'static str),

    /// 计算在体素批次之间被取消.
    #[error("计算已取消")]
    Cancelled,
}

/// 灌注计算运行时结果.
pub type PerfResult<T> = Result<T, PerfusionError>;

/// 检查取消标志. 标志被置位时返回 [`PerfusionError::Cancelled`].
#[inline]
pub(crate) fn check_abort(abort: Option<&AtomicBool>) -> PerfResult<()> {
    match abort {
        Some(flag) if flag.load(Ordering::Relaxed) => Err(PerfusionError::Cancelled),
        _ => Ok(()),
    }
}
