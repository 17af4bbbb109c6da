//! 通用常量.

/// 取对数之前, 信号强度与基线的下限截断值.
pub const SIGNAL_EPS: f64 = 1e-3;

/// 默认基线窗口起点 (包含).
pub const BASELINE_START: usize = 5;

/// 默认基线窗口终点 (不包含).
pub const BASELINE_END: usize = 10;

/// 高斯核截断半径 (以 sigma 为单位).
pub const GAUSSIAN_TRUNCATE: f64 = 4.0;

/// 默认回波时间 (秒).
pub const DEFAULT_TE: f64 = 0.03;

/// 默认重复时间, 即采样间隔 (秒).
pub const DEFAULT_TR: f64 = 1.5;

/// AIF 检测相关常量.
pub mod aif {
    /// 计算信号下降幅度时, 基线所取的前若干帧.
    pub const DROP_BASELINE_LEN: usize = 5;

    /// 信号下降幅度阈值 (信号单位). 只有严格大于该值的体素才是候选.
    pub const DROP_THRESHOLD: f64 = 100.0;

    /// 默认候选体素个数.
    pub const NUM_CANDIDATES: usize = 200;

    /// PCA 降维后的维数.
    pub const PCA_COMPONENTS: usize = 2;

    /// Savitzky-Golay 窗口长度.
    pub const SAVGOL_WINDOW: usize = 7;

    /// Savitzky-Golay 多项式次数.
    pub const SAVGOL_ORDER: usize = 2;

    /// 首尾平坦化的帧数.
    pub const FLAT_EDGE_LEN: usize = 5;

    /// 首尾平坦化时, 取均值的相邻帧数.
    pub const FLAT_EDGE_SPAN: usize = 3;
}

/// 反卷积相关常量.
pub mod deconv {
    /// 标准化 AIF 时加在标准差上的小量.
    pub const STD_EPS: f64 = 1e-8;

    /// 默认奇异值正则化常数.
    pub const REGULARIZATION: f64 = 1e-3;

    /// rCBF 大于该值时才计算 MTT.
    pub const RCBF_THRESHOLD: f64 = 1e-6;

    /// TT0 取峰值的比例.
    pub const ONSET_FRACTION: f64 = 0.1;

    /// 组织曲线基线平移时所取的前若干帧.
    pub const BASELINE_LEN: usize = 5;
}
