//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::data::{
    save_aif_npz, save_map, save_series, BrainMask, DataError, DscData, DscScan, NiftiHeaderAttr,
};

pub use crate::aif::{detect_aif, AifCandidate, AifCurves};
pub use crate::deconv::Deconvolver;
pub use crate::pipeline::{
    ParametricMaps, Perfusion, PerfusionOutput, PerfusionParams, RelaxivitySeries,
};
pub use crate::relaxivity::{delta_r2star, r2star, BaselineWindow};
pub use crate::{PerfResult, PerfusionError};
