//! 运行结果摘要.

use dsc_berry::prelude::*;
use ndarray::{Array3, ArrayView3, Zip};
use std::io::{self, Write};
use std::time::Duration;

/// 单张参数图在掩膜内的统计量. 只统计有限值.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapStats {
    count: usize,
    min: f64,
    max: f64,
    sum: f64,
}

impl MapStats {
    /// 统计 `map` 中位于 `mask` 内的有限值.
    pub fn new(map: &Array3<f64>, mask: ArrayView3<bool>) -> Self {
        let mut ans = Self {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
        };
        Zip::from(map).and(&mask).for_each(|&v, &inside| {
            if inside && v.is_finite() {
                ans.count += 1;
                ans.min = ans.min.min(v);
                ans.max = ans.max.max(v);
                ans.sum += v;
            }
        });
        ans
    }

    /// 均值. 没有有限值时为 `None`.
    #[inline]
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// 最小值.
    #[inline]
    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    /// 最大值.
    #[inline]
    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

/// 将 `stats` 写进 `w` 中.
fn describe_into<W: Write>(name: &str, s: &MapStats, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    #[inline]
    fn f64_to_display(f: Option<f64>) -> String {
        match f {
            Some(f) => format!("{f:.6}"),
            None => "/".to_string(),
        }
    }

    writeln!(w, "Map `{name}`:")?;
    writeln!(w, "{S4}Finite voxels: {}", s.count)?;
    writeln!(w, "{S4}Mean: {}", f64_to_display(s.mean()))?;
    write!(
        w,
        "{S4}Range: [{}, {}]",
        f64_to_display(s.min()),
        f64_to_display(s.max())
    )?;
    Ok(())
}

/// 一次运行的最终结果.
pub struct RunReport {
    aif_index: Idx3d,
    aif_drop: f64,
    candidates: usize,
    elapsed: Duration,
    data: Vec<(&'static str, MapStats)>,
}

impl RunReport {
    /// 汇总计算输出.
    pub fn new(out: &PerfusionOutput, elapsed: Duration, mask: ArrayView3<bool>) -> Self {
        Self {
            aif_index: out.candidate.index,
            aif_drop: out.candidate.drop,
            candidates: out.candidate.candidates,
            elapsed,
            data: out
                .maps
                .named()
                .into_iter()
                .map(|(name, map)| (name, MapStats::new(map, mask)))
                .collect(),
        }
    }

    /// 将运行结果写进 `w` 中.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        utils::sep_to(&mut *w)?;
        writeln!(
            w,
            "AIF voxel {:?}, signal drop {:.2}, {} candidates",
            self.aif_index, self.aif_drop, self.candidates
        )?;
        writeln!(w, "Computation time: {} ms", self.elapsed.as_millis())?;
        utils::sep_to(&mut *w)?;

        for (key, stats) in self.data.iter() {
            describe_into(key, stats, w)?;
            writeln!(w)?;
            utils::sep_to(&mut *w)?;
        }
        Ok(())
    }

    /// 输出运行结果.
    pub fn analyze(&self) {
        if let Err(e) = self.write_to(&mut io::stdout().lock()) {
            log::warn!("无法输出运行结果: {e}");
        }
    }
}
