//! nifti 格式的 DSC 扫描与脑掩膜读取, 以及参数图导出.

use std::ops::Index;
use std::path::Path;

use ndarray::{Array3, Array4, ArrayView3, ArrayView4, Ix3, Ix4};
use nifti::{IntoNdArray, NiftiError, NiftiHeader, NiftiObject, ReaderOptions};
use thiserror::Error;

use crate::Idx3d;

mod save;

pub use save::{save_aif_npz, save_map, save_series};

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 读写数据时的错误.
#[derive(Debug, Error)]
pub enum DataError {
    /// nifti 文件读写错误.
    #[error("nifti 读写错误: {0}")]
    Nifti(#[from] NiftiError),

    /// npz 文件写入错误.
    #[error("npz 写入错误: {0}")]
    Npz(#[from] ndarray_npy::WriteNpzError),

    /// 其他底层 I/O 错误.
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 数据维数不符合预期.
    #[error("期望 {expected} 维数据, 实际为 {found} 维")]
    Dimension {
        /// 期望维数.
        expected: usize,

        /// 实际维数.
        found: usize,
    },

    /// 扫描与掩膜空间形状不一致.
    #[error("扫描形状 {scan:?} 与掩膜形状 {mask:?} 不一致")]
    ShapeMismatch {
        /// 扫描前三维形状.
        scan: Idx3d,

        /// 掩膜形状.
        mask: Idx3d,
    },
}

/// nii 文件 header 的共用属性.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取空间形状 `(x, y, z)`.
    #[inline]
    fn shape(&self) -> Idx3d {
        let [_, x, y, z, ..] = self.header().dim;
        (x as usize, y as usize, z as usize)
    }

    /// 获取数据空间体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (x, y, z) = self.shape();
        x * y * z
    }

    /// 获取单个体素分辨率 `[x, y, z]`.
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, x, y, z, ..] = self.header().pixdim;
        [x as f64, y as f64, z as f64]
    }

    /// 获取体素的实际体积值.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }
}

/// 将 nifti `xyzt_units` 的时间单位换算为秒. 单位未知时按秒处理.
#[inline]
fn time_unit_in_seconds(xyzt_units: u8) -> f64 {
    match xyzt_units & 0x38 {
        0x10 => 1e-3,
        0x18 => 1e-6,
        _ => 1.0,
    }
}

/// 读取 nifti 文件, 同时返回堆上的 header 与 `f64` 数据.
fn read_volume<P: AsRef<Path>>(path: P) -> Result<(BoxedHeader, ndarray::ArrayD<f64>), DataError> {
    let obj = ReaderOptions::new().read_file(path.as_ref())?;
    let header = Box::new(obj.header().clone());
    let data = obj.into_volume().into_ndarray::<f64>()?;
    Ok((header, data))
}

/// nii 格式的 4D DSC 扫描, 按 `(x, y, z, t)` 组织, 信号强度以 `f64` 保存.
#[derive(Debug, Clone)]
pub struct DscScan {
    header: BoxedHeader,
    data: Array4<f64>,
}

impl NiftiHeaderAttr for DscScan {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<(usize, usize, usize, usize)> for DscScan {
    type Output = f64;

    #[inline]
    fn index(&self, index: (usize, usize, usize, usize)) -> &Self::Output {
        &self.data[index]
    }
}

impl DscScan {
    /// 打开 nii 文件格式的 4D DSC 扫描. `path` 为 nii 文件的本地路径.
    ///
    /// 数据不是 4 维时返回 [`DataError::Dimension`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let (header, data) = read_volume(path)?;
        let found = data.ndim();
        let data = data
            .into_dimensionality::<Ix4>()
            .map_err(|_| DataError::Dimension { expected: 4, found })?;
        Ok(Self { header, data })
    }

    /// 根据裸数据直接创建扫描, header 为默认值 (仅填写形状).
    ///
    /// `tr` 为采样间隔 (秒), 会写入 `pixdim[4]`.
    pub fn from_array(data: Array4<f64>, tr: f64) -> Self {
        let mut header = Box::<NiftiHeader>::default();
        let (x, y, z, t) = data.dim();
        header.dim = [4, x as u16, y as u16, z as u16, t as u16, 1, 1, 1];
        header.pixdim = [1.0, 1.0, 1.0, 1.0, tr as f32, 1.0, 1.0, 1.0];
        header.xyzt_units = 0x02 | 0x08;
        Self { header, data }
    }

    /// 时间帧数.
    #[inline]
    pub fn frames(&self) -> usize {
        self.data.len_of(ndarray::Axis(3))
    }

    /// 从 `pixdim[4]` 读取采样间隔, 换算为秒. 未设置或非法时返回 `None`.
    pub fn repetition_time(&self) -> Option<f64> {
        let tr = self.header.pixdim[4] as f64 * time_unit_in_seconds(self.header.xyzt_units);
        (tr.is_finite() && tr > 0.0).then_some(tr)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView4<'_, f64> {
        self.data.view()
    }
}

/// nii 格式的 3D 脑掩膜. 体素值大于 0 即视为脑内.
#[derive(Debug, Clone)]
pub struct BrainMask {
    header: BoxedHeader,
    data: Array3<bool>,
}

impl NiftiHeaderAttr for BrainMask {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for BrainMask {
    type Output = bool;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl BrainMask {
    /// 打开 nii 文件格式的 3D 掩膜.
    ///
    /// 数据不是 3 维时返回 [`DataError::Dimension`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let (header, data) = read_volume(path)?;
        let found = data.ndim();
        let data = data
            .into_dimensionality::<Ix3>()
            .map_err(|_| DataError::Dimension { expected: 3, found })?
            .mapv(|v| v > 0.0);
        Ok(Self { header, data })
    }

    /// 根据裸数据直接创建掩膜, header 为默认值 (仅填写形状).
    pub fn from_array(data: Array3<bool>) -> Self {
        let mut header = Box::<NiftiHeader>::default();
        let (x, y, z) = data.dim();
        header.dim = [3, x as u16, y as u16, z as u16, 1, 1, 1, 1];
        Self { header, data }
    }

    /// 掩膜内体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, bool> {
        self.data.view()
    }
}

/// 一组 DSC 扫描与其脑掩膜.
#[derive(Debug, Clone)]
pub struct DscData {
    /// 4D DSC 扫描.
    pub scan: DscScan,

    /// 3D 脑掩膜.
    pub mask: BrainMask,
}

impl DscData {
    /// 分别打开 nii 文件格式的 DSC 扫描和对应掩膜.
    ///
    /// 任一文件打开失败, 或两者空间形状不一致时返回 `Err`.
    pub fn open(
        scan_path: impl AsRef<Path>,
        mask_path: impl AsRef<Path>,
    ) -> Result<Self, DataError> {
        let scan = DscScan::open(scan_path.as_ref())?;
        let mask = BrainMask::open(mask_path.as_ref())?;
        Self::new(scan, mask)
    }

    /// 组合已有的扫描与掩膜, 检查空间形状.
    pub fn new(scan: DscScan, mask: BrainMask) -> Result<Self, DataError> {
        let (x, y, z, _) = scan.data.dim();
        if mask.data.dim() != (x, y, z) {
            return Err(DataError::ShapeMismatch {
                scan: (x, y, z),
                mask: mask.data.dim(),
            });
        }
        Ok(Self { scan, mask })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_unit() {
        assert_eq!(time_unit_in_seconds(0x08 | 0x02), 1.0);
        assert_eq!(time_unit_in_seconds(0x10 | 0x02), 1e-3);
        assert_eq!(time_unit_in_seconds(0x18), 1e-6);
        assert_eq!(time_unit_in_seconds(0), 1.0);
    }

    #[test]
    fn test_repetition_time() {
        let scan = DscScan::from_array(Array4::zeros((2, 3, 4, 12)), 1.5);
        assert_eq!(scan.shape(), (2, 3, 4));
        assert_eq!(scan.frames(), 12);
        assert_eq!(scan.repetition_time(), Some(1.5));

        let mut scan = DscScan::from_array(Array4::zeros((2, 3, 4, 12)), 1500.0);
        scan.header.xyzt_units = 0x02 | 0x10;
        assert!((scan.repetition_time().unwrap() - 1.5).abs() < 1e-9);

        let scan = DscScan::from_array(Array4::zeros((1, 1, 1, 12)), 0.0);
        assert_eq!(scan.repetition_time(), None);
    }

    #[test]
    fn test_header_geometry() {
        let mut scan = DscScan::from_array(Array4::zeros((2, 3, 4, 12)), 1.5);
        assert_eq!(scan.size(), 24);
        assert_eq!(scan.pix_dim(), [1.0, 1.0, 1.0]);
        assert_eq!(scan.voxel(), 1.0);

        scan.header.pixdim[1..4].copy_from_slice(&[2.0, 1.5, 3.0]);
        assert_eq!(scan.pix_dim(), [2.0, 1.5, 3.0]);
        assert!((scan.voxel() - 9.0).abs() < 1e-12);

        let mask = BrainMask::from_array(Array3::from_elem((5, 1, 2), false));
        assert_eq!(mask.shape(), (5, 1, 2));
        assert_eq!(mask.size(), 10);
    }

    #[test]
    fn test_pair_shape() {
        let scan = DscScan::from_array(Array4::zeros((2, 3, 4, 12)), 1.5);
        let mask = BrainMask::from_array(Array3::from_elem((2, 3, 4), true));
        let data = DscData::new(scan.clone(), mask).unwrap();
        assert_eq!(data.mask.count(), 24);

        let mask = BrainMask::from_array(Array3::from_elem((2, 3, 5), true));
        assert!(matches!(
            DscData::new(scan, mask),
            Err(DataError::ShapeMismatch {
                scan: (2, 3, 4),
                mask: (2, 3, 5)
            })
        ));
    }
}
