use std::ops::{Index, IndexMut};
use std::path::Path;

use ndarray::{Array3, ArrayD, ArrayView, ArrayView3, ArrayViewMut, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, NiftiType, ReaderOptions};
use num::{Bounded, NumCast};

use crate::consts::label::is_lesion;
use crate::{Idx3d, SimError, SimResult};

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

/// 将 nifti 读出的 `[w, h, z, ...]` 数组转换成 `[z, h, w]` 标准布局数组.
fn into_zhw<T: Clone>(header: &NiftiHeader, data: ArrayD<T>) -> SimResult<Array3<T>> {
    // hint: 原第一维向下增长, 原第二维向右增长.
    let reversed: Vec<usize> = (0..data.ndim()).rev().collect();
    let data = data.permuted_axes(reversed.as_slice());

    // The nature of nifti data field layout.
    let data = if data.is_standard_layout() {
        data
    } else {
        data.as_standard_layout().into_owned()
    };
    Ok(Array3::from_shape_vec(
        get_shape_from_header(header),
        data.into_raw_vec(),
    )?)
}

/// 写盘用 header: 复制几何信息, 但去掉强度缩放, 使写入的数值即为实际数值.
fn output_header(header: &NiftiHeader) -> NiftiHeader {
    let mut out = header.clone();
    out.scl_slope = 1.0;
    out.scl_inter = 0.0;
    out
}

/// 饱和地将 `v` 转换为 `T`. 整数类型会先四舍五入.
#[inline]
fn saturating_cast<T: NumCast + Bounded>(v: f32, integral: bool) -> T {
    let v = if integral { v.round() } else { v };
    num::cast(v).unwrap_or_else(|| {
        if v > 0.0 {
            T::max_value()
        } else {
            T::min_value()
        }
    })
}

/// 3D nii 文件 header 的共用属性和部分通用操作.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小.
    #[inline]
    fn shape(&self) -> Idx3d {
        get_shape_from_header(self.header())
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 顺序为 `[z, h, w]`,
    /// 与数据的轴顺序一致.
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, w, h, z, ..] = self.header().pixdim;
        [z as f64, h as f64, w as f64]
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 与 `other` 的形状是否一致?
    #[inline]
    fn same_shape<O: NiftiHeaderAttr>(&self, other: &O) -> bool {
        self.shape() == other.shape()
    }
}

/// 根据形状 `(z, h, w)` 和分辨率 `[z_mm, h_mm, w_mm]` 构建最小可用的 header.
///
/// 主要用于测试或在内存中直接合成数据.
pub fn synthetic_header((z, h, w): Idx3d, [z_mm, h_mm, w_mm]: [f32; 3]) -> NiftiHeader {
    let mut header = NiftiHeader::default();
    header.dim = [3, w as u16, h as u16, z as u16, 1, 1, 1, 1];
    header.pixdim = [1.0, w_mm, h_mm, z_mm, 0.0, 0.0, 0.0, 0.0];
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;
    header
}

/// nifti 体素的原始标量类型. 输出体数据会被转换回该类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VoxelKind {
    /// `unsigned char`.
    U8,
    /// `char`.
    I8,
    /// `unsigned short`.
    U16,
    /// `short`.
    I16,
    /// `unsigned int`.
    U32,
    /// `int`.
    I32,
    /// `unsigned long`.
    U64,
    /// `long`.
    I64,
    /// `float`.
    F32,
    /// `double`.
    F64,
}

impl VoxelKind {
    /// 从 header 解析体素类型. 非标量类型 (RGB, 复数, 128 位浮点)
    /// 返回 [`SimError::UnsupportedComponentType`].
    pub fn from_header(header: &NiftiHeader) -> SimResult<Self> {
        let kind = match header.data_type()? {
            NiftiType::Uint8 => Self::U8,
            NiftiType::Int8 => Self::I8,
            NiftiType::Uint16 => Self::U16,
            NiftiType::Int16 => Self::I16,
            NiftiType::Uint32 => Self::U32,
            NiftiType::Int32 => Self::I32,
            NiftiType::Uint64 => Self::U64,
            NiftiType::Int64 => Self::I64,
            NiftiType::Float32 => Self::F32,
            NiftiType::Float64 => Self::F64,
            other => return Err(SimError::UnsupportedComponentType(format!("{other:?}"))),
        };
        Ok(kind)
    }
}

/// 将 `[z, h, w]` 数据按 `kind` 类型写到 `path`. 文件名以 `.gz` 结尾时压缩.
fn write_as(
    path: &Path,
    header: &NiftiHeader,
    data: ArrayView3<f32>,
    kind: VoxelKind,
) -> SimResult<()> {
    let header = output_header(header);
    // [z, H, W] -> [W, H, z]
    let data = data.permuted_axes([2, 1, 0]);
    let writer = WriterOptions::new(path).reference_header(&header);

    macro_rules! write_cast {
        ($t: ty, $integral: expr) => {
            writer.write_nifti(&data.mapv(|v| saturating_cast::<$t>(v, $integral)))?
        };
    }
    match kind {
        VoxelKind::U8 => write_cast!(u8, true),
        VoxelKind::I8 => write_cast!(i8, true),
        VoxelKind::U16 => write_cast!(u16, true),
        VoxelKind::I16 => write_cast!(i16, true),
        VoxelKind::U32 => write_cast!(u32, true),
        VoxelKind::I32 => write_cast!(i32, true),
        VoxelKind::U64 => write_cast!(u64, true),
        VoxelKind::I64 => write_cast!(i64, true),
        VoxelKind::F32 => writer.write_nifti(&data)?,
        VoxelKind::F64 => write_cast!(f64, false),
    }
    Ok(())
}

/// nii 格式 3D MR 强度体数据, 包括 header 和强度值. 强度值以 `f32` 保存,
/// 原始体素类型记录在 `kind` 中.
#[derive(Debug, Clone)]
pub struct MrVolume {
    header: BoxedHeader,
    kind: VoxelKind,
    data: Array3<f32>,
}

impl NiftiHeaderAttr for MrVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for MrVolume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for MrVolume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl MrVolume {
    /// 打开 nii 文件格式的 3D 强度体数据. `path` 为 nii 文件的本地路径.
    ///
    /// 体素类型无法识别时返回 [`SimError::UnsupportedComponentType`].
    pub fn open<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());
        let kind = VoxelKind::from_header(&header)?;
        let data = into_zhw(&header, obj.into_volume().into_ndarray::<f32>()?)?;
        Ok(Self { header, kind, data })
    }

    /// 以 `reference` 的几何信息和体素类型, 包装新的强度数据 `data`.
    ///
    /// 若形状不一致, 返回 [`SimError::GeometryMismatch`].
    pub fn derived<R: NiftiHeaderAttr>(
        reference: &R,
        kind: VoxelKind,
        data: Array3<f32>,
    ) -> SimResult<Self> {
        let expected = reference.shape();
        if data.dim() != expected {
            return Err(SimError::GeometryMismatch {
                expected,
                found: data.dim(),
            });
        }
        Ok(Self {
            header: Box::new(reference.header().clone()),
            kind,
            data,
        })
    }

    /// 根据裸数据 (`[z, h, w]`) 和体素分辨率 (`[z, h, w]`, 毫米) 直接创建实体.
    ///
    /// # 注意
    ///
    /// 该方法创建的 header 仅包含形状和分辨率, 你应仅将其用于实验目的.
    pub fn fake(data: Array3<f32>, pix_dim: [f32; 3]) -> Self {
        let mut header = Box::new(synthetic_header(data.dim(), pix_dim));
        header.datatype = NiftiType::Float32 as i16;
        header.bitpix = 32;
        Self {
            header,
            kind: VoxelKind::F32,
            data,
        }
    }

    /// 原始体素类型.
    #[inline]
    pub fn kind(&self) -> VoxelKind {
        self.kind
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, f32, Ix3> {
        self.data.view_mut()
    }

    /// 取出内部数据.
    #[inline]
    pub fn into_data(self) -> Array3<f32> {
        self.data
    }

    /// 按原始体素类型保存到 `path`. 整数类型会四舍五入并饱和截断.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> SimResult<()> {
        write_as(path.as_ref(), &self.header, self.data(), self.kind)
    }
}

/// nii 格式 3D 病灶标签, 包括 header 和标签值. 标签值以 `u8` 保存.
#[derive(Debug, Clone)]
pub struct MrLabel {
    header: BoxedHeader,
    data: Array3<u8>,
}

impl NiftiHeaderAttr for MrLabel {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for MrLabel {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for MrLabel {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl MrLabel {
    /// 打开 nii 文件格式的 3D 标签. `path` 为 nii 文件的本地路径. 如果打开成功,
    /// 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());
        VoxelKind::from_header(&header)?;
        let data = into_zhw(&header, obj.into_volume().into_ndarray::<u8>()?)?;
        Ok(Self { header, data })
    }

    /// 创建一个与 `reference` 几何信息一致、全为背景的标签.
    pub fn empty_like<R: NiftiHeaderAttr>(reference: &R) -> Self {
        let mut header = Box::new(reference.header().clone());
        header.datatype = NiftiType::Uint8 as i16;
        header.bitpix = 8;
        Self {
            header,
            data: Array3::zeros(reference.shape()),
        }
    }

    /// 以 `reference` 的几何信息包装标签数据 `data`.
    ///
    /// 若形状不一致, 返回 [`SimError::GeometryMismatch`].
    pub fn derived<R: NiftiHeaderAttr>(reference: &R, data: Array3<u8>) -> SimResult<Self> {
        let mut ans = Self::empty_like(reference);
        if data.dim() != ans.data.dim() {
            return Err(SimError::GeometryMismatch {
                expected: ans.data.dim(),
                found: data.dim(),
            });
        }
        ans.data = data;
        Ok(ans)
    }

    /// 根据裸标签数据 (`[z, h, w]`) 和体素分辨率直接创建实体.
    ///
    /// # 注意
    ///
    /// 该方法创建的 header 仅包含形状和分辨率, 你应仅将其用于实验目的.
    pub fn fake(data: Array3<u8>, pix_dim: [f32; 3]) -> Self {
        let mut header = Box::new(synthetic_header(data.dim(), pix_dim));
        header.datatype = NiftiType::Uint8 as i16;
        header.bitpix = 8;
        Self { header, data }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u8, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, u8, Ix3> {
        self.data.view_mut()
    }

    /// 取出内部数据.
    #[inline]
    pub fn into_data(self) -> Array3<u8> {
        self.data
    }

    /// 病灶负载, 即非零体素个数.
    #[inline]
    pub fn load(&self) -> usize {
        self.data.iter().filter(|p| is_lesion(**p)).count()
    }

    /// 病灶负载, 以毫升为单位.
    #[inline]
    pub fn load_ml(&self) -> f64 {
        self.load() as f64 * self.voxel() / crate::consts::ML_TO_MM3
    }

    /// 收集所有病灶体素对应的下标. 结果按行优先存储.
    pub fn lesion_pos(&self) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(pos, p)| is_lesion(*p).then_some(pos))
            .collect()
    }

    /// 以 `u8` 格式保存到 `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> SimResult<()> {
        let header = output_header(&self.header);
        // [z, H, W] -> [W, H, z]
        let data = self.data.view().permuted_axes([2, 1, 0]);
        WriterOptions::new(path.as_ref())
            .reference_header(&header)
            .write_nifti(&data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_fake_volume_geometry() {
        let vol = MrVolume::fake(Array3::zeros((4, 5, 6)), [2.0, 1.0, 0.5]);
        assert_eq!(vol.shape(), (4, 5, 6));
        assert_eq!(vol.size(), 120);
        assert_eq!(vol.pix_dim(), [2.0, 1.0, 0.5]);
        assert!((vol.voxel() - 1.0).abs() < 1e-12);
        assert!(vol.check(&(3, 4, 5)));
        assert!(!vol.check(&(4, 0, 0)));
        assert_eq!(vol.kind(), VoxelKind::F32);
    }

    #[test]
    fn test_label_load() {
        let mut data = Array3::zeros((3, 3, 3));
        data[(0, 0, 0)] = 1;
        data[(2, 1, 0)] = 3;
        let label = MrLabel::fake(data, [1.0, 1.0, 1.0]);
        assert_eq!(label.load(), 2);
        assert!((label.load_ml() - 0.002).abs() < 1e-12);
        assert_eq!(label.lesion_pos(), vec![(0, 0, 0), (2, 1, 0)]);
    }

    #[test]
    fn test_derived_rejects_other_shape() {
        let vol = MrVolume::fake(Array3::zeros((2, 2, 2)), [1.0; 3]);
        let err = MrLabel::derived(&vol, Array3::zeros((2, 2, 3))).unwrap_err();
        assert!(matches!(err, SimError::GeometryMismatch { .. }));
        assert!(MrVolume::derived(&vol, VoxelKind::I16, Array3::zeros((2, 2, 2))).is_ok());
    }

    #[test]
    fn test_saturating_cast() {
        assert_eq!(saturating_cast::<u8>(300.0, true), 255);
        assert_eq!(saturating_cast::<u8>(-3.0, true), 0);
        assert_eq!(saturating_cast::<i16>(12.6, true), 13);
        assert_eq!(saturating_cast::<f64>(0.25, false), 0.25);
    }

    #[test]
    fn test_volume_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.nii.gz");
        let data = Array3::from_shape_fn((3, 4, 5), |(z, h, w)| (z * 100 + h * 10 + w) as f32);
        MrVolume::fake(data.clone(), [1.0, 1.0, 1.0]).save(&path).unwrap();

        let back = MrVolume::open(&path).unwrap();
        assert_eq!(back.shape(), (3, 4, 5));
        assert_eq!(back.kind(), VoxelKind::F32);
        assert_eq!(back.data(), data.view());
    }

    #[test]
    fn test_label_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("label.nii.gz");
        let mut data = Array3::zeros((2, 3, 4));
        data[(1, 2, 3)] = 1;
        data[(0, 1, 0)] = 1;
        MrLabel::fake(data.clone(), [1.0, 1.0, 1.0]).save(&path).unwrap();

        let back = MrLabel::open(&path).unwrap();
        assert_eq!(back.data(), data.view());
        assert_eq!(back.load(), 2);
    }
}
