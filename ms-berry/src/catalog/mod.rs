//! 病灶模板库.
//!
//! 模板按体积区间 (bucket) 组织, 在磁盘上的布局为:
//!
//! ```text
//! <root>/
//!   catalog.toml        (可选, 覆盖默认 bucket 表)
//!   50-100/
//!     0.nii.gz
//!     1.nii.gz
//!     ...
//!   100-500/
//!     ...
//! ```
//!
//! 模板只在被抽中时才读取.

use std::path::{Path, PathBuf};

use ndarray::ArrayView3;

use crate::consts::label::is_lesion;
use crate::consts::{DEFAULT_BUCKETS, TEMPLATE_EXT};
use crate::{Idx3d, MrLabel, NiftiHeaderAttr, SimError, SimResult};

/// 一个体积区间.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct SizeBucket {
    /// 显示名称, 同时也是子目录名.
    pub name: String,
    /// 模板个数. 模板索引范围为 `0..population`.
    pub population: u32,
    /// 模板的代表体积 (体素), 仅用于容量估计.
    #[cfg_attr(feature = "serde", serde(default))]
    pub mean_load: Option<f64>,
}

impl SizeBucket {
    /// 构造.
    pub fn new<S: Into<String>>(name: S, population: u32, mean_load: Option<f64>) -> Self {
        Self {
            name: name.into(),
            population,
            mean_load,
        }
    }
}

/// 获取 `$HOME/dataset` 下的子路径. 无法确定用户目录时返回 `None`.
///
/// 例如 `home_dataset_dir_with(["lesion-db"])` 得到 `$HOME/dataset/lesion-db`.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    ans.extend(it);
    Some(ans)
}

/// 默认的五个 bucket, 从小到大排列.
pub fn default_buckets() -> Vec<SizeBucket> {
    DEFAULT_BUCKETS
        .iter()
        .map(|&(name, population, mean_load)| SizeBucket::new(name, population, Some(mean_load)))
        .collect()
}

/// 从模板库中读出的一个病灶模板. 只读.
#[derive(Debug, Clone)]
pub struct LesionTemplate {
    bucket: usize,
    index: u32,
    shape: Idx3d,
    voxels: Vec<(Idx3d, u8)>,
}

impl LesionTemplate {
    /// 收集 `mask` 中所有非零体素, 构建模板.
    pub fn from_mask(bucket: usize, index: u32, mask: ArrayView3<u8>) -> Self {
        let voxels = mask
            .indexed_iter()
            .filter_map(|(pos, &p)| is_lesion(p).then_some((pos, p)))
            .collect();
        Self {
            bucket,
            index,
            shape: mask.dim(),
            voxels,
        }
    }

    /// 所属 bucket 的下标.
    #[inline]
    pub fn bucket(&self) -> usize {
        self.bucket
    }

    /// 模板索引.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// 模板原始体数据的形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.shape
    }

    /// 病灶体素及其标签值.
    #[inline]
    pub fn voxels(&self) -> &[(Idx3d, u8)] {
        &self.voxels
    }

    /// 病灶负载 (体素个数).
    #[inline]
    pub fn load(&self) -> usize {
        self.voxels.len()
    }

    /// 病灶的包围盒 `(min, max)`, 两端均包含. 空模板返回 `None`.
    pub fn extent(&self) -> Option<(Idx3d, Idx3d)> {
        let mut it = self.voxels.iter().map(|&(pos, _)| pos);
        let first = it.next()?;
        Some(it.fold((first, first), |(lo, hi), (z, h, w)| {
            (
                (lo.0.min(z), lo.1.min(h), lo.2.min(w)),
                (hi.0.max(z), hi.1.max(h), hi.2.max(w)),
            )
        }))
    }
}

/// 病灶模板来源.
pub trait TemplateSource {
    /// bucket 表, 从小到大排列.
    fn buckets(&self) -> &[SizeBucket];

    /// 读取第 `bucket` 个 bucket 中索引为 `index` 的模板.
    ///
    /// 模板不存在时应返回 [`SimError::TemplateNotFound`].
    fn load(&self, bucket: usize, index: u32) -> SimResult<LesionTemplate>;

    /// 所有 bucket 的模板总数.
    fn total_population(&self) -> u64 {
        self.buckets().iter().map(|b| b.population as u64).sum()
    }
}

/// 磁盘上的病灶模板库.
#[derive(Debug, Clone)]
pub struct LesionCatalog {
    root: PathBuf,
    buckets: Vec<SizeBucket>,
}

impl LesionCatalog {
    /// 以 `root` 为根目录, 使用给定的 bucket 表.
    pub fn new<P: Into<PathBuf>>(root: P, buckets: Vec<SizeBucket>) -> SimResult<Self> {
        if buckets.is_empty() {
            return Err(SimError::InvalidParameter(
                "lesion catalog has no size bucket".into(),
            ));
        }
        Ok(Self {
            root: root.into(),
            buckets,
        })
    }

    /// 以 `root` 为根目录, 使用默认的 bucket 表.
    pub fn with_default_buckets<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            buckets: default_buckets(),
        }
    }

    /// 打开模板库. 若根目录下存在 `catalog.toml`, 则以其中的 bucket 表
    /// 代替默认表.
    #[cfg(feature = "serde")]
    pub fn open<P: Into<PathBuf>>(root: P) -> SimResult<Self> {
        #[derive(serde::Deserialize)]
        struct CatalogFile {
            bucket: Vec<SizeBucket>,
        }

        let root = root.into();
        let config = root.join(crate::consts::CATALOG_CONFIG);
        if !config.is_file() {
            return Ok(Self::with_default_buckets(root));
        }
        let file: CatalogFile = toml::from_str(&std::fs::read_to_string(&config)?)?;
        log::debug!(
            "bucket table loaded from {} ({} buckets)",
            config.display(),
            file.bucket.len()
        );
        Self::new(root, file.bucket)
    }

    /// 根目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 模板文件路径: `<root>/<bucket name>/<index>.nii.gz`.
    pub fn template_path(&self, bucket: usize, index: u32) -> PathBuf {
        self.root
            .join(&self.buckets[bucket].name)
            .join(format!("{index}.{TEMPLATE_EXT}"))
    }
}

impl TemplateSource for LesionCatalog {
    #[inline]
    fn buckets(&self) -> &[SizeBucket] {
        &self.buckets
    }

    fn load(&self, bucket: usize, index: u32) -> SimResult<LesionTemplate> {
        let path = self.template_path(bucket, index);
        if !path.is_file() {
            return Err(SimError::TemplateNotFound {
                bucket: self.buckets[bucket].name.clone(),
                index,
                path,
            });
        }
        let label = MrLabel::open(&path)?;
        log::trace!(
            "template {}/{index} loaded, shape {:?}",
            self.buckets[bucket].name,
            label.shape()
        );
        Ok(LesionTemplate::from_mask(bucket, index, label.data()))
    }
}
