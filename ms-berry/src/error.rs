//! 运行时错误.

use crate::Idx3d;
use std::path::PathBuf;

/// 模拟流程的运行时错误.
///
/// 其中只有 [`SimError::TemplateNotFound`] 会在采样器内部被恢复,
/// 其余错误均会一直传播到进程边界.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// 病灶模板文件不存在.
    #[error("lesion template {index} of bucket `{bucket}` not found at {}", path.display())]
    TemplateNotFound {
        /// bucket 名称.
        bucket: String,
        /// 模板索引.
        index: u32,
        /// 构造出的文件路径.
        path: PathBuf,
    },

    /// nifti 数据类型无法识别 (如 RGB, 复数).
    #[error("unsupported voxel component type `{0}`")]
    UnsupportedComponentType(String),

    /// 成像模态标签无法识别.
    #[error("unrecognized imaging modality `{0}`")]
    UnrecognizedModality(String),

    /// 参数不合法.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// 两个体数据的形状不一致.
    #[error("geometry mismatch: expected {expected:?}, found {found:?}")]
    GeometryMismatch {
        /// 期望的 `(z, h, w)`.
        expected: Idx3d,
        /// 实际的 `(z, h, w)`.
        found: Idx3d,
    },

    /// 体素数据与 header 声明的形状不符.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    /// nifti 读写错误.
    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),

    /// 其他底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// 配置文件解析错误.
    #[cfg(feature = "serde")]
    #[error("malformed configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// 模拟流程的运行时结果.
pub type SimResult<T> = Result<T, SimError>;
