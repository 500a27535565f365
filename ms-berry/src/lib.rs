#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 在 nifti 格式的 3D MR 体数据上合成多发性硬化 (MS) 病灶,
//! 并模拟病灶在多次随访中的对比度演化.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 所有体数据在内存中均以 `[z, h, w]` 顺序存储 (与 nifti 的 `[w, h, z]` 相反).
//! 2. 所有随机过程都持有显式的随机数生成器. 给定相同种子, 结果可复现.
//! 3. 模拟过程中的 "可恢复" 失败 (模板缺失, 重叠, 超载) 只会驱动采样器的下一轮迭代;
//!   只有 I/O 和类型解析错误会以 [`SimError`] 的形式向上传播.
//!
//! # 功能概览
//!
//! ### 病灶模板库 ✅
//!
//! 按体积区间 (bucket) 组织的预分割病灶模板, 懒加载.
//!
//! 实现位于 `ms-berry/src/catalog`.
//!
//! ### 负载约束的随机病灶放置 ✅
//!
//! 在目标病灶负载 (mL) 的约束下, 随机抽取互不重叠的病灶模板, 生成合成病灶标签.
//!
//! 实现位于 `ms-berry/src/sampler`.
//!
//! ### 病灶标签的强度过滤 ✅
//!
//! 只保留强度落在 `mean ± k * std` 之内的病灶体素.
//!
//! 实现位于 `ms-berry/src/filter/mask.rs`.
//!
//! ### 单时间点强度形变 ✅
//!
//! 实现位于 `ms-berry/src/deform`.
//!
//! ### 纵向随访模拟 ✅
//!
//! 每个连通病灶拥有独立的 DC level, 随时间点线性漂移并叠加随机扰动.
//!
//! 实现位于 `ms-berry/src/longitudinal`.

/// 三维索引, 按 `(z, h, w)` 组织.
pub type Idx3d = (usize, usize, usize);

/// 3D MR nii 文件基础数据结构.
mod data;

pub use data::{synthetic_header, MrLabel, MrVolume, NiftiHeaderAttr, VoxelKind};

pub mod catalog;
pub mod consts;
pub mod deform;
mod error;
pub mod filter;
pub mod longitudinal;
pub mod modality;
pub mod prelude;
pub mod random;
pub mod sampler;

pub use error::{SimError, SimResult};
