//! 体数据滤波原语: 高斯平滑, 连通域标记, 统计, 强度过滤.
//!
//! 所有函数都是纯函数: 接受不可变视图, 返回新的数组.

mod components;
mod mask;
mod smooth;
mod stats;

pub use components::{label_components, ComponentMap};
pub use mask::{filter_mask, restrict_to_mask, FilterSummary};
pub use smooth::{gaussian_kernel, smooth};
pub use stats::{mean_and_variance, sum};
