use ndarray::{ArrayView3, ArrayViewMut3};
use num::Zero;

use crate::Idx3d;

/// 写入策略.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WritePolicy {
    /// 只写入目标中仍为 0 的体素. 已写入的体素不会被之后的病灶覆盖.
    FirstWriteWins,
    /// 无条件覆盖.
    Overwrite,
}

/// 将 `source` 中的体素合并到 `target`.
///
/// 返回实际写入的体素个数. 在 [`WritePolicy::FirstWriteWins`] 下,
/// 即新占据的体素个数. 越界的坐标被忽略.
pub fn compose<T, I>(mut target: ArrayViewMut3<T>, source: I, policy: WritePolicy) -> usize
where
    T: Copy + Zero,
    I: IntoIterator<Item = (Idx3d, T)>,
{
    let mut written = 0;
    for (pos, v) in source {
        let Some(dst) = target.get_mut(pos) else {
            continue;
        };
        if policy == WritePolicy::Overwrite || dst.is_zero() {
            *dst = v;
            written += 1;
        }
    }
    written
}

/// `positions` 中是否有任何一个体素在 `target` 中已被占据 (非零)?
pub fn overlaps<T, I>(target: ArrayView3<T>, positions: I) -> bool
where
    T: Zero,
    I: IntoIterator<Item = Idx3d>,
{
    positions
        .into_iter()
        .any(|pos| target.get(pos).map_or(false, |v| !v.is_zero()))
}
