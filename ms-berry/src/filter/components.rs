//! 三维连通域标记, 以及按体积降序重新编号.

use ndarray::{Array3, ArrayView3};

use crate::consts::label::is_lesion;
use crate::Idx3d;

/// 获取 `pos` 前后上下左右六个点的坐标.
///
/// 在数据范围外的坐标会被过滤掉, 不会包含在返回值中.
#[inline]
fn diamond_neighbours((z, h, w): Idx3d, (sz, sh, sw): Idx3d) -> impl Iterator<Item = Idx3d> {
    [
        (z.wrapping_sub(1), h, w),
        (z.saturating_add(1), h, w),
        (z, h.wrapping_sub(1), w),
        (z, h.saturating_add(1), w),
        (z, h, w.wrapping_sub(1)),
        (z, h, w.saturating_add(1)),
    ]
    .into_iter()
    .filter(move |&(a, b, c)| a < sz && b < sh && c < sw)
}

/// 连通域标记结果.
///
/// 标签 `k` (从 1 开始) 对应第 `k - 1` 个区域. 经 [`ComponentMap::sorted_by_size`]
/// 处理后, 标签 1 是体积最大的连通域.
#[derive(Debug, Clone)]
pub struct ComponentMap {
    labels: Array3<u32>,
    regions: Vec<Vec<Idx3d>>,
}

impl ComponentMap {
    /// 连通域个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// 是否不存在任何连通域?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// 标签图. 背景为 0.
    #[inline]
    pub fn labels(&self) -> ArrayView3<'_, u32> {
        self.labels.view()
    }

    /// 标签为 `label` 的连通域体素. `label` 从 1 开始, 越界时 panic.
    #[inline]
    pub fn region(&self, label: usize) -> &[Idx3d] {
        &self.regions[label - 1]
    }

    /// 按标签顺序给出各连通域体积.
    pub fn sizes(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.regions.iter().map(Vec::len)
    }

    /// 取出所有连通域, 按标签顺序排列.
    #[inline]
    pub fn into_regions(self) -> Vec<Vec<Idx3d>> {
        self.regions
    }

    /// 按体积降序重新编号. 体积相同的连通域保持原有相对顺序.
    pub fn sorted_by_size(mut self) -> Self {
        // 稳定排序
        self.regions.sort_by(|a, b| b.len().cmp(&a.len()));
        for (k, region) in self.regions.iter().enumerate() {
            for &pos in region {
                self.labels[pos] = k as u32 + 1;
            }
        }
        self
    }
}

/// 对所有非零体素做 6-邻域连通域标记, 并按体积降序编号.
///
/// 标签按行优先扫描顺序首次出现的位置分配, 再稳定地按体积排序.
pub fn label_components(mask: ArrayView3<u8>) -> ComponentMap {
    let shape = mask.dim();
    let mut labels = Array3::<u32>::zeros(shape);
    let mut regions: Vec<Vec<Idx3d>> = vec![];
    let mut stack = Vec::with_capacity(64);

    for (seed, &p) in mask.indexed_iter() {
        if !is_lesion(p) || labels[seed] != 0 {
            continue;
        }
        let id = regions.len() as u32 + 1;
        let mut region = vec![];
        labels[seed] = id;
        stack.push(seed);

        while let Some(pos) = stack.pop() {
            region.push(pos);
            for neigh in diamond_neighbours(pos, shape) {
                if is_lesion(mask[neigh]) && labels[neigh] == 0 {
                    labels[neigh] = id;
                    stack.push(neigh);
                }
            }
        }
        region.sort_unstable();
        regions.push(region);
    }

    ComponentMap { labels, regions }.sorted_by_size()
}
