//! 体数据统计.

use ndarray::ArrayView3;

/// 所有体素值之和.
pub fn sum<T: Copy + Into<f64>>(grid: ArrayView3<T>) -> f64 {
    grid.iter().map(|&v| v.into()).sum()
}

/// 统计 `labels == label` 区域内 `grid` 的均值和 (无偏) 方差.
///
/// 若区域为空, 返回 `None`. 只有一个体素时方差为 0.
pub fn mean_and_variance(
    grid: ArrayView3<f32>,
    labels: ArrayView3<u8>,
    label: u8,
) -> Option<(f64, f64)> {
    debug_assert_eq!(grid.dim(), labels.dim());

    // Welford 单遍算法
    let (mut n, mut mean, mut m2) = (0u64, 0.0f64, 0.0f64);
    for (&v, _) in grid
        .iter()
        .zip(labels.iter())
        .filter(|&(_, &l)| l == label)
    {
        n += 1;
        let v = v as f64;
        let delta = v - mean;
        mean += delta / n as f64;
        m2 += delta * (v - mean);
    }
    match n {
        0 => None,
        1 => Some((mean, 0.0)),
        _ => Some((mean, m2 / (n - 1) as f64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn test_sum() {
        let grid = Array3::from_elem((2, 3, 4), 1u8);
        assert_eq!(sum(grid.view()), 24.0);
        let grid = Array3::from_elem((2, 2, 2), 0.5f32);
        assert_eq!(sum(grid.view()), 4.0);
    }

    #[test]
    fn test_mean_and_variance() {
        let grid = array![[[1.0f32, 2.0, 3.0, 4.0]]];
        let labels = array![[[1u8, 1, 1, 0]]];
        let (mean, var) = mean_and_variance(grid.view(), labels.view(), 1).unwrap();
        assert!((mean - 2.0).abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);

        let (mean, var) = mean_and_variance(grid.view(), labels.view(), 0).unwrap();
        assert_eq!((mean, var), (4.0, 0.0));
        assert!(mean_and_variance(grid.view(), labels.view(), 9).is_none());
    }
}
