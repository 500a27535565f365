//! 病灶标签的强度过滤, 以及把体数据限制在标签内部.

use ndarray::{Array3, ArrayView3, ArrayViewMut3, Zip};

use crate::consts::label::{is_lesion, BACKGROUND, LESION};

/// 一次强度过滤的统计结果.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSummary {
    /// 过滤前的病灶体素数.
    pub initial: usize,
    /// 过滤后保留的病灶体素数.
    pub kept: usize,
    /// 病灶区域内的强度均值.
    pub mean: f64,
    /// 病灶区域内的强度标准差 (无偏).
    pub std: f64,
}

impl FilterSummary {
    /// 保留比例. 空标签时为 0.
    pub fn kept_ratio(&self) -> f64 {
        if self.initial == 0 {
            0.0
        } else {
            self.kept as f64 / self.initial as f64
        }
    }

    /// 保留区间 `(mean - k * std, mean + k * std)`.
    pub fn bounds(&self, cut_factor: f64) -> (f64, f64) {
        let d = cut_factor * self.std;
        (self.mean - d, self.mean + d)
    }
}

/// 只保留强度严格落在 `mean ± cut_factor * std` 之内的病灶体素.
///
/// 均值和标准差在 `mask` 的所有非零体素上统计. 输出为二值标签 (0/1).
/// 标签为空时返回全背景标签, 统计值为 0.
pub fn filter_mask(
    image: ArrayView3<f32>,
    mask: ArrayView3<u8>,
    cut_factor: f64,
) -> (Array3<u8>, FilterSummary) {
    debug_assert_eq!(image.dim(), mask.dim());
    let binary = mask.mapv(|p| if is_lesion(p) { LESION } else { BACKGROUND });
    let initial = binary.iter().filter(|&&p| p == LESION).count();

    let (mean, std) = match super::mean_and_variance(image, binary.view(), LESION) {
        Some((mean, var)) => (mean, var.sqrt()),
        None => {
            let summary = FilterSummary {
                initial: 0,
                kept: 0,
                mean: 0.0,
                std: 0.0,
            };
            return (binary, summary);
        }
    };

    let (lo, hi) = (mean - cut_factor * std, mean + cut_factor * std);
    let mut kept = 0usize;
    let out = Zip::from(&binary).and(&image).map_collect(|&p, &v| {
        let v = v as f64;
        if p == LESION && v > lo && v < hi {
            kept += 1;
            LESION
        } else {
            BACKGROUND
        }
    });
    (
        out,
        FilterSummary {
            initial,
            kept,
            mean,
            std,
        },
    )
}

/// 把 `mask` 之外的体素全部置为 `outside`.
pub fn restrict_to_mask(mut field: ArrayViewMut3<f32>, mask: ArrayView3<u8>, outside: f32) {
    Zip::from(&mut field).and(&mask).for_each(|v, &p| {
        if !is_lesion(p) {
            *v = outside;
        }
    });
}
