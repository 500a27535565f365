//! 可分离三维高斯平滑.

use ndarray::{Array3, ArrayView1, ArrayView3, ArrayViewMut1, Axis, Zip};

use crate::consts::GAUSSIAN_TRUNCATE;

/// 生成标准差为 `sigma` (单位: 体素) 的一维高斯核, 半径为 `ceil(3 * sigma)`.
///
/// 核未归一化; 卷积时按边界内实际参与的权重归一化.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    debug_assert!(sigma > 0.0);
    let radius = ((GAUSSIAN_TRUNCATE * sigma).ceil() as usize).max(1);
    let denom = 2.0 * sigma * sigma;
    (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / denom).exp()
        })
        .collect()
}

/// 对一条线做卷积. 越界的核权重不参与, 结果按参与的权重之和归一化,
/// 因此常数场在边界处仍保持不变.
fn convolve_lane(lane: ArrayView1<f32>, mut out: ArrayViewMut1<f32>, kernel: &[f64]) {
    let n = lane.len();
    let half = kernel.len() / 2;
    for i in 0..n {
        let lo = i.saturating_sub(half);
        let hi = (i + half).min(n - 1);
        let (mut acc, mut weight) = (0.0f64, 0.0f64);
        for j in lo..=hi {
            let k = kernel[j + half - i];
            acc += k * lane[j] as f64;
            weight += k;
        }
        out[i] = (acc / weight) as f32;
    }
}

/// 沿 `axis` 方向平滑.
fn smooth_axis(src: &Array3<f32>, axis: Axis, kernel: &[f64]) -> Array3<f32> {
    let mut dst = Array3::<f32>::zeros(src.raw_dim());
    let zip = Zip::from(dst.lanes_mut(axis)).and(src.lanes(axis));

    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            zip.par_for_each(|out, lane| convolve_lane(lane, out, kernel));
        } else {
            zip.for_each(|out, lane| convolve_lane(lane, out, kernel));
        }
    }
    dst
}

/// 对 `grid` 做可分离三维高斯平滑.
///
/// `sigma` 以毫米为单位, `spacing` 为 `[z, h, w]` 三个方向的体素分辨率 (毫米),
/// 因此各向异性体素在每个方向上使用不同的体素级标准差.
/// `sigma <= 0` 时原样返回 `grid` 的拷贝.
pub fn smooth(grid: ArrayView3<f32>, sigma: f64, spacing: [f64; 3]) -> Array3<f32> {
    let mut ans = grid.to_owned();
    if !(sigma > 0.0) {
        return ans;
    }
    for (axis, mm) in spacing.into_iter().enumerate() {
        let sigma_vox = if mm > 0.0 { sigma / mm } else { sigma };
        if ans.len_of(Axis(axis)) < 2 || sigma_vox < 1e-3 {
            continue;
        }
        ans = smooth_axis(&ans, Axis(axis), &gaussian_kernel(sigma_vox));
    }
    ans
}
