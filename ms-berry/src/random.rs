//! 显式随机数生成器.
//!
//! 所有随机过程都持有自己的 [`StdRng`], 不存在进程级全局随机状态.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Open01, StandardNormal};
use statrs::distribution::{ContinuousCDF, Normal};

/// 以 `seed` 初始化随机数生成器. 若 `seed` 为 `None`, 则从系统熵源抽取一个种子.
///
/// 返回生成器及实际使用的种子. 调用方应记录该种子, 以便复现本次运行.
pub fn seeded(seed: Option<u64>) -> (StdRng, u64) {
    let seed = seed.unwrap_or_else(rand::random);
    (StdRng::seed_from_u64(seed), seed)
}

/// 抽取一个标准正态分布样本.
#[inline]
pub fn normal_variate<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.sample(StandardNormal)
}

/// 抽取一个落在 `[-bound, bound]` 之内的标准正态分布样本.
///
/// 结果的分布与 "反复抽取直到落入区间" 完全相同, 但只消耗一个均匀分布样本,
/// 因此即使 `bound` 很小也不会长时间循环. `bound <= 0` 时返回 0.
pub fn bounded_normal_variate<R: Rng + ?Sized>(rng: &mut R, bound: f64) -> f64 {
    if !(bound > 0.0) {
        return 0.0;
    }
    let Ok(std_normal) = Normal::new(0.0, 1.0) else {
        return 0.0;
    };
    let lo = std_normal.cdf(-bound);
    let hi = std_normal.cdf(bound);
    let u: f64 = rng.sample(Open01);
    std_normal
        .inverse_cdf(lo + u * (hi - lo))
        .clamp(-bound, bound)
}
