//! 负载约束的随机病灶放置.
//!
//! 反复从模板库中随机抽取病灶模板, 直到合成标签的病灶负载达到目标值.
//! 任意两个被接受的模板互不重叠.
//!
//! # 算法
//!
//! 每一轮:
//!
//! 1. 负载已达到目标, 成功结束; 没有可用 bucket, 以 "无法达到" 结束.
//!    代表体积超过剩余负载, 或推迟次数超过阈值的 bucket 被搁置,
//!    只要还有更小的可用 bucket, 就不从其中抽取.
//! 2. 从未被搁置的可用 bucket 中均匀抽取一个, 再在其中均匀抽取一个模板索引
//!    (`0..population`).
//! 3. 读取模板. 模板缺失算作一次拒绝.
//! 4. 若接受该模板会超过目标负载:
//!    - 它不在最小的可用 bucket 中: 推迟 (计入该 bucket 的推迟次数), 留给更小的模板;
//!    - 它在最小的可用 bucket 中: 不存在更小的候选, 若不重叠则接受并结束.
//! 5. 与已有病灶重叠则拒绝.
//! 6. 拒绝次数超过阈值的 bucket 被移出可用列表.
//! 7. 接受时按 "先写者胜" 合并, 负载增加新写入的体素数.

mod compose;

pub use compose::{compose, overlaps, WritePolicy};

use std::collections::HashSet;

use ndarray::ArrayViewMut3;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::catalog::TemplateSource;
use crate::consts::ML_TO_MM3;
use crate::{random, MrLabel, NiftiHeaderAttr, SimError, SimResult};

/// 模板索引的抽取方式.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum DrawPolicy {
    /// 有放回: 同一模板可被反复抽中.
    #[default]
    WithReplacement,
    /// 无放回: 已被接受或拒绝的模板不会再被抽中.
    WithoutReplacement,
}

/// bucket 的耗尽阈值. 拒绝次数超过该值后, bucket 被移出可用列表.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum Exhaustion {
    /// 阈值为 bucket 的模板个数.
    #[default]
    Population,
    /// 固定阈值.
    Fixed(u32),
}

impl Exhaustion {
    #[inline]
    fn threshold(self, population: u32) -> u32 {
        match self {
            Self::Population => population,
            Self::Fixed(n) => n,
        }
    }
}

/// 把病灶负载 (mL) 换算为体素个数, 向上取整.
pub fn millilitres_to_voxels(ml: f64, voxel_mm3: f64) -> SimResult<usize> {
    if !(ml.is_finite() && ml >= 0.0) {
        return Err(SimError::InvalidParameter(format!(
            "lesion load must be a non-negative number of millilitres, got {ml}"
        )));
    }
    if !(voxel_mm3.is_finite() && voxel_mm3 > 0.0) {
        return Err(SimError::InvalidParameter(format!(
            "voxel volume must be positive, got {voxel_mm3} mm^3"
        )));
    }
    Ok((ml * ML_TO_MM3 / voxel_mm3).ceil() as usize)
}

/// 采样器参数.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// 目标负载 (体素).
    pub desired_load: usize,
    /// 模板索引的抽取方式.
    pub draw: DrawPolicy,
    /// bucket 耗尽阈值.
    pub exhaustion: Exhaustion,
    /// 随机种子. `None` 表示从系统熵源抽取.
    pub seed: Option<u64>,
    /// 最多抽取次数. `None` 表示按模板总数推导.
    pub max_draws: Option<u64>,
}

impl SamplerConfig {
    /// 以体素为单位的目标负载构建默认参数.
    pub fn new(desired_load: usize) -> Self {
        Self {
            desired_load,
            draw: DrawPolicy::default(),
            exhaustion: Exhaustion::default(),
            seed: None,
            max_draws: None,
        }
    }

    /// 以毫升为单位的目标负载构建默认参数. `voxel_mm3` 为参考体数据的体素体积.
    pub fn from_millilitres(ml: f64, voxel_mm3: f64) -> SimResult<Self> {
        Ok(Self::new(millilitres_to_voxels(ml, voxel_mm3)?))
    }

    /// 设置随机种子.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// 设置抽取方式.
    pub fn with_draw_policy(mut self, draw: DrawPolicy) -> Self {
        self.draw = draw;
        self
    }

    /// 设置耗尽阈值.
    pub fn with_exhaustion(mut self, exhaustion: Exhaustion) -> Self {
        self.exhaustion = exhaustion;
        self
    }

    /// 设置最多抽取次数.
    pub fn with_max_draws(mut self, max_draws: u64) -> Self {
        self.max_draws = Some(max_draws);
        self
    }
}

/// 一个被接受的模板.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Accepted {
    /// bucket 下标.
    pub bucket: usize,
    /// 模板索引.
    pub index: u32,
    /// 模板负载.
    pub load: usize,
    /// 实际新写入的体素数.
    pub written: usize,
}

/// 各类拒绝的计数.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct RejectionTally {
    /// 模板文件缺失.
    pub missing: u64,
    /// 模板为空.
    pub empty: u64,
    /// 与已有病灶重叠.
    pub overlap: u64,
    /// 超出目标负载而被推迟.
    pub overshoot: u64,
}

impl RejectionTally {
    /// 总数.
    pub fn total(&self) -> u64 {
        self.missing + self.empty + self.overlap + self.overshoot
    }
}

/// 一次采样的结果.
#[derive(Debug, Clone)]
pub struct SampleReport {
    /// 目标负载 (体素).
    pub desired: usize,
    /// 最终负载 (体素).
    pub current: usize,
    /// 是否达到目标负载.
    pub reached: bool,
    /// 实际使用的随机种子.
    pub seed: u64,
    /// 被接受的模板, 按接受顺序排列.
    pub accepted: Vec<Accepted>,
    /// 每次接受后的负载.
    pub history: Vec<usize>,
    /// 总抽取次数.
    pub draws: u64,
    /// 拒绝计数.
    pub rejections: RejectionTally,
}

/// 拒绝原因.
#[derive(Debug, Copy, Clone)]
enum Rejection {
    Missing,
    Empty,
    Overlap,
}

/// 单次运行的内部状态, 运行结束即丢弃.
struct SamplerState {
    current: usize,
    /// 可用 bucket 下标, 从小到大.
    eligible: Vec<usize>,
    rejected: Vec<u32>,
    deferred: Vec<u32>,
    tried: Vec<HashSet<u32>>,
    accepted: Vec<Accepted>,
    history: Vec<usize>,
    tally: RejectionTally,
    draws: u64,
}

impl SamplerState {
    fn new(populations: &[u32]) -> Self {
        let n = populations.len();
        Self {
            current: 0,
            eligible: (0..n).filter(|&b| populations[b] > 0).collect(),
            rejected: vec![0; n],
            deferred: vec![0; n],
            tried: vec![HashSet::new(); n],
            accepted: vec![],
            history: vec![],
            tally: RejectionTally::default(),
            draws: 0,
        }
    }

    fn drop_bucket(&mut self, bucket: usize) {
        self.eligible.retain(|&b| b != bucket);
    }
}

/// 负载约束的随机病灶采样器. 持有自己的随机数生成器.
pub struct LoadSampler<'a, S: TemplateSource + ?Sized> {
    source: &'a S,
    config: SamplerConfig,
    rng: StdRng,
    seed: u64,
}

impl<'a, S: TemplateSource + ?Sized> LoadSampler<'a, S> {
    /// 构建采样器. 模板库为空时返回 [`SimError::InvalidParameter`].
    pub fn new(source: &'a S, config: SamplerConfig) -> SimResult<Self> {
        if source.total_population() == 0 {
            return Err(SimError::InvalidParameter(
                "lesion catalog holds no template".into(),
            ));
        }
        let (rng, seed) = random::seeded(config.seed);
        Ok(Self {
            source,
            config,
            rng,
            seed,
        })
    }

    /// 实际使用的随机种子.
    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn max_draws(&self) -> u64 {
        self.config
            .max_draws
            .unwrap_or_else(|| 64 * (self.source.total_population() + 16))
    }

    /// 若所有 bucket 都给出了代表体积, 检查模板库的容量是否足以达到目标负载.
    fn check_capacity(&self) {
        let estimate: Option<f64> = self
            .source
            .buckets()
            .iter()
            .map(|b| b.mean_load.map(|m| m * b.population as f64))
            .sum();
        if let Some(estimate) = estimate {
            if estimate < self.config.desired_load as f64 {
                log::warn!(
                    "catalog capacity (~{estimate:.0} voxels) is below the desired load ({} voxels)",
                    self.config.desired_load
                );
            }
        }
    }

    fn draw_index(&mut self, state: &SamplerState, bucket: usize) -> Option<u32> {
        let population = self.source.buckets()[bucket].population;
        match self.config.draw {
            DrawPolicy::WithReplacement => Some(self.rng.gen_range(0..population)),
            DrawPolicy::WithoutReplacement => {
                let untried: Vec<u32> = (0..population)
                    .filter(|i| !state.tried[bucket].contains(i))
                    .collect();
                untried.choose(&mut self.rng).copied()
            }
        }
    }

    fn reject(&self, state: &mut SamplerState, bucket: usize, index: u32, why: Rejection) {
        match why {
            Rejection::Missing => state.tally.missing += 1,
            Rejection::Empty => state.tally.empty += 1,
            Rejection::Overlap => state.tally.overlap += 1,
        }
        state.rejected[bucket] += 1;
        state.tried[bucket].insert(index);

        let b = &self.source.buckets()[bucket];
        let threshold = self.config.exhaustion.threshold(b.population);
        if state.rejected[bucket] > threshold || self.all_tried(state, bucket) {
            log::debug!(
                "bucket `{}` exhausted after {} rejections",
                b.name,
                state.rejected[bucket]
            );
            state.drop_bucket(bucket);
        }
    }

    /// 可以抽取的 bucket. 最小的可用 bucket 总在其中.
    fn drawable(&self, state: &SamplerState, desired: usize) -> Vec<usize> {
        let deficit = desired.saturating_sub(state.current) as f64;
        let buckets = self.source.buckets();
        state
            .eligible
            .iter()
            .enumerate()
            .filter(|&(rank, &b)| {
                let fits = buckets[b].mean_load.map_or(true, |m| m <= deficit);
                let threshold = self.config.exhaustion.threshold(buckets[b].population);
                rank == 0 || (fits && state.deferred[b] <= threshold)
            })
            .map(|(_, &b)| b)
            .collect()
    }

    fn all_tried(&self, state: &SamplerState, bucket: usize) -> bool {
        self.config.draw == DrawPolicy::WithoutReplacement
            && state.tried[bucket].len() >= self.source.buckets()[bucket].population as usize
    }

    /// 在 `mask` 上放置病灶, 直到负载达到目标或无模板可用.
    ///
    /// `mask` 中已有的非零体素视为已占据, 但不计入负载.
    /// 无法达到目标负载不是错误, 而是 [`SampleReport::reached`] 为 `false`.
    /// 模板形状与 `mask` 不一致时返回 [`SimError::GeometryMismatch`].
    pub fn run(&mut self, mut mask: ArrayViewMut3<u8>) -> SimResult<SampleReport> {
        let desired = self.config.desired_load;
        let max_draws = self.max_draws();
        let populations: Vec<u32> = self.source.buckets().iter().map(|b| b.population).collect();
        let mut state = SamplerState::new(&populations);

        log::info!(
            "placing lesions: desired load {desired} voxels, {} buckets, seed {}",
            state.eligible.len(),
            self.seed
        );
        self.check_capacity();

        loop {
            if state.current >= desired {
                break;
            }
            let Some(&smallest) = state.eligible.first() else {
                break;
            };
            if state.draws >= max_draws {
                log::warn!("draw budget of {max_draws} exhausted");
                break;
            }
            state.draws += 1;

            let drawable = self.drawable(&state, desired);
            let bucket = drawable[self.rng.gen_range(0..drawable.len())];
            let Some(index) = self.draw_index(&state, bucket) else {
                state.drop_bucket(bucket);
                continue;
            };

            let template = match self.source.load(bucket, index) {
                Ok(t) => t,
                Err(SimError::TemplateNotFound { path, .. }) => {
                    log::debug!("template missing: {}", path.display());
                    self.reject(&mut state, bucket, index, Rejection::Missing);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if template.shape() != mask.dim() {
                return Err(SimError::GeometryMismatch {
                    expected: mask.dim(),
                    found: template.shape(),
                });
            }
            let load = template.load();
            if load == 0 {
                self.reject(&mut state, bucket, index, Rejection::Empty);
                continue;
            }

            let overshoot = state.current + load > desired;
            if overshoot && bucket != smallest {
                state.tally.overshoot += 1;
                state.deferred[bucket] += 1;
                continue;
            }
            if overlaps(mask.view(), template.voxels().iter().map(|&(pos, _)| pos)) {
                self.reject(&mut state, bucket, index, Rejection::Overlap);
                continue;
            }

            let written = compose(
                mask.view_mut(),
                template.voxels().iter().copied(),
                WritePolicy::FirstWriteWins,
            );
            state.current += written;
            state.history.push(state.current);
            state.accepted.push(Accepted {
                bucket,
                index,
                load,
                written,
            });
            state.tried[bucket].insert(index);
            log::debug!(
                "accepted {}/{index} ({load} voxels), load {}/{desired}",
                self.source.buckets()[bucket].name,
                state.current
            );
            if self.all_tried(&state, bucket) {
                state.drop_bucket(bucket);
            }
            if overshoot {
                break;
            }
        }

        let reached = state.current >= desired;
        if reached {
            log::info!(
                "lesion load reached: {} voxels from {} templates ({} draws)",
                state.current,
                state.accepted.len(),
                state.draws
            );
        } else {
            log::warn!(
                "lesion load unreachable: {} of {desired} voxels after {} draws",
                state.current,
                state.draws
            );
        }

        Ok(SampleReport {
            desired,
            current: state.current,
            reached,
            seed: self.seed,
            accepted: state.accepted,
            history: state.history,
            draws: state.draws,
            rejections: state.tally,
        })
    }
}

/// 以 `reference` 的几何信息生成一个新的合成病灶标签.
///
/// `lesion_load_ml` 为目标负载 (mL), 按 `reference` 的体素体积换算为体素个数;
/// `config.desired_load` 会被覆盖.
pub fn generate_mask<S, R>(
    source: &S,
    reference: &R,
    lesion_load_ml: f64,
    mut config: SamplerConfig,
) -> SimResult<(MrLabel, SampleReport)>
where
    S: TemplateSource + ?Sized,
    R: NiftiHeaderAttr,
{
    config.desired_load = millilitres_to_voxels(lesion_load_ml, reference.voxel())?;
    let mut label = MrLabel::empty_like(reference);
    let report = LoadSampler::new(source, config)?.run(label.data_mut())?;
    Ok((label, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{LesionTemplate, SizeBucket};
    use crate::Idx3d;
    use ndarray::Array3;
    use std::cell::Cell;

    const SHAPE: Idx3d = (4, 10, 10);

    /// 内存中的模板库. `None` 表示模板缺失.
    struct MemorySource {
        buckets: Vec<SizeBucket>,
        templates: Vec<Vec<Option<Array3<u8>>>>,
        /// 每个 bucket 被读取的次数.
        loads: Vec<Cell<usize>>,
    }

    impl MemorySource {
        fn new(buckets: Vec<SizeBucket>, templates: Vec<Vec<Option<Array3<u8>>>>) -> Self {
            let loads = buckets.iter().map(|_| Cell::new(0)).collect();
            Self {
                buckets,
                templates,
                loads,
            }
        }
    }

    impl TemplateSource for MemorySource {
        fn buckets(&self) -> &[SizeBucket] {
            &self.buckets
        }

        fn load(&self, bucket: usize, index: u32) -> SimResult<LesionTemplate> {
            self.loads[bucket].set(self.loads[bucket].get() + 1);
            match &self.templates[bucket][index as usize] {
                Some(mask) => Ok(LesionTemplate::from_mask(bucket, index, mask.view())),
                None => Err(SimError::TemplateNotFound {
                    bucket: self.buckets[bucket].name.clone(),
                    index,
                    path: format!("{}/{index}.nii.gz", self.buckets[bucket].name).into(),
                }),
            }
        }
    }

    fn block(z: usize, rows: std::ops::Range<usize>) -> Array3<u8> {
        let mut mask = Array3::zeros(SHAPE);
        for h in rows {
            for w in 0..SHAPE.2 {
                mask[(z, h, w)] = 1;
            }
        }
        mask
    }

    /// A: 3 个 10 体素模板; B: 2 个 50 体素模板. 互不重叠.
    fn two_buckets() -> MemorySource {
        MemorySource::new(
            vec![
                SizeBucket::new("A", 3, Some(10.0)),
                SizeBucket::new("B", 2, Some(50.0)),
            ],
            vec![
                (0..3).map(|i| Some(block(0, i..i + 1))).collect(),
                vec![Some(block(1, 0..5)), Some(block(2, 0..5))],
            ],
        )
    }

    /// A: 100 个单体素模板; B: 2 个 50 体素模板.
    fn many_small(mean_loads: [Option<f64>; 2]) -> MemorySource {
        let dot = |i: usize| {
            let mut mask = Array3::zeros(SHAPE);
            mask[(3, i / 10, i % 10)] = 1;
            Some(mask)
        };
        MemorySource::new(
            vec![
                SizeBucket::new("A", 100, mean_loads[0]),
                SizeBucket::new("B", 2, mean_loads[1]),
            ],
            vec![
                (0..100).map(dot).collect(),
                vec![Some(block(1, 0..5)), Some(block(2, 0..5))],
            ],
        )
    }

    fn check_report(report: &SampleReport, mask: &Array3<u8>) {
        // 负载单调增加, 并与标签一致.
        assert!(report.history.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(report.history.last().copied().unwrap_or(0), report.current);
        assert_eq!(mask.iter().filter(|&&p| p != 0).count(), report.current);
        // 互不重叠: 每个被接受的模板都完整写入.
        assert!(report.accepted.iter().all(|a| a.written == a.load));
    }

    #[test]
    fn test_two_bucket_scenario() {
        let source = two_buckets();
        for seed in 0..200 {
            let mut mask = Array3::<u8>::zeros(SHAPE);
            let config = SamplerConfig::new(55).with_seed(Some(seed));
            let report = LoadSampler::new(&source, config)
                .unwrap()
                .run(mask.view_mut())
                .unwrap();

            assert!(report.reached, "seed {seed}: {report:?}");
            assert!((55..=105).contains(&report.current), "seed {seed}: {report:?}");
            assert!(report.accepted.iter().any(|a| a.bucket == 1));
            let largest = report.accepted.iter().map(|a| a.load).max().unwrap();
            assert!(report.current <= report.desired + largest);
            check_report(&report, &mask);
        }
    }

    #[test]
    fn test_same_seed_same_result() {
        let source = two_buckets();
        let run = |seed| {
            let mut mask = Array3::<u8>::zeros(SHAPE);
            let config = SamplerConfig::new(55).with_seed(Some(seed));
            let report = LoadSampler::new(&source, config)
                .unwrap()
                .run(mask.view_mut())
                .unwrap();
            (mask, report.accepted)
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn test_zero_load_is_reached_immediately() {
        let source = two_buckets();
        let mut mask = Array3::<u8>::zeros(SHAPE);
        let report = LoadSampler::new(&source, SamplerConfig::new(0).with_seed(Some(1)))
            .unwrap()
            .run(mask.view_mut())
            .unwrap();
        assert!(report.reached);
        assert_eq!((report.current, report.draws), (0, 0));
    }

    #[test]
    fn test_unreachable_load() {
        // 总容量 130 体素.
        let source = two_buckets();
        for draw in [DrawPolicy::WithReplacement, DrawPolicy::WithoutReplacement] {
            let mut mask = Array3::<u8>::zeros(SHAPE);
            let config = SamplerConfig::new(1000)
                .with_seed(Some(5))
                .with_draw_policy(draw);
            let report = LoadSampler::new(&source, config)
                .unwrap()
                .run(mask.view_mut())
                .unwrap();
            assert!(!report.reached);
            assert!(report.current <= 130);
            check_report(&report, &mask);
        }
    }

    #[test]
    fn test_without_replacement_never_redraws() {
        let source = two_buckets();
        let mut mask = Array3::<u8>::zeros(SHAPE);
        let config = SamplerConfig::new(1000)
            .with_seed(Some(9))
            .with_draw_policy(DrawPolicy::WithoutReplacement);
        let report = LoadSampler::new(&source, config)
            .unwrap()
            .run(mask.view_mut())
            .unwrap();
        // 所有模板互不重叠, 因此不会出现任何拒绝.
        assert_eq!(report.rejections.total(), 0);
        assert_eq!(report.draws, 5);
        assert_eq!(report.current, 130);
        assert_eq!(report.accepted.len(), 5);
    }

    #[test]
    fn test_missing_templates_are_rejections() {
        let mut source = two_buckets();
        source.templates[0][1] = None;
        source.templates[1][0] = None;
        let mut missing = 0;
        for seed in 0..50 {
            let mut mask = Array3::<u8>::zeros(SHAPE);
            let config = SamplerConfig::new(55).with_seed(Some(seed));
            let report = LoadSampler::new(&source, config)
                .unwrap()
                .run(mask.view_mut())
                .unwrap();
            missing += report.rejections.missing;
            assert!(report
                .accepted
                .iter()
                .all(|a| (a.bucket, a.index) != (0, 1) && (a.bucket, a.index) != (1, 0)));
            check_report(&report, &mask);
        }
        assert!(missing > 0);
    }

    #[test]
    fn test_fixed_exhaustion_and_draw_budget() {
        // 只有重叠模板: 第一个被接受后, 其余都被拒绝.
        let source = MemorySource::new(
            vec![SizeBucket::new("A", 3, None)],
            vec![vec![Some(block(0, 0..1)); 3]],
        );
        let mut mask = Array3::<u8>::zeros(SHAPE);
        let config = SamplerConfig::new(100)
            .with_seed(Some(3))
            .with_exhaustion(Exhaustion::Fixed(1));
        let report = LoadSampler::new(&source, config)
            .unwrap()
            .run(mask.view_mut())
            .unwrap();
        assert!(!report.reached);
        assert_eq!(report.current, 10);
        assert_eq!(report.rejections.overlap, 2);
        assert_eq!(report.draws, 3);

        let mut mask = Array3::<u8>::zeros(SHAPE);
        let config = SamplerConfig::new(100).with_seed(Some(3)).with_max_draws(1);
        let report = LoadSampler::new(&source, config)
            .unwrap()
            .run(mask.view_mut())
            .unwrap();
        assert_eq!(report.draws, 1);
        assert!(!report.reached);
    }

    #[test]
    fn test_oversized_bucket_is_never_drawn() {
        for seed in 0..20 {
            let source = many_small([Some(1.0), Some(50.0)]);
            let mut mask = Array3::<u8>::zeros(SHAPE);
            let config = SamplerConfig::new(40).with_seed(Some(seed));
            let report = LoadSampler::new(&source, config)
                .unwrap()
                .run(mask.view_mut())
                .unwrap();
            assert!(report.reached, "seed {seed}: {report:?}");
            assert_eq!(report.current, 40);
            assert_eq!(report.rejections.overshoot, 0);
            assert_eq!(source.loads[1].get(), 0);
            check_report(&report, &mask);
        }
    }

    #[test]
    fn test_repeated_overshoot_parks_bucket() {
        // 没有代表体积时, 只能靠推迟次数搁置 B.
        for seed in 0..20 {
            let source = many_small([None, None]);
            let mut mask = Array3::<u8>::zeros(SHAPE);
            let config = SamplerConfig::new(40).with_seed(Some(seed));
            let report = LoadSampler::new(&source, config)
                .unwrap()
                .run(mask.view_mut())
                .unwrap();
            assert!(report.reached, "seed {seed}: {report:?}");
            assert!(report.accepted.iter().all(|a| a.bucket == 0));
            assert!(source.loads[1].get() <= 3, "seed {seed}: {report:?}");
            assert_eq!(report.rejections.overshoot as usize, source.loads[1].get());
        }
    }

    #[test]
    fn test_parked_bucket_returns_when_smaller_ones_are_gone() {
        // A 只能提供 30 体素, B 在 A 耗尽后成为最小的可用 bucket.
        let source = two_buckets();
        for seed in 0..50 {
            let mut mask = Array3::<u8>::zeros(SHAPE);
            let config = SamplerConfig::new(55)
                .with_seed(Some(seed))
                .with_draw_policy(DrawPolicy::WithoutReplacement);
            let report = LoadSampler::new(&source, config)
                .unwrap()
                .run(mask.view_mut())
                .unwrap();
            assert!(report.reached, "seed {seed}: {report:?}");
            assert!(report.accepted.iter().any(|a| a.bucket == 1));
            check_report(&report, &mask);
        }
    }

    #[test]
    fn test_geometry_mismatch_is_fatal() {
        let source = two_buckets();
        let mut mask = Array3::<u8>::zeros((2, 2, 2));
        let err = LoadSampler::new(&source, SamplerConfig::new(10).with_seed(Some(0)))
            .unwrap()
            .run(mask.view_mut())
            .unwrap_err();
        assert!(matches!(err, SimError::GeometryMismatch { .. }));
    }

    #[test]
    fn test_millilitres_to_voxels() {
        assert_eq!(millilitres_to_voxels(1.0, 1.0).unwrap(), 1000);
        assert_eq!(millilitres_to_voxels(0.0105, 2.0).unwrap(), 6);
        assert!(millilitres_to_voxels(-1.0, 1.0).is_err());
        assert!(millilitres_to_voxels(1.0, 0.0).is_err());
    }

    #[test]
    fn test_generate_mask_uses_reference_geometry() {
        let source = two_buckets();
        let reference = MrLabel::fake(Array3::zeros(SHAPE), [1.0, 1.0, 1.0]);
        // 0.0625 mL = 62.5 mm^3, 向上取整为 63 体素
        let config = SamplerConfig::new(0).with_seed(Some(2));
        let (label, report) = generate_mask(&source, &reference, 0.0625, config).unwrap();
        assert_eq!(report.desired, 63);
        assert_eq!(label.shape(), SHAPE);
        assert_eq!(label.load(), report.current);
    }
}
