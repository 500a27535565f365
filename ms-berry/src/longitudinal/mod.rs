//! 纵向随访模拟.
//!
//! 在单时间点形变的基础上, 为每个连通病灶维护一个随时间点变化的 DC level:
//!
//! - "变化" 病灶: `DC = drift(t) + fluctuation`, 其中 `drift(t)` 随时间线性增长,
//!   在 `plateau` 个时间点后使平均对比度到达 1.0; 结果在 1.0 处截断.
//!   低信号模态的 `DC` 不超过 1.0.
//! - "稳定" 病灶: `DC` 为落在 `±variability * std` 之内的标准正态样本, 不截断.
//!
//! 每个时间点按体积从小到大处理病灶, 前 `round(n * balance)` 个为 "变化" 病灶.
//! 随机场在所有时间点之间共享, 只生成一次.

use std::path::{Path, PathBuf};

use ndarray::{Array3, ArrayView3};
use rand::rngs::StdRng;

use crate::consts::{DEFAULT_PLATEAU_TIME_POINTS, NEUTRAL, TEMPLATE_EXT};
use crate::deform::{random_field, wrap_output, FieldOutput};
use crate::filter::{label_components, restrict_to_mask, smooth};
use crate::modality::{Contrast, Modality, ModalityProfile};
use crate::sampler::{compose, WritePolicy};
use crate::{random, Idx3d, MrLabel, MrVolume, NiftiHeaderAttr, SimError, SimResult};

/// 纵向模拟参数.
#[derive(Debug, Clone, PartialEq)]
pub struct LongitudinalParams {
    /// 随访次数 (时间点个数).
    pub follow_ups: usize,
    /// "变化" 病灶所占比例, `[0, 1]`.
    pub balance: f64,
    /// 随机扰动幅度, 以对比度标准差为单位.
    pub variability: f64,
    /// 随机场平滑的标准差 (毫米).
    pub homogeneity: f64,
    /// 病灶边界平滑的标准差 (毫米).
    pub sigma: f64,
    /// 漂移到达平台值所需的时间点个数.
    pub plateau: f64,
    /// 随机种子.
    pub seed: Option<u64>,
}

impl Default for LongitudinalParams {
    fn default() -> Self {
        Self {
            follow_ups: 3,
            balance: 0.5,
            variability: 1.0,
            homogeneity: 1.0,
            sigma: 0.5,
            plateau: DEFAULT_PLATEAU_TIME_POINTS,
            seed: None,
        }
    }
}

impl LongitudinalParams {
    /// 检查参数取值.
    pub fn validate(&self) -> SimResult<()> {
        let invalid = |msg: String| Err(SimError::InvalidParameter(msg));
        if !(0.0..=1.0).contains(&self.balance) {
            return invalid(format!("balance must lie in [0, 1], got {}", self.balance));
        }
        if !(self.variability.is_finite() && self.variability >= 0.0) {
            return invalid(format!(
                "variability must be non-negative, got {}",
                self.variability
            ));
        }
        for (name, v) in [("homogeneity", self.homogeneity), ("sigma", self.sigma)] {
            if !(v.is_finite() && v >= 0.0) {
                return invalid(format!("{name} must be non-negative, got {v}"));
            }
        }
        if !(self.plateau.is_finite() && self.plateau > 0.0) {
            return invalid(format!("plateau must be positive, got {}", self.plateau));
        }
        Ok(())
    }
}

/// 每个时间点中 "变化" 病灶的个数.
#[inline]
pub fn changing_quota(lesions: usize, balance: f64) -> usize {
    (lesions as f64 * balance).round() as usize
}

/// 第 `t` 个时间点的线性漂移项. 低信号模态为正, 高信号模态为负,
/// 在 `t = plateau` 时恰好把平均对比度拉到 1.0.
#[inline]
pub fn drift_rate(profile: &ModalityProfile, plateau: f64, t: usize) -> f64 {
    (1.0 - profile.mean()) / plateau * t as f64
}

/// 一个连通病灶.
#[derive(Debug, Clone)]
pub struct LesionComponent {
    /// 体积排名, 1 为最大.
    pub rank: usize,
    /// 病灶体素.
    pub region: Vec<Idx3d>,
}

/// 病灶在某个时间点的趋势.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LesionTrend {
    /// 对比度随时间漂移.
    Changing,
    /// 只有随机扰动.
    Stable,
}

/// 病灶在某个时间点的 DC level.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LesionLevel {
    /// 体积排名.
    pub rank: usize,
    /// 趋势.
    pub trend: LesionTrend,
    /// 随机扰动项.
    pub fluctuation: f64,
    /// DC level.
    pub dc: f64,
}

/// 一个时间点的模拟结果.
#[derive(Debug, Clone)]
pub struct TimePoint {
    /// 时间点, 从 1 开始.
    pub index: usize,
    /// 该时间点的对比度形变场.
    pub field: Array3<f32>,
    /// 各病灶的 DC level, 按处理顺序 (体积从小到大) 排列.
    pub levels: Vec<LesionLevel>,
}

impl TimePoint {
    /// 形变后的体数据或形变场本身.
    ///
    /// `input` 的形状与形变场不一致时返回 [`SimError::GeometryMismatch`].
    pub fn render(&self, input: &MrVolume, output: FieldOutput) -> SimResult<MrVolume> {
        if input.shape() != self.field.dim() {
            return Err(SimError::GeometryMismatch {
                expected: self.field.dim(),
                found: input.shape(),
            });
        }
        let mut data = self.field.clone();
        if output == FieldOutput::Composited {
            data *= &input.data();
        }
        wrap_output(input, data, output)
    }

    /// "变化" 病灶个数.
    pub fn changing(&self) -> usize {
        self.levels
            .iter()
            .filter(|l| l.trend == LesionTrend::Changing)
            .count()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Phase {
    Init,
    PerTimePoint(usize),
    Done,
}

/// 纵向随访模拟器. 每次迭代产生一个时间点.
pub struct LongitudinalEngine<'a> {
    mask: ArrayView3<'a, u8>,
    spacing: [f64; 3],
    profile: ModalityProfile,
    params: LongitudinalParams,
    rng: StdRng,
    seed: u64,
    phase: Phase,
    field: Array3<f32>,
    components: Vec<LesionComponent>,
}

impl<'a> LongitudinalEngine<'a> {
    /// 以病灶标签 `lesions` 构建模拟器.
    pub fn new(
        lesions: &'a MrLabel,
        profile: ModalityProfile,
        params: LongitudinalParams,
    ) -> SimResult<Self> {
        params.validate()?;
        let (rng, seed) = random::seeded(params.seed);
        Ok(Self {
            mask: lesions.data(),
            spacing: lesions.pix_dim(),
            profile,
            params,
            rng,
            seed,
            phase: Phase::Init,
            field: Array3::zeros((0, 0, 0)),
            components: vec![],
        })
    }

    /// 实际使用的随机种子.
    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// 连通病灶, 按体积降序排列. 首次迭代之前为空.
    #[inline]
    pub fn components(&self) -> &[LesionComponent] {
        &self.components
    }

    fn initialise(&mut self) {
        let raw = random_field(self.mask.dim(), &self.profile, &mut self.rng);
        self.field = smooth(raw.view(), self.params.homogeneity, self.spacing);
        self.components = label_components(self.mask)
            .into_regions()
            .into_iter()
            .enumerate()
            .map(|(k, region)| LesionComponent { rank: k + 1, region })
            .collect();
        log::info!(
            "{} lesions, {} changing per time point, seed {}",
            self.components.len(),
            changing_quota(self.components.len(), self.params.balance),
            self.seed
        );
    }

    fn time_point(&mut self, t: usize) -> TimePoint {
        let contrast = self.profile.contrast();
        let bound = self.params.variability * self.profile.std();
        let drift = drift_rate(&self.profile, self.params.plateau, t);
        let mut quota = changing_quota(self.components.len(), self.params.balance);
        let mut acc = Array3::<f32>::zeros(self.mask.dim());
        let mut levels = Vec::with_capacity(self.components.len());

        // 体积从小到大
        for c in self.components.iter().rev() {
            let level = if quota > 0 {
                quota -= 1;
                let magnitude = match contrast {
                    // DC = drift + |z| * bound <= 1.0
                    Contrast::Hypo if bound > 0.0 => {
                        random::bounded_normal_variate(&mut self.rng, (1.0 - drift) / bound).abs()
                    }
                    _ => random::normal_variate(&mut self.rng).abs(),
                };
                let fluctuation = contrast.sign() * magnitude * bound;
                LesionLevel {
                    rank: c.rank,
                    trend: LesionTrend::Changing,
                    fluctuation,
                    dc: drift + fluctuation,
                }
            } else {
                let dc = random::bounded_normal_variate(&mut self.rng, bound);
                LesionLevel {
                    rank: c.rank,
                    trend: LesionTrend::Stable,
                    fluctuation: dc,
                    dc,
                }
            };
            let dc = level.dc as f32;
            let field = &self.field;
            let values = c.region.iter().map(|&pos| {
                let v = field[pos] + dc;
                match level.trend {
                    LesionTrend::Changing => (pos, contrast.clamp(v)),
                    LesionTrend::Stable => (pos, v),
                }
            });
            compose(acc.view_mut(), values, WritePolicy::Overwrite);
            log::debug!(
                "time point {t}: lesion {} ({:?}) DC level {:.4}",
                c.rank,
                level.trend,
                level.dc
            );
            levels.push(level);
        }

        restrict_to_mask(acc.view_mut(), self.mask, NEUTRAL);
        TimePoint {
            index: t,
            field: smooth(acc.view(), self.params.sigma, self.spacing),
            levels,
        }
    }
}

impl Iterator for LongitudinalEngine<'_> {
    type Item = TimePoint;

    fn next(&mut self) -> Option<Self::Item> {
        match self.phase {
            Phase::Init => {
                self.initialise();
                self.phase = Phase::PerTimePoint(1);
                self.next()
            }
            Phase::PerTimePoint(t) if t <= self.params.follow_ups => {
                let tp = self.time_point(t);
                self.phase = Phase::PerTimePoint(t + 1);
                Some(tp)
            }
            Phase::PerTimePoint(_) | Phase::Done => {
                self.phase = Phase::Done;
                None
            }
        }
    }
}

/// 第 `t` 个时间点的输出文件名.
pub fn output_name(modality: Modality, t: usize, output: FieldOutput) -> String {
    match output {
        FieldOutput::Composited => format!("vol{}_TimePoint_{t}.{TEMPLATE_EXT}", modality.tag()),
        FieldOutput::DeformationMap => {
            format!("vol{}_TimePoint_{t}_lesionContrast.{TEMPLATE_EXT}", modality.tag())
        }
    }
}

/// 运行 `engine` 的全部时间点, 依次写入 `folder`. 返回写出的文件路径.
///
/// 每写出一个时间点, 调用一次 `on_written`.
pub fn write_follow_ups<P, F>(
    engine: LongitudinalEngine<'_>,
    input: &MrVolume,
    modality: Modality,
    output: FieldOutput,
    folder: P,
    mut on_written: F,
) -> SimResult<Vec<PathBuf>>
where
    P: AsRef<Path>,
    F: FnMut(&TimePoint, &Path),
{
    if input.shape() != engine.mask.dim() {
        return Err(SimError::GeometryMismatch {
            expected: input.shape(),
            found: engine.mask.dim(),
        });
    }
    let folder = folder.as_ref();
    std::fs::create_dir_all(folder)?;

    engine
        .map(|tp| {
            let path = folder.join(output_name(modality, tp.index, output));
            tp.render(input, output)?.save(&path)?;
            log::info!("time point {} written to {}", tp.index, path.display());
            on_written(&tp, &path);
            Ok(path)
        })
        .collect()
}
