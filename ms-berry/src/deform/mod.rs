//! 单时间点病灶强度形变.
//!
//! 形变场的构建步骤:
//!
//! 1. 从模态对比度分布中逐体素独立采样;
//! 2. 以 `homogeneity` 平滑, 引入局部空间相关性;
//! 3. 病灶外置为 1.0 (不改变强度);
//! 4. 以 `sigma` 平滑, 柔化病灶边界;
//! 5. 与输入体数据逐体素相乘.

use ndarray::{Array3, ArrayView3};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::Open01;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::consts::NEUTRAL;
use crate::filter::{restrict_to_mask, smooth};
use crate::modality::ModalityProfile;
use crate::{random, Idx3d, MrLabel, MrVolume, NiftiHeaderAttr, SimError, SimResult, VoxelKind};

/// 输出内容.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum FieldOutput {
    /// 形变后的体数据, 体素类型与输入一致.
    #[default]
    Composited,
    /// 形变场本身 (`f32`), 用于诊断.
    DeformationMap,
}

/// 逐体素独立采样 `N(mean, std^2)`: 在 (0, 1) 上均匀采样后取逆 CDF.
///
/// `std == 0` 时所有体素都等于 `mean`.
pub fn random_field<R: Rng + ?Sized>(
    shape: Idx3d,
    profile: &ModalityProfile,
    rng: &mut R,
) -> Array3<f32> {
    let normal = match Normal::new(profile.mean(), profile.std()) {
        Ok(n) if profile.std() > 0.0 => n,
        _ => return Array3::from_elem(shape, profile.mean() as f32),
    };
    Array3::from_shape_simple_fn(shape, || {
        let u: f64 = rng.sample(Open01);
        normal.inverse_cdf(u) as f32
    })
}

fn check_radius(name: &str, v: f64) -> SimResult<()> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidParameter(format!(
            "{name} must be a non-negative length in millimetres, got {v}"
        )))
    }
}

/// 检查两个体数据形状一致.
pub(crate) fn check_geometry<A: NiftiHeaderAttr, B: NiftiHeaderAttr>(
    a: &A,
    b: &B,
) -> SimResult<()> {
    if a.same_shape(b) {
        Ok(())
    } else {
        Err(SimError::GeometryMismatch {
            expected: a.shape(),
            found: b.shape(),
        })
    }
}

/// 以 `reference` 的几何信息包装输出. 形变场总以 `f32` 保存.
pub(crate) fn wrap_output(
    reference: &MrVolume,
    data: Array3<f32>,
    output: FieldOutput,
) -> SimResult<MrVolume> {
    let kind = match output {
        FieldOutput::Composited => reference.kind(),
        FieldOutput::DeformationMap => VoxelKind::F32,
    };
    MrVolume::derived(reference, kind, data)
}

/// 单时间点强度形变模型.
pub struct DeformationModel {
    profile: ModalityProfile,
    homogeneity: f64,
    sigma: f64,
    rng: StdRng,
    seed: u64,
}

impl DeformationModel {
    /// 构建模型. `homogeneity` 与 `sigma` 为高斯平滑的标准差 (毫米), 必须非负.
    pub fn new(
        profile: ModalityProfile,
        homogeneity: f64,
        sigma: f64,
        seed: Option<u64>,
    ) -> SimResult<Self> {
        check_radius("homogeneity", homogeneity)?;
        check_radius("sigma", sigma)?;
        let (rng, seed) = random::seeded(seed);
        Ok(Self {
            profile,
            homogeneity,
            sigma,
            rng,
            seed,
        })
    }

    /// 实际使用的随机种子.
    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// 步骤 1-2: 平滑后的随机场.
    pub fn base_field(&mut self, shape: Idx3d, spacing: [f64; 3]) -> Array3<f32> {
        let raw = random_field(shape, &self.profile, &mut self.rng);
        smooth(raw.view(), self.homogeneity, spacing)
    }

    /// 步骤 1-4: 限制在病灶内并柔化边界的形变场.
    pub fn lesion_field(&mut self, mask: ArrayView3<u8>, spacing: [f64; 3]) -> Array3<f32> {
        let mut field = self.base_field(mask.dim(), spacing);
        restrict_to_mask(field.view_mut(), mask, NEUTRAL);
        smooth(field.view(), self.sigma, spacing)
    }

    /// 对 `input` 施加形变. `lesions` 的非零体素为病灶.
    pub fn simulate(
        &mut self,
        input: &MrVolume,
        lesions: &MrLabel,
        output: FieldOutput,
    ) -> SimResult<MrVolume> {
        check_geometry(input, lesions)?;
        log::info!(
            "lesion contrast ~ N({}, {}^2), homogeneity {} mm, sigma {} mm, seed {}",
            self.profile.mean(),
            self.profile.std(),
            self.homogeneity,
            self.sigma,
            self.seed
        );
        let mut field = self.lesion_field(lesions.data(), input.pix_dim());
        if output == FieldOutput::Composited {
            field *= &input.data();
        }
        wrap_output(input, field, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::mean_and_variance;

    fn scene() -> (MrVolume, MrLabel) {
        let input = Array3::from_shape_fn((6, 8, 8), |(z, h, w)| (10 + z + h + w) as f32);
        let mut mask = Array3::<u8>::zeros((6, 8, 8));
        for z in 2..4 {
            for h in 3..6 {
                for w in 3..6 {
                    mask[(z, h, w)] = 1;
                }
            }
        }
        (
            MrVolume::fake(input, [1.0; 3]),
            MrLabel::fake(mask, [1.0; 3]),
        )
    }

    #[test]
    fn test_random_field_statistics() {
        let profile = ModalityProfile::new(0.6, 0.1).unwrap();
        let (mut rng, _) = random::seeded(Some(1));
        let field = random_field((20, 20, 20), &profile, &mut rng);
        let all = Array3::<u8>::ones(field.raw_dim());
        let (mean, var) = mean_and_variance(field.view(), all.view(), 1).unwrap();
        assert!((mean - 0.6).abs() < 0.01, "{mean}");
        assert!((var.sqrt() - 0.1).abs() < 0.01, "{var}");

        let flat = ModalityProfile::new(1.5, 0.0).unwrap();
        let field = random_field((2, 2, 2), &flat, &mut rng);
        assert!(field.iter().all(|&v| v == 1.5));
    }

    #[test]
    fn test_outside_mask_is_unchanged() {
        let (input, lesions) = scene();
        let profile = ModalityProfile::new(0.6, 0.1).unwrap();
        let mut model = DeformationModel::new(profile, 1.0, 0.0, Some(3)).unwrap();
        let out = model
            .simulate(&input, &lesions, FieldOutput::Composited)
            .unwrap();

        assert_eq!(out.kind(), input.kind());
        for ((pos, &v), &p) in out.data().indexed_iter().zip(lesions.data().iter()) {
            if p == 0 {
                assert_eq!(v, input[pos]);
            } else {
                // 低信号: 病灶被压暗.
                assert!(v < input[pos], "{pos:?}");
            }
        }
    }

    #[test]
    fn test_deformation_map() {
        let (input, lesions) = scene();
        let profile = ModalityProfile::new(1.6, 0.15).unwrap();
        let mut model = DeformationModel::new(profile, 0.0, 0.0, Some(4)).unwrap();
        let map = model
            .simulate(&input, &lesions, FieldOutput::DeformationMap)
            .unwrap();
        assert_eq!(map.kind(), VoxelKind::F32);
        for (&v, &p) in map.data().iter().zip(lesions.data().iter()) {
            if p == 0 {
                assert_eq!(v, NEUTRAL);
            } else {
                assert!(v > 0.0);
            }
        }
    }

    #[test]
    fn test_smoothing_blurs_lesion_border() {
        let (input, lesions) = scene();
        let profile = ModalityProfile::new(0.6, 0.0).unwrap();
        let mut model = DeformationModel::new(profile, 0.0, 1.0, Some(5)).unwrap();
        let map = model
            .simulate(&input, &lesions, FieldOutput::DeformationMap)
            .unwrap();
        // 紧邻病灶的背景体素被拉低, 远离病灶的背景体素几乎不变.
        assert!(map[(2, 2, 4)] < 0.99);
        assert!((map[(5, 0, 0)] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_same_seed_same_field() {
        let (input, lesions) = scene();
        let profile = ModalityProfile::new(0.6, 0.1).unwrap();
        let run = || {
            DeformationModel::new(profile, 1.0, 0.5, Some(9))
                .unwrap()
                .simulate(&input, &lesions, FieldOutput::Composited)
                .unwrap()
                .into_data()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_invalid_parameters() {
        let profile = ModalityProfile::new(0.6, 0.1).unwrap();
        assert!(DeformationModel::new(profile, -1.0, 0.0, None).is_err());
        assert!(DeformationModel::new(profile, 0.0, f64::NAN, None).is_err());

        let (input, _) = scene();
        let other = MrLabel::fake(Array3::zeros((2, 2, 2)), [1.0; 3]);
        let mut model = DeformationModel::new(profile, 0.0, 0.0, None).unwrap();
        let err = model
            .simulate(&input, &other, FieldOutput::Composited)
            .unwrap_err();
        assert!(matches!(err, SimError::GeometryMismatch { .. }));
    }
}
