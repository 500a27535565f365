//! 成像模态及其病灶对比度分布.
//!
//! 每个模态对应一个 [`ModalityProfile`], 即病灶与正常组织强度之比的
//! 高斯分布参数 `(mean, std)`. `mean < 1` 表示低信号 (病灶更暗),
//! 否则为高信号.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::{SimError, SimResult};

/// 支持的成像模态.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Modality {
    /// T1 加权.
    T1,
    /// T2 加权.
    T2,
    /// T2-FLAIR.
    T2Flair,
    /// 质子密度加权.
    Pd,
    /// 弥散张量成像, 各向异性分数.
    DtiFa,
    /// 弥散张量成像, 表观弥散系数.
    DtiAdc,
}

impl Modality {
    /// 所有模态.
    pub const ALL: [Modality; 6] = [
        Self::T1,
        Self::T2,
        Self::T2Flair,
        Self::Pd,
        Self::DtiFa,
        Self::DtiAdc,
    ];

    /// 命令行和配置文件中使用的标签.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::T1 => "T1",
            Self::T2 => "T2",
            Self::T2Flair => "T2-FLAIR",
            Self::Pd => "PD",
            Self::DtiFa => "DTI-FA",
            Self::DtiAdc => "DTI-ADC",
        }
    }

    /// 默认对比度分布.
    pub const fn default_profile(self) -> ModalityProfile {
        let (mean, std) = match self {
            Self::T1 => (0.6, 0.1),
            Self::T2 => (1.7, 0.15),
            Self::T2Flair => (1.6, 0.15),
            Self::Pd => (1.4, 0.1),
            Self::DtiFa => (0.5, 0.1),
            Self::DtiAdc => (1.4, 0.1),
        };
        ModalityProfile { mean, std }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Modality {
    type Err = SimError;

    /// 大小写不敏感. `FLAIR`, `FA`, `ADC` 作为别名接受.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let m = match upper.as_str() {
            "T1" => Self::T1,
            "T2" => Self::T2,
            "T2-FLAIR" | "FLAIR" => Self::T2Flair,
            "PD" => Self::Pd,
            "DTI-FA" | "FA" => Self::DtiFa,
            "DTI-ADC" | "ADC" => Self::DtiAdc,
            _ => return Err(SimError::UnrecognizedModality(s.to_string())),
        };
        Ok(m)
    }
}

/// 对比度方向.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Contrast {
    /// 病灶比正常组织暗, 随时间向 1.0 增长.
    Hypo,
    /// 病灶比正常组织亮, 随时间向 1.0 衰减.
    Hyper,
}

impl Contrast {
    /// 扰动项的符号: 低信号为正, 高信号为负.
    #[inline]
    pub const fn sign(self) -> f64 {
        match self {
            Self::Hypo => 1.0,
            Self::Hyper => -1.0,
        }
    }

    /// 在 1.0 处截断: 低信号不超过 1.0, 高信号不低于 1.0.
    #[inline]
    pub fn clamp(self, v: f32) -> f32 {
        match self {
            Self::Hypo => v.min(1.0),
            Self::Hyper => v.max(1.0),
        }
    }
}

/// 病灶对比度的高斯分布参数.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct ModalityProfile {
    mean: f64,
    std: f64,
}

impl ModalityProfile {
    /// 以均值和标准差构建. `mean` 必须为正, `std` 必须非负, 且均为有限值.
    pub fn new(mean: f64, std: f64) -> SimResult<Self> {
        Self { mean, std }.validated()
    }

    fn validated(self) -> SimResult<Self> {
        if !(self.mean.is_finite() && self.mean > 0.0) {
            return Err(SimError::InvalidParameter(format!(
                "contrast mean must be positive, got {}",
                self.mean
            )));
        }
        if !(self.std.is_finite() && self.std >= 0.0) {
            return Err(SimError::InvalidParameter(format!(
                "contrast std must be non-negative, got {}",
                self.std
            )));
        }
        Ok(self)
    }

    /// 均值.
    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// 标准差.
    #[inline]
    pub fn std(&self) -> f64 {
        self.std
    }

    /// 对比度方向.
    #[inline]
    pub fn contrast(&self) -> Contrast {
        if self.mean < 1.0 {
            Contrast::Hypo
        } else {
            Contrast::Hyper
        }
    }
}

/// 模态到对比度分布的查找表. 默认包含所有模态的默认分布.
#[derive(Debug, Clone)]
pub struct ModalityTable {
    profiles: HashMap<Modality, ModalityProfile>,
}

impl Default for ModalityTable {
    fn default() -> Self {
        Self {
            profiles: Modality::ALL
                .into_iter()
                .map(|m| (m, m.default_profile()))
                .collect(),
        }
    }
}

impl ModalityTable {
    /// 获取 `modality` 的分布.
    pub fn profile(&self, modality: Modality) -> ModalityProfile {
        self.profiles
            .get(&modality)
            .copied()
            .unwrap_or_else(|| modality.default_profile())
    }

    /// 按标签查找. 标签无法识别时返回 [`SimError::UnrecognizedModality`].
    pub fn lookup(&self, tag: &str) -> SimResult<(Modality, ModalityProfile)> {
        let m: Modality = tag.parse()?;
        Ok((m, self.profile(m)))
    }

    /// 覆盖 `modality` 的分布.
    pub fn with(mut self, modality: Modality, profile: ModalityProfile) -> Self {
        self.profiles.insert(modality, profile);
        self
    }
}

#[cfg(feature = "serde")]
impl ModalityTable {
    /// 从 TOML 文本读取. 每个表名为模态标签, 包含 `mean` 与 `std`:
    ///
    /// ```toml
    /// [T1]
    /// mean = 0.55
    /// std = 0.08
    /// ```
    ///
    /// 未出现的模态保留默认值.
    pub fn from_toml_str(text: &str) -> SimResult<Self> {
        let raw: HashMap<String, ModalityProfile> = toml::from_str(text)?;
        raw.into_iter().try_fold(Self::default(), |table, (tag, p)| -> SimResult<Self> {
            let m: Modality = tag.parse()?;
            Ok(table.with(m, p.validated()?))
        })
    }

    /// 从 TOML 文件读取.
    pub fn from_path<P: AsRef<std::path::Path>>(path: P) -> SimResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        for m in Modality::ALL {
            assert_eq!(m.tag().parse::<Modality>().unwrap(), m);
            assert_eq!(m.to_string(), m.tag());
        }
        assert_eq!("flair".parse::<Modality>().unwrap(), Modality::T2Flair);
        let err = "T3".parse::<Modality>().unwrap_err();
        assert!(matches!(err, SimError::UnrecognizedModality(ref t) if t == "T3"));
    }

    #[test]
    fn test_contrast_direction() {
        let table = ModalityTable::default();
        assert_eq!(table.profile(Modality::T1).contrast(), Contrast::Hypo);
        assert_eq!(table.profile(Modality::DtiFa).contrast(), Contrast::Hypo);
        for m in [Modality::T2, Modality::T2Flair, Modality::Pd, Modality::DtiAdc] {
            assert_eq!(table.profile(m).contrast(), Contrast::Hyper);
        }
        assert_eq!(Contrast::Hypo.clamp(1.3), 1.0);
        assert_eq!(Contrast::Hypo.clamp(0.7), 0.7);
        assert_eq!(Contrast::Hyper.clamp(0.7), 1.0);
        assert_eq!(Contrast::Hyper.sign(), -1.0);
    }

    #[test]
    fn test_profile_validation() {
        assert!(ModalityProfile::new(0.6, 0.1).is_ok());
        assert!(ModalityProfile::new(0.0, 0.1).is_err());
        assert!(ModalityProfile::new(1.2, -0.1).is_err());
        assert!(ModalityProfile::new(f64::NAN, 0.1).is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_table_from_toml() {
        let table = ModalityTable::from_toml_str(
            r#"
            [T1]
            mean = 0.5
            std = 0.05

            ["T2-FLAIR"]
            mean = 1.9
            std = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(table.profile(Modality::T1), ModalityProfile::new(0.5, 0.05).unwrap());
        assert_eq!(table.profile(Modality::T2Flair).mean(), 1.9);
        assert_eq!(table.profile(Modality::Pd), Modality::Pd.default_profile());

        let err = ModalityTable::from_toml_str("[T9]\nmean = 1.0\nstd = 0.1\n").unwrap_err();
        assert!(matches!(err, SimError::UnrecognizedModality(_)));
        assert!(ModalityTable::from_toml_str("[T1]\nmean = 1.0\n").is_err());
    }
}
