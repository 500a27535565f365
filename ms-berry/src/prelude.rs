//! 常用类型的集中导出.

pub use crate::catalog::{LesionCatalog, LesionTemplate, SizeBucket, TemplateSource};
pub use crate::deform::{DeformationModel, FieldOutput};
pub use crate::longitudinal::{LongitudinalEngine, LongitudinalParams, TimePoint};
pub use crate::modality::{Contrast, Modality, ModalityProfile, ModalityTable};
pub use crate::sampler::{
    generate_mask, DrawPolicy, Exhaustion, LoadSampler, SampleReport, SamplerConfig,
};
pub use crate::{Idx3d, MrLabel, MrVolume, NiftiHeaderAttr, SimError, SimResult, VoxelKind};
