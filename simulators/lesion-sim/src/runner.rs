//! 程序运行函数. 每个子命令对应一个函数.

use anyhow::{bail, Context, Result};
use ms_berry::filter::filter_mask;
use ms_berry::longitudinal::write_follow_ups;
use ms_berry::prelude::*;
use utils::loader;

use crate::cli::{
    Command, ContrastArgs, DeformArgs, FilterMaskArgs, GenerateMaskArgs, LongitudinalArgs,
};
use crate::report;

/// 实际运行.
pub fn run(command: Command) -> Result<()> {
    match command {
        Command::GenerateMask(args) => generate_mask_cmd(args),
        Command::FilterMask(args) => filter_mask_cmd(args),
        Command::Deform(args) => deform_cmd(args),
        Command::Longitudinal(args) => longitudinal_cmd(args),
    }
}

fn generate_mask_cmd(args: GenerateMaskArgs) -> Result<()> {
    let reference = MrVolume::open(&args.reference)
        .with_context(|| format!("reading reference volume {}", args.reference.display()))?;
    let catalog = loader::catalog_from(args.database.as_ref())
        .context("opening lesion template database")?;
    if !catalog.root().is_dir() {
        bail!(
            "lesion template database {} is not a directory",
            catalog.root().display()
        );
    }

    let mut config = SamplerConfig::new(0).with_seed(args.seed);
    if args.without_replacement {
        config = config.with_draw_policy(DrawPolicy::WithoutReplacement);
    }
    if let Some(n) = args.exhaustion_threshold {
        config = config.with_exhaustion(Exhaustion::Fixed(n));
    }

    let (label, sample) = generate_mask(&catalog, &reference, args.lesion_load, config)?;
    label
        .save(&args.output)
        .with_context(|| format!("writing lesion mask {}", args.output.display()))?;
    log::info!("lesion mask written to {}", args.output.display());

    report::print_with(|w| {
        report::describe_sample(&sample, catalog.buckets(), reference.voxel(), w)
    });
    Ok(())
}

fn filter_mask_cmd(args: FilterMaskArgs) -> Result<()> {
    let image = MrVolume::open(&args.input)
        .with_context(|| format!("reading intensity volume {}", args.input.display()))?;
    let mask = MrLabel::open(&args.mask)
        .with_context(|| format!("reading lesion mask {}", args.mask.display()))?;
    if !image.same_shape(&mask) {
        return Err(SimError::GeometryMismatch {
            expected: image.shape(),
            found: mask.shape(),
        }
        .into());
    }

    let (kept, summary) = filter_mask(image.data(), mask.data(), args.cut_factor);
    if summary.initial == 0 {
        log::warn!("lesion mask {} is empty", args.mask.display());
    }
    MrLabel::derived(&mask, kept)?
        .save(&args.output)
        .with_context(|| format!("writing lesion mask {}", args.output.display()))?;

    report::print_with(|w| report::describe_filter(&summary, args.cut_factor, w));
    Ok(())
}

/// 读取输入体数据, 病灶标签和对比度分布.
fn load_contrast(args: &ContrastArgs) -> Result<(MrVolume, MrLabel, ModalityProfile)> {
    let input = MrVolume::open(&args.input)
        .with_context(|| format!("reading intensity volume {}", args.input.display()))?;
    let lesions = MrLabel::open(&args.lesion_label)
        .with_context(|| format!("reading lesion label {}", args.lesion_label.display()))?;
    let table = match &args.profiles {
        Some(p) => ModalityTable::from_path(p)
            .with_context(|| format!("reading contrast profiles {}", p.display()))?,
        None => ModalityTable::default(),
    };
    let profile = table.profile(args.modality);
    log::info!(
        "{} lesion contrast: mean {}, std {}",
        args.modality,
        profile.mean(),
        profile.std()
    );
    Ok((input, lesions, profile))
}

#[inline]
fn field_output(debug: bool) -> FieldOutput {
    if debug {
        FieldOutput::DeformationMap
    } else {
        FieldOutput::Composited
    }
}

fn deform_cmd(args: DeformArgs) -> Result<()> {
    let c = &args.contrast;
    let (input, lesions, profile) = load_contrast(c)?;
    let mut model = DeformationModel::new(profile, c.homogeneity, c.sigma, c.seed)?;
    let out = model.simulate(&input, &lesions, field_output(c.deformation_map))?;
    out.save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    log::info!("output written to {}", args.output.display());
    Ok(())
}

fn longitudinal_cmd(args: LongitudinalArgs) -> Result<()> {
    let c = &args.contrast;
    let (input, lesions, profile) = load_contrast(c)?;
    let params = LongitudinalParams {
        follow_ups: args.follow_ups,
        balance: args.balance,
        variability: args.variability,
        homogeneity: c.homogeneity,
        sigma: c.sigma,
        plateau: args.plateau,
        seed: c.seed,
    };
    let engine = LongitudinalEngine::new(&lesions, profile, params)?;
    let paths = write_follow_ups(
        engine,
        &input,
        c.modality,
        field_output(c.deformation_map),
        &args.output_folder,
        |tp, _| report::print_with(|w| report::describe_time_point(tp, w)),
    )
    .with_context(|| format!("writing follow-ups to {}", args.output_folder.display()))?;
    log::info!(
        "{} time points written to {}",
        paths.len(),
        args.output_folder.display()
    );
    Ok(())
}
