//! 运行结果.

use ms_berry::catalog::SizeBucket;
use ms_berry::filter::FilterSummary;
use ms_berry::longitudinal::{LesionTrend, TimePoint};
use ms_berry::sampler::SampleReport;
use std::io::{self, Write};

const S4: &str = "    ";

/// 将采样结果写进 `w` 中.
pub fn describe_sample<W: Write>(
    r: &SampleReport,
    buckets: &[SizeBucket],
    voxel_mm3: f64,
    w: &mut W,
) -> io::Result<()> {
    let ml = |v: usize| utils::voxels_to_ml(v, voxel_mm3);

    writeln!(w, "Lesion placement (seed {}):", r.seed)?;
    writeln!(
        w,
        "{S4}Desired load: {} voxels ({:.3} mL)",
        r.desired,
        ml(r.desired)
    )?;
    writeln!(
        w,
        "{S4}Final load: {} voxels ({:.3} mL){}",
        r.current,
        ml(r.current),
        if r.reached { "" } else { ", target unreachable" }
    )?;
    writeln!(w, "{S4}Accepted templates: {}", r.accepted.len())?;
    for (b, bucket) in buckets.iter().enumerate() {
        let n = r.accepted.iter().filter(|a| a.bucket == b).count();
        if n > 0 {
            writeln!(w, "{S4}{S4}{}: {n}", bucket.name)?;
        }
    }
    writeln!(w, "{S4}Draws: {}", r.draws)?;
    let t = &r.rejections;
    write!(
        w,
        "{S4}Rejections: {} missing, {} empty, {} overlapping, {} deferred",
        t.missing, t.empty, t.overlap, t.overshoot
    )?;
    Ok(())
}

/// 将强度过滤结果写进 `w` 中.
pub fn describe_filter<W: Write>(s: &FilterSummary, cut_factor: f64, w: &mut W) -> io::Result<()> {
    let (lo, hi) = s.bounds(cut_factor);
    writeln!(w, "Lesion intensity filter:")?;
    writeln!(w, "{S4}Mean: {:.6}, std: {:.6}", s.mean, s.std)?;
    writeln!(w, "{S4}Kept interval: ({lo:.6}, {hi:.6})")?;
    write!(
        w,
        "{S4}Kept {} of {} voxels ({:.2}%)",
        s.kept,
        s.initial,
        s.kept_ratio() * 100.0
    )?;
    Ok(())
}

/// 将单个时间点的 DC level 写进 `w` 中.
pub fn describe_time_point<W: Write>(tp: &TimePoint, w: &mut W) -> io::Result<()> {
    write!(
        w,
        "Time point {}: {} changing, {} stable",
        tp.index,
        tp.changing(),
        tp.levels.len() - tp.changing()
    )?;
    for l in tp.levels.iter() {
        let trend = match l.trend {
            LesionTrend::Changing => "changing",
            LesionTrend::Stable => "stable",
        };
        write!(w, "\n{S4}lesion {:>4} {trend:<8} DC {:+.4}", l.rank, l.dc)?;
    }
    Ok(())
}

/// 打印 `describe` 写出的内容, 并以分隔线结束.
pub fn print_with<F>(describe: F)
where
    F: FnOnce(&mut Vec<u8>) -> io::Result<()>,
{
    let mut buf = Vec::with_capacity(512);
    match describe(&mut buf) {
        Ok(()) => println!("{}", String::from_utf8_lossy(&buf)),
        Err(e) => log::warn!("failed to format report: {e}"),
    }
    utils::sep();
}
