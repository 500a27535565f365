//! 模拟器依赖的通用组件.

use std::io;

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 简单分隔线.
#[inline]
pub fn sep_to<W: io::Write>(mut w: W) -> io::Result<()> {
    writeln!(&mut w, "{SEP}")
}

/// 以 mL 为单位显示体素个数对应的体积.
#[inline]
pub fn voxels_to_ml(voxels: usize, voxel_mm3: f64) -> f64 {
    voxels as f64 * voxel_mm3 / ms_berry::consts::ML_TO_MM3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sep_to() {
        let mut buf = vec![];
        sep_to(&mut buf).unwrap();
        assert_eq!(std::str::from_utf8(&buf).unwrap(), format!("{SEP}\n"));
    }

    #[test]
    fn test_voxels_to_ml() {
        assert!((voxels_to_ml(2000, 0.5) - 1.0).abs() < 1e-12);
    }
}
