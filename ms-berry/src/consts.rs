//! 通用常量.

/// 标签取值.
pub mod label {
    /// 背景体素值.
    pub const BACKGROUND: u8 = 0;

    /// 二值病灶标签中, 病灶体素值.
    pub const LESION: u8 = 1;

    /// 体素是否属于病灶 (任意非零标签)?
    #[inline]
    pub const fn is_lesion(p: u8) -> bool {
        p != BACKGROUND
    }
}

/// 1 mL 对应的立方毫米数.
pub const ML_TO_MM3: f64 = 1000.0;

/// 形变场中 "不改变强度" 的乘性中性值.
pub const NEUTRAL: f32 = 1.0;

/// 漂移项到达平台值 (1.0) 所需的默认时间点个数.
pub const DEFAULT_PLATEAU_TIME_POINTS: f64 = 6.0;

/// 高斯核截断半径 (以 sigma 为单位).
pub const GAUSSIAN_TRUNCATE: f64 = 3.0;

/// 病灶模板文件扩展名.
pub const TEMPLATE_EXT: &str = "nii.gz";

/// 模板库根目录下可选的 bucket 配置文件名.
pub const CATALOG_CONFIG: &str = "catalog.toml";

/// 默认病灶模板库: bucket 名称 (同时也是子目录名), 模板个数, 代表体积 (体素).
///
/// 体积区间的上界被用作代表体积.
pub const DEFAULT_BUCKETS: [(&str, u32, f64); 5] = [
    ("50-100", 950, 100.0),
    ("100-500", 944, 500.0),
    ("500-1000", 138, 1000.0),
    ("1000-5000", 117, 5000.0),
    ("5000-more", 75, 15000.0),
];
