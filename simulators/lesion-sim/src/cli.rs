//! 命令行参数.

use clap::{Args, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

use ms_berry::modality::Modality;

/// 多发性硬化病灶合成与纵向随访模拟.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 在参考体数据上随机放置病灶模板, 生成合成病灶标签
    GenerateMask(GenerateMaskArgs),

    /// 只保留强度落在 mean ± k·std 之内的病灶体素
    FilterMask(FilterMaskArgs),

    /// 在病灶区域施加单时间点强度形变
    Deform(DeformArgs),

    /// 模拟多个随访时间点的病灶对比度演化
    Longitudinal(LongitudinalArgs),
}

#[derive(Args, Debug)]
pub struct GenerateMaskArgs {
    /// 参考体数据, 决定输出标签的几何信息
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub reference: PathBuf,

    /// 目标病灶负载 (mL)
    #[arg(long)]
    pub lesion_load: f64,

    /// 病灶模板库根目录. 缺省时使用 $HOME/dataset/lesion-db
    #[arg(long, env = "MS_LESION_DB_DIR", value_hint = ValueHint::DirPath)]
    pub database: Option<PathBuf>,

    /// 输出标签路径
    #[arg(long, short, value_hint = ValueHint::FilePath)]
    pub output: PathBuf,

    /// 随机种子
    #[arg(long)]
    pub seed: Option<u64>,

    /// 无放回地抽取模板
    #[arg(long)]
    pub without_replacement: bool,

    /// bucket 拒绝次数阈值. 缺省时为 bucket 的模板个数
    #[arg(long)]
    pub exhaustion_threshold: Option<u32>,
}

#[derive(Args, Debug)]
pub struct FilterMaskArgs {
    /// 强度体数据
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// 病灶标签
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub mask: PathBuf,

    /// 保留区间的宽度, 以标准差为单位
    #[arg(long, default_value_t = 2.0)]
    pub cut_factor: f64,

    /// 输出标签路径
    #[arg(long, short, value_hint = ValueHint::FilePath)]
    pub output: PathBuf,
}

fn parse_modality(s: &str) -> Result<Modality, String> {
    s.parse().map_err(|e: ms_berry::SimError| e.to_string())
}

/// 形变模型的共用参数.
#[derive(Args, Debug)]
pub struct ContrastArgs {
    /// 强度体数据
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// 病灶标签
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub lesion_label: PathBuf,

    /// 成像模态: T1, T2, T2-FLAIR, PD, DTI-FA, DTI-ADC
    #[arg(long, value_parser = parse_modality)]
    pub modality: Modality,

    /// 随机场平滑的标准差 (mm)
    #[arg(long, default_value_t = 1.0)]
    pub homogeneity: f64,

    /// 病灶边界平滑的标准差 (mm)
    #[arg(long, default_value_t = 0.5)]
    pub sigma: f64,

    /// 覆盖默认对比度分布的 TOML 文件
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub profiles: Option<PathBuf>,

    /// 随机种子
    #[arg(long)]
    pub seed: Option<u64>,

    /// 输出形变场本身, 而不是形变后的体数据
    #[arg(long)]
    pub deformation_map: bool,
}

#[derive(Args, Debug)]
pub struct DeformArgs {
    #[command(flatten)]
    pub contrast: ContrastArgs,

    /// 输出路径
    #[arg(long, short, value_hint = ValueHint::FilePath)]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct LongitudinalArgs {
    #[command(flatten)]
    pub contrast: ContrastArgs,

    /// 随访次数
    #[arg(long, default_value_t = 3)]
    pub follow_ups: usize,

    /// "变化" 病灶所占比例, [0, 1]
    #[arg(long, default_value_t = 0.5)]
    pub balance: f64,

    /// 随机扰动幅度, 以对比度标准差为单位
    #[arg(long, default_value_t = 1.0)]
    pub variability: f64,

    /// 漂移到达平台值所需的时间点个数
    #[arg(long, default_value_t = ms_berry::consts::DEFAULT_PLATEAU_TIME_POINTS)]
    pub plateau: f64,

    /// 输出目录
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub output_folder: PathBuf,
}
