//! 对 `ms-berry::catalog` 的更一层封装. 提供更直接的模板库加载器.

use ms_berry::catalog::{self, LesionCatalog, TemplateSource};
use ms_berry::SimResult;
use std::env;
use std::path::{Path, PathBuf};

/// 模板库根目录对应的环境变量.
pub const DATABASE_ENV: &str = "MS_LESION_DB_DIR";

/// 获取病灶模板库根目录.
///
/// 1. 若环境变量 `$MS_LESION_DB_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/lesion-db`. 无法确定用户目录时返回 `None`.
pub fn database_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var(DATABASE_ENV) {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => catalog::home_dataset_dir_with(["lesion-db"]),
    }
}

/// 打开 `path` 下的模板库. 若存在 `catalog.toml`, 以其中的 bucket 表为准.
pub fn open_catalog<P: AsRef<Path>>(path: P) -> SimResult<LesionCatalog> {
    let path = path.as_ref();
    let catalog = LesionCatalog::open(path)?;
    log::debug!(
        "lesion catalog at {}: {} buckets",
        path.display(),
        catalog.buckets().len()
    );
    Ok(catalog)
}

/// 优先使用 `explicit`, 否则从 `$MS_LESION_DB_DIR` 或 `$HOME/dataset/lesion-db` 打开模板库.
pub fn catalog_from<P: AsRef<Path>>(explicit: Option<P>) -> SimResult<LesionCatalog> {
    match explicit {
        Some(p) => open_catalog(p),
        None => match database_dir_from_env_or_home() {
            Some(p) => open_catalog(p),
            None => Err(ms_berry::SimError::InvalidParameter(format!(
                "no lesion database given and neither ${DATABASE_ENV} nor $HOME is set"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_catalog_wins() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_from(Some(dir.path())).unwrap();
        assert_eq!(catalog.root(), dir.path());
        assert_eq!(catalog.buckets().len(), 5);
    }
}
