//! 输入数据路径解析.

use std::env;
use std::path::{Path, PathBuf};

/// 数据目录环境变量名.
pub const DATA_DIR_ENV: &str = "DSC_DATA_DIR";

/// 获取 `$HOME/dataset` 下由 `it` 依次拼接得到的路径. 找不到 home 目录时返回 `None`.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    ans.extend(it);
    Some(ans)
}

/// 获取 DSC 数据基本路径.
///
/// 1. 若环境变量 `$DSC_DATA_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/dsc`.
pub fn data_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var(DATA_DIR_ENV) {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => home_dataset_dir_with(["dsc"]),
    }
}

/// 在 `base` 下解析输入路径.
///
/// `path` 为绝对路径或已存在时原样返回, 否则返回 `base/path`.
pub fn resolve_in<P: AsRef<Path>, B: AsRef<Path>>(path: P, base: Option<B>) -> PathBuf {
    let path = path.as_ref();
    match base {
        Some(b) if !path.is_absolute() && !path.exists() => b.as_ref().join(path),
        _ => path.to_path_buf(),
    }
}

/// 以 [`data_dir_from_env_or_home`] 为基本路径解析输入.
#[inline]
pub fn resolve_input<P: AsRef<Path>>(path: P) -> PathBuf {
    resolve_in(path, data_dir_from_env_or_home())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_in() {
        let base = Some("/data/dsc");
        assert_eq!(
            resolve_in("sub-01/dsc.nii.gz", base),
            PathBuf::from("/data/dsc/sub-01/dsc.nii.gz")
        );
        assert_eq!(resolve_in("/abs/mask.nii.gz", base), PathBuf::from("/abs/mask.nii.gz"));
        assert_eq!(resolve_in("x.nii", None::<&str>), PathBuf::from("x.nii"));

        // 已存在的相对路径不做拼接.
        let here = env::current_dir().unwrap();
        let existing = Path::new("Cargo.toml");
        if here.join(existing).exists() {
            assert_eq!(resolve_in(existing, base), PathBuf::from("Cargo.toml"));
        }
    }

    #[test]
    fn test_home_dataset_dir() {
        if let Some(p) = home_dataset_dir_with(["dsc", "sub-01"]) {
            assert!(p.ends_with("dataset/dsc/sub-01"));
        }
    }
}
