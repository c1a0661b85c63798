use crate::admission::normalize_lexical;
use crate::error::{EditorError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// 访问策略：允许的目录 + 允许的扩展名 + 单文件大小上限。
///
/// 启动时从配置构建一次，之后只读共享，进程生命周期内不热更新。
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    allowed_dirs: Vec<PathBuf>,
    allowed_extensions: HashSet<String>,
    max_file_size: u64,
}

impl AccessPolicy {
    /// 从配置字符串构建策略。
    ///
    /// `dirs` 为逗号分隔的绝对目录列表，`extensions` 为逗号分隔的扩展名
    /// （不带点，大小写不敏感）。目录列表过滤空项后为空、或大小上限为 0，
    /// 均视为致命配置错误。
    pub fn from_config(dirs: &str, extensions: &str, max_file_size: u64) -> Result<Self> {
        let allowed_dirs: Vec<PathBuf> = dirs
            .split(',')
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| normalize_lexical(Path::new(t)))
            .collect();
        if allowed_dirs.is_empty() {
            return Err(EditorError::InvalidConfig(
                "allowed directory list is empty".into(),
            ));
        }

        let allowed_extensions: HashSet<String> = extensions
            .split(',')
            .map(|t| t.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if allowed_extensions.is_empty() {
            return Err(EditorError::InvalidConfig(
                "allowed extension list is empty".into(),
            ));
        }

        if max_file_size == 0 {
            return Err(EditorError::InvalidConfig(
                "max file size must be positive".into(),
            ));
        }

        Ok(Self {
            allowed_dirs,
            allowed_extensions,
            max_file_size,
        })
    }

    /// 已归一化的允许目录列表。
    pub fn allowed_dirs(&self) -> &[PathBuf] {
        &self.allowed_dirs
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// 扩展名（小写比较）是否在白名单内；无扩展名视为不允许。
    pub fn extension_allowed(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.allowed_extensions.contains(&e.to_ascii_lowercase()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_config_strings() {
        let policy = AccessPolicy::from_config("/tmp/a, /tmp/b,", "md, .TXT", 1000).unwrap();
        assert_eq!(policy.allowed_dirs().len(), 2);
        assert!(policy.extension_allowed(Path::new("x.md")));
        assert!(policy.extension_allowed(Path::new("x.txt")));
        assert!(policy.extension_allowed(Path::new("x.TXT")));
        assert!(!policy.extension_allowed(Path::new("x.exe")));
        assert!(!policy.extension_allowed(Path::new("noext")));
    }

    #[test]
    fn empty_dirs_is_fatal() {
        let err = AccessPolicy::from_config(" , ,", "md", 1000).unwrap_err();
        assert!(matches!(err, EditorError::InvalidConfig(_)));
    }

    #[test]
    fn zero_size_is_fatal() {
        let err = AccessPolicy::from_config("/tmp/a", "md", 0).unwrap_err();
        assert!(matches!(err, EditorError::InvalidConfig(_)));
    }
}
