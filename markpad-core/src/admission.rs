//! 路径准入检查：归一化 → 存在性 → 目录包含 → 扩展名 → 大小。
//!
//! 检查顺序是安全属性的一部分：归一化必须先于包含检查（否则 `..` 序列可以
//! 绕过前缀比较）；包含检查必须先于扩展名/大小检查（否则响应差异可以用来
//! 探测沙箱外文件是否存在）。

use crate::policy::AccessPolicy;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// 操作意图：大小上限只在读取时参与准入判定，写入负载的大小由
/// 内容校验单独把关。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessIntent {
    Read,
    Write,
}

/// 拒绝原因分类。仅用于内部日志与测试断言，绝不原样回显给调用方。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotFound,
    NotAFile,
    OutsideAllowedDirectories,
    ExtensionNotAllowed,
    FileTooLarge,
    ValidationError,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DenyReason::NotFound => "not found",
            DenyReason::NotAFile => "not a regular file",
            DenyReason::OutsideAllowedDirectories => "outside allowed directories",
            DenyReason::ExtensionNotAllowed => "extension not allowed",
            DenyReason::FileTooLarge => "file too large",
            DenyReason::ValidationError => "validation error",
        };
        f.write_str(s)
    }
}

/// 单次准入判定结果。按调用创建，不缓存。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Allow,
    Deny(DenyReason),
}

impl AdmissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionDecision::Allow)
    }
}

/// 词法归一化：折叠 `.` 与 `..`，相对路径挂到当前工作目录下。
/// 不做符号链接解析（见设计说明，属于明确的非目标）。
pub(crate) fn normalize_lexical(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(std::path::MAIN_SEPARATOR_STR),
            Component::CurDir => {}
            // 根目录上的 pop 是 no-op，`..` 不可能越过根
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(c) => out.push(c),
        }
    }
    out
}

/// 包含检查：归一化后的路径必须落在某个允许目录之下。
///
/// `Path::starts_with` 按组件比较，`/data/safe-other` 不会匹配 `/data/safe`，
/// 天然满足路径边界要求（裸字符串前缀比较是经典漏洞，不采用）。
fn contained_in_allowed(normalized: &Path, policy: &AccessPolicy) -> bool {
    policy
        .allowed_dirs()
        .iter()
        .any(|dir| normalized.starts_with(dir))
}

/// 对单个候选路径做准入判定。
///
/// 调用方必须先通过 [`crate::validate_path_shape`] 的形状校验；
/// 本函数只关心语义层面的策略判定。除只读的元数据探测外无任何副作用，
/// 可以在并发请求间任意交错调用。
pub async fn evaluate(
    raw_path: &str,
    intent: AccessIntent,
    policy: &AccessPolicy,
) -> AdmissionDecision {
    let normalized = normalize_lexical(Path::new(raw_path));

    let meta = match tokio::fs::metadata(&normalized).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return AdmissionDecision::Deny(DenyReason::NotFound);
        }
        Err(e) => {
            // 探测失败原因只进内部日志，不进判定结果
            tracing::warn!(cause = %e, "metadata probe failed during admission");
            return AdmissionDecision::Deny(DenyReason::ValidationError);
        }
    };
    if !meta.is_file() {
        return AdmissionDecision::Deny(DenyReason::NotAFile);
    }

    if !contained_in_allowed(&normalized, policy) {
        return AdmissionDecision::Deny(DenyReason::OutsideAllowedDirectories);
    }

    if !policy.extension_allowed(&normalized) {
        return AdmissionDecision::Deny(DenyReason::ExtensionNotAllowed);
    }

    if intent == AccessIntent::Read && meta.len() > policy.max_file_size() {
        return AdmissionDecision::Deny(DenyReason::FileTooLarge);
    }

    AdmissionDecision::Allow
}
