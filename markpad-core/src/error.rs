use crate::admission::DenyReason;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Common result type for core operations.
pub type Result<T> = std::result::Result<T, EditorError>;

#[derive(Debug, Error)]
pub enum EditorError {
    /// 路径字符串形状非法（空/过长/含控制字符），在准入检查之前被拒绝。
    #[error("invalid path")]
    InvalidPath,
    /// 准入检查拒绝；详细原因仅用于内部日志，不回显给调用方。
    #[error("access denied: {0}")]
    Denied(DenyReason),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// 已有实例持有锁文件且进程仍然存活。
    #[error("another instance is already running: pid {pid} on port {port}, started at {created_at}")]
    InstanceRunning {
        pid: u32,
        port: u16,
        created_at: DateTime<Utc>,
    },
    #[error("no free port found: tried {attempts} ports starting at {start}")]
    PortExhausted { start: u16, attempts: u16 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("other error: {0}")]
    Other(String),
}
