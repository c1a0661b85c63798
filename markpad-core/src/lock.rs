//! 单实例协调：锁文件 + 端口探测。
//!
//! 锁文件是启动/关闭阶段之外唯一的共享可变状态，按请求的路径上不会触碰。
//! 读取-再写入锁文件与另一个同时启动的实例之间存在一个极窄的竞态窗口，
//! 按设计接受（本地单用户工具，不引入 OS 级建议锁）。

use crate::error::{EditorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use sysinfo::{Pid, ProcessRefreshKind, System};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// 锁文件内容：持有者进程的身份信息，用于冲突诊断与陈旧判定。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceLock {
    pub pid: u32,
    pub port: u16,
    pub created_at: DateTime<Utc>,
    pub hostname: String,
}

/// 锁的持有句柄：显式值，由 acquire 返回并一路传递到 release，
/// 不做隐藏单例。Drop 时尽力释放，覆盖异常退出路径。
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    pid: u32,
    port: u16,
    released: AtomicBool,
}

impl LockGuard {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// 释放锁：仅当锁文件仍记录本进程 pid 时删除。幂等；文件已不存在
    /// 不算错误，其余删除失败只记日志，绝不阻碍进程退出。
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(cause = %e, "failed to read lock file during release");
                return;
            }
        };
        match serde_json::from_str::<InstanceLock>(&content) {
            Ok(record) if record.pid != self.pid => {
                // 锁已被别的进程接管，不能动
                warn!(owner_pid = record.pid, "lock file owned by another process, leaving it");
                return;
            }
            Ok(_) | Err(_) => {}
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!("instance lock released"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(cause = %e, "failed to remove lock file"),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// 启动协调器：进程启动时运行一次，判定是否可以独占本工作目录并绑定端口。
#[derive(Debug, Clone)]
pub struct InstanceCoordinator {
    lock_path: PathBuf,
}

impl InstanceCoordinator {
    pub fn new<P: AsRef<Path>>(lock_path: P) -> Self {
        Self {
            lock_path: lock_path.as_ref().to_path_buf(),
        }
    }

    /// 独占启动：检查已有锁 → 探测端口 → 绑定成功后写入新锁。
    ///
    /// 已有锁且持有进程仍存活时返回致命错误（附带对方 pid/端口/启动时间，
    /// 交给操作员处置，不做内部重试）；陈旧或损坏的锁丢弃后继续。
    pub async fn acquire(
        &self,
        host: &str,
        preferred_port: u16,
        max_attempts: u16,
    ) -> Result<(TcpListener, LockGuard)> {
        if let Some(existing) = self.read_lock().await {
            if process_alive(existing.pid) {
                return Err(EditorError::InstanceRunning {
                    pid: existing.pid,
                    port: existing.port,
                    created_at: existing.created_at,
                });
            }
            warn!(
                stale_pid = existing.pid,
                "discarding stale lock from dead process"
            );
            if let Err(e) = tokio::fs::remove_file(&self.lock_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(cause = %e, "failed to remove stale lock file");
                }
            }
        }

        let listener = self.bind_first_free(host, preferred_port, max_attempts).await?;
        let port = listener.local_addr()?.port();

        // 锁必须在监听确认之后写入，否则会虚假宣告一个从未绑定成功的端口
        let record = InstanceLock {
            pid: std::process::id(),
            port,
            created_at: Utc::now(),
            hostname: System::host_name().unwrap_or_else(|| "unknown".into()),
        };
        tokio::fs::write(&self.lock_path, serde_json::to_vec(&record)?).await?;
        info!(port, "instance lock acquired");

        Ok((
            listener,
            LockGuard {
                path: self.lock_path.clone(),
                pid: record.pid,
                port,
                released: AtomicBool::new(false),
            },
        ))
    }

    /// 从 preferred_port 起逐个尝试绑定，最多 max_attempts 个端口。
    /// 仅「地址已占用」继续向后推进，其他绑定错误立即中止。
    async fn bind_first_free(
        &self,
        host: &str,
        preferred_port: u16,
        max_attempts: u16,
    ) -> Result<TcpListener> {
        for offset in 0..max_attempts {
            let Some(port) = preferred_port.checked_add(offset) else {
                break;
            };
            match TcpListener::bind((host, port)).await {
                Ok(listener) => return Ok(listener),
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    info!(port, "port in use, trying next");
                }
                Err(e) => return Err(EditorError::Io(e)),
            }
        }
        Err(EditorError::PortExhausted {
            start: preferred_port,
            attempts: max_attempts,
        })
    }

    /// 读取已有锁记录；不存在返回 None，损坏视同不存在但记一条警告。
    async fn read_lock(&self) -> Option<InstanceLock> {
        let content = match tokio::fs::read_to_string(&self.lock_path).await {
            Ok(c) => c,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(cause = %e, "failed to read lock file, treating as absent");
                }
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(cause = %e, "malformed lock file, treating as absent");
                None
            }
        }
    }
}

/// 进程存活探测：非破坏性，仅看进程是否存在，不要求有信号权限。
/// 点时刻检查，探测后进程立刻退出的竞态按设计接受。
fn process_alive(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_process_specifics(Pid::from(pid as usize), ProcessRefreshKind::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lock_record(pid: u32, port: u16) -> String {
        serde_json::to_string(&InstanceLock {
            pid,
            port,
            created_at: Utc::now(),
            hostname: "testhost".into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn acquires_when_no_lock_exists() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("markpad.lock");
        let coordinator = InstanceCoordinator::new(&lock_path);

        let (listener, guard) = coordinator.acquire("127.0.0.1", 0, 1).await.unwrap();
        let bound = listener.local_addr().unwrap().port();
        assert_eq!(guard.port(), bound);

        let record: InstanceLock =
            serde_json::from_str(&std::fs::read_to_string(&lock_path).unwrap()).unwrap();
        assert_eq!(record.pid, std::process::id());
        assert_eq!(record.port, bound);

        guard.release();
        assert!(!lock_path.exists());
    }

    #[tokio::test]
    async fn live_lock_is_fatal_with_owner_details() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("markpad.lock");
        // 自己的 pid 一定存活
        std::fs::write(&lock_path, lock_record(std::process::id(), 4321)).unwrap();

        let coordinator = InstanceCoordinator::new(&lock_path);
        let err = coordinator.acquire("127.0.0.1", 0, 1).await.unwrap_err();
        match err {
            EditorError::InstanceRunning { pid, port, .. } => {
                assert_eq!(pid, std::process::id());
                assert_eq!(port, 4321);
            }
            other => panic!("unexpected error: {other}"),
        }
        // 锁文件原样保留
        assert!(lock_path.exists());
    }

    #[tokio::test]
    async fn stale_lock_is_overwritten() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("markpad.lock");
        // 接近 u32 上限的 pid 不可能存在
        std::fs::write(&lock_path, lock_record(u32::MAX - 1, 1234)).unwrap();

        let coordinator = InstanceCoordinator::new(&lock_path);
        let (listener, guard) = coordinator.acquire("127.0.0.1", 0, 1).await.unwrap();
        let bound = listener.local_addr().unwrap().port();

        let record: InstanceLock =
            serde_json::from_str(&std::fs::read_to_string(&lock_path).unwrap()).unwrap();
        assert_eq!(record.pid, std::process::id());
        assert_eq!(record.port, bound);
        guard.release();
    }

    #[tokio::test]
    async fn malformed_lock_is_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("markpad.lock");
        std::fs::write(&lock_path, "{not json at all").unwrap();

        let coordinator = InstanceCoordinator::new(&lock_path);
        let (_listener, guard) = coordinator.acquire("127.0.0.1", 0, 1).await.unwrap();
        guard.release();
        assert!(!lock_path.exists());
    }

    #[tokio::test]
    async fn port_probe_skips_bound_ports() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("markpad.lock");

        // 占住一个端口，从它开始探测必须落到更高的端口上
        let occupied = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let base = occupied.local_addr().unwrap().port();

        let coordinator = InstanceCoordinator::new(&lock_path);
        let (listener, guard) = coordinator.acquire("127.0.0.1", base, 10).await.unwrap();
        let bound = listener.local_addr().unwrap().port();
        assert!(bound > base);
        assert!(bound < base.saturating_add(10));
        guard.release();
    }

    #[tokio::test]
    async fn exhausting_attempts_is_fatal() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("markpad.lock");

        let occupied = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let base = occupied.local_addr().unwrap().port();

        let coordinator = InstanceCoordinator::new(&lock_path);
        let err = coordinator.acquire("127.0.0.1", base, 1).await.unwrap_err();
        assert!(matches!(err, EditorError::PortExhausted { .. }));
        // 绑定失败时不得写锁
        assert!(!lock_path.exists());
    }

    #[tokio::test]
    async fn release_leaves_foreign_lock_alone() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("markpad.lock");
        let coordinator = InstanceCoordinator::new(&lock_path);

        let (_listener, guard) = coordinator.acquire("127.0.0.1", 0, 1).await.unwrap();
        // 模拟另一个进程接管了锁
        std::fs::write(&lock_path, lock_record(u32::MAX - 1, 9999)).unwrap();
        guard.release();
        assert!(lock_path.exists());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("markpad.lock");
        let coordinator = InstanceCoordinator::new(&lock_path);

        let (_listener, guard) = coordinator.acquire("127.0.0.1", 0, 1).await.unwrap();
        guard.release();
        guard.release();
        assert!(!lock_path.exists());
    }
}
