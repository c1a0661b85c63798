//! 笔记存取：所有磁盘操作先过形状校验与路径准入，再碰文件。
//!
//! 准入通过与实际读写之间存在 TOCTOU 间隙（检查后文件可能被并发写入换
//! 掉），本地单用户工具按设计接受，不引入文件锁。

use crate::admission::{evaluate, normalize_lexical, AccessIntent, AdmissionDecision};
use crate::error::{EditorError, Result};
use crate::models::{NoteContent, NoteSummary};
use crate::policy::AccessPolicy;
use crate::sanitize::{sanitize_content, validate_path_shape};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{instrument, warn};

/// 基于允许目录的笔记存储。策略只读共享，无每请求锁。
#[derive(Debug, Clone)]
pub struct NoteStore {
    policy: Arc<AccessPolicy>,
}

impl NoteStore {
    pub fn new(policy: Arc<AccessPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// 准入判定；拒绝时记一条脱敏日志（只记原因，不记原始路径）并转为错误。
    async fn admit(&self, raw_path: &str, intent: AccessIntent) -> Result<PathBuf> {
        validate_path_shape(raw_path)?;
        match evaluate(raw_path, intent, &self.policy).await {
            AdmissionDecision::Allow => Ok(normalize_lexical(Path::new(raw_path))),
            AdmissionDecision::Deny(reason) => {
                warn!(%reason, ?intent, "path admission denied");
                Err(EditorError::Denied(reason))
            }
        }
    }

    /// 读取一个笔记文件。
    #[instrument(skip(self, raw_path))]
    pub async fn read_note(&self, raw_path: &str) -> Result<NoteContent> {
        let path = self.admit(raw_path, AccessIntent::Read).await?;
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(NoteContent {
            path: path.to_string_lossy().into_owned(),
            content,
        })
    }

    /// 保存一个笔记文件：净化内容、校验字节数上限，再过准入检查落盘。
    #[instrument(skip(self, raw_path, content))]
    pub async fn write_note(&self, raw_path: &str, content: &str) -> Result<()> {
        validate_path_shape(raw_path)?;
        let cleaned = sanitize_content(content);
        if cleaned.len() as u64 > self.policy.max_file_size() {
            warn!(size = cleaned.len(), "write payload exceeds size limit");
            return Err(EditorError::Denied(
                crate::admission::DenyReason::FileTooLarge,
            ));
        }
        let path = self.admit(raw_path, AccessIntent::Write).await?;
        tokio::fs::write(&path, cleaned.as_bytes()).await?;
        Ok(())
    }

    /// 列出所有允许目录下扩展名合规的文件，按路径排序。
    /// 各允许目录并发扫描。
    #[instrument(skip(self))]
    pub async fn list_notes(&self) -> Result<Vec<NoteSummary>> {
        let scans: Vec<_> = self
            .policy
            .allowed_dirs()
            .iter()
            .cloned()
            .map(|root| {
                let store = self.clone();
                async move { store.scan_root(&root).await }
            })
            .collect();

        let mut out = Vec::new();
        for result in join_all(scans).await {
            out.extend(result?);
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    /// 递归扫描单个允许目录；目录本身不存在按空处理（配置的目录可能
    /// 尚未创建），其余 IO 错误向上传播。
    async fn scan_root(&self, root: &Path) -> Result<Vec<NoteSummary>> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound && dir == root => {
                    warn!(cause = %e, "allowed directory missing, skipping");
                    continue;
                }
                Err(e) => return Err(EditorError::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }
                if !file_type.is_file() || !self.policy.extension_allowed(&path) {
                    continue;
                }
                let meta = entry.metadata().await?;
                out.push(NoteSummary {
                    path: path.to_string_lossy().into_owned(),
                    name: entry.file_name().to_string_lossy().into_owned(),
                    size: meta.len(),
                    modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
                });
            }
        }
        Ok(out)
    }
}
