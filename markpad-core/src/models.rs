use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// 单个笔记文件的内容载体（读取响应 / 保存请求共用）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteContent {
    pub path: String,
    pub content: String,
}

/// 列表项：允许目录下的一个可编辑文件。
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteSummary {
    pub path: String,
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}
