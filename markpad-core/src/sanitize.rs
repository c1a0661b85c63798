//! 输入形状校验与内容净化。
//!
//! 形状校验是第一道防线：语法层面不合格的路径字符串在准入检查之前就被
//! 拒绝，保证准入逻辑的文件系统探测永远不会收到垃圾输入。

use crate::error::{EditorError, Result};

/// 路径字符串长度上限（字符数）。
pub const MAX_PATH_LEN: usize = 500;

const UTF8_BOM: char = '\u{feff}';

/// 校验路径字符串形状：1..=500 字符，不含 NUL/CR/LF。
///
/// 只做语法检查，不碰文件系统；语义判定交给准入检查。
pub fn validate_path_shape(raw: &str) -> Result<()> {
    let len = raw.chars().count();
    if len == 0 || len > MAX_PATH_LEN {
        return Err(EditorError::InvalidPath);
    }
    if raw.chars().any(|c| matches!(c, '\0' | '\r' | '\n')) {
        return Err(EditorError::InvalidPath);
    }
    Ok(())
}

/// 净化写入负载：去掉开头的 UTF-8 BOM 与内嵌的 NUL 字节。
/// 这是针对文件内容的检查，与路径形状校验互为兄弟检查。
pub fn sanitize_content(content: &str) -> String {
    let trimmed = content.strip_prefix(UTF8_BOM).unwrap_or(content);
    if trimmed.contains('\0') {
        trimmed.replace('\0', "")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_overlong() {
        assert!(validate_path_shape("").is_err());
        let long = "a".repeat(MAX_PATH_LEN + 1);
        assert!(validate_path_shape(&long).is_err());
        let exact = "a".repeat(MAX_PATH_LEN);
        assert!(validate_path_shape(&exact).is_ok());
    }

    #[test]
    fn rejects_control_characters() {
        assert!(validate_path_shape("/tmp/a\0.md").is_err());
        assert!(validate_path_shape("/tmp/a\r.md").is_err());
        assert!(validate_path_shape("/tmp/a\n.md").is_err());
        assert!(validate_path_shape("/tmp/a.md").is_ok());
    }

    #[test]
    fn strips_bom_and_nul() {
        assert_eq!(sanitize_content("\u{feff}# title"), "# title");
        assert_eq!(sanitize_content("a\0b\0c"), "abc");
        assert_eq!(sanitize_content("plain"), "plain");
        // BOM 只在开头去除，内嵌的保持原样
        assert_eq!(sanitize_content("a\u{feff}b"), "a\u{feff}b");
    }
}
