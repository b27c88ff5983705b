//! 会话消息持久化日志
//!
//! 只追加的文本文件，每条消息一行，以角色标签开头（`USER: ...` / `AGENT: ...`）。
//! 上限 1 MiB：追加后会超限时，只保留旧日志最后 1000 行，拼接新文本，再从尾部截断到上限。

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::memory::Message;

/// 日志文件大小上限（字节）
pub const MAX_LOG_BYTES: usize = 1_048_576;
/// 轮转时保留的旧日志行数
pub const ROTATION_KEEP_LINES: usize = 1_000;

/// 单写者的消息日志
#[derive(Debug, Clone)]
pub struct MessageLog {
    path: PathBuf,
    max_bytes: usize,
    keep_lines: usize,
}

impl MessageLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_bytes: MAX_LOG_BYTES,
            keep_lines: ROTATION_KEEP_LINES,
        }
    }

    pub fn with_limits(mut self, max_bytes: usize, keep_lines: usize) -> Self {
        self.max_bytes = max_bytes;
        self.keep_lines = keep_lines;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条消息（换行转义为 `\n`，保证一条消息一行）
    pub fn append_message(&self, msg: &Message) -> std::io::Result<()> {
        self.append(&format_line(msg))
    }

    /// 追加原始文本；会超限时执行轮转并整体重写文件
    pub fn append(&self, text: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let existing_len = match std::fs::metadata(&self.path) {
            Ok(m) => m.len() as usize,
            Err(_) => 0,
        };

        if existing_len + text.len() > self.max_bytes {
            let bytes = std::fs::read(&self.path).unwrap_or_default();
            let existing = String::from_utf8_lossy(&bytes);
            let rotated = rotate(&existing, text, self.max_bytes, self.keep_lines);
            tracing::debug!(
                path = %self.path.display(),
                before = existing_len,
                after = rotated.len(),
                "message log rotated"
            );
            return std::fs::write(&self.path, rotated);
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(text.as_bytes())
    }

    /// 读取完整日志；文件不存在时返回空串
    pub fn read(&self) -> String {
        std::fs::read(&self.path)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }
}

/// 一条消息对应的日志行（含结尾换行）
pub fn format_line(msg: &Message) -> String {
    let content = msg.content.replace("\r\n", "\\n").replace('\n', "\\n");
    format!("{}: {}\n", msg.role.label(), content)
}

/// 轮转：旧日志只留最后 keep_lines 行，拼接新文本，结果超过 max_bytes 时从尾部保留 max_bytes 字节
pub fn rotate(existing: &str, new_text: &str, max_bytes: usize, keep_lines: usize) -> String {
    let lines: Vec<&str> = existing.lines().collect();
    let start = lines.len().saturating_sub(keep_lines);
    let mut combined = String::with_capacity(existing.len().min(max_bytes) + new_text.len());
    for line in &lines[start..] {
        combined.push_str(line);
        combined.push('\n');
    }
    combined.push_str(new_text);

    if combined.len() <= max_bytes {
        return combined;
    }
    let mut cut = combined.len() - max_bytes;
    // 截断点落在多字节字符中间时向后挪，结果只会更短
    while !combined.is_char_boundary(cut) {
        cut += 1;
    }
    combined[cut..].to_string()
}
