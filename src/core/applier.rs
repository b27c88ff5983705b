//! CodeApplier：把确认后的 FileChange 写到磁盘
//!
//! CreateFile 创建父目录后整体写入；ModifyFile 逐个 search/replace，先精确匹配，再按忽略行首缩进匹配。
//! 不做回滚：中途失败时前面已写入的文件保留。

use std::path::{Path, PathBuf};

use crate::core::AgentError;
use crate::pipeline::workspace::resolve_path;
use crate::pipeline::{FileChange, SearchReplace};

pub struct CodeApplier {
    root: PathBuf,
}

impl CodeApplier {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// 依次应用变更，返回写入的文件路径
    pub async fn apply(&self, changes: &[FileChange]) -> Result<Vec<PathBuf>, AgentError> {
        let mut written = Vec::with_capacity(changes.len());
        for change in changes {
            let path = resolve_path(&self.root, change.path());
            match change {
                FileChange::CreateFile { content, .. } => {
                    if let Some(parent) = path.parent() {
                        tokio::fs::create_dir_all(parent)
                            .await
                            .map_err(|e| apply_error(&path, e))?;
                    }
                    tokio::fs::write(&path, content)
                        .await
                        .map_err(|e| apply_error(&path, e))?;
                }
                FileChange::ModifyFile { changes, .. } => {
                    let mut content = tokio::fs::read_to_string(&path)
                        .await
                        .map_err(|e| apply_error(&path, e))?;
                    for sr in changes {
                        content = apply_search_replace(&content, sr)
                            .map_err(|e| AgentError::Apply(format!("{}: {}", path.display(), e)))?;
                    }
                    tokio::fs::write(&path, content)
                        .await
                        .map_err(|e| apply_error(&path, e))?;
                }
            }
            tracing::info!(path = %path.display(), "change applied");
            written.push(path);
        }
        Ok(written)
    }
}

fn apply_error(path: &Path, e: std::io::Error) -> AgentError {
    AgentError::Apply(format!("{}: {}", path.display(), e))
}

/// 应用单个 search/replace；search 为空表示整体替换
pub fn apply_search_replace(content: &str, sr: &SearchReplace) -> Result<String, String> {
    if sr.search.is_empty() {
        return Ok(sr.replace.clone());
    }
    if let Some(pos) = content.find(&sr.search) {
        return Ok(splice(content, pos, pos + sr.search.len(), &sr.replace));
    }
    match find_with_indentation_tolerance(content, &sr.search) {
        Some((start, end)) => Ok(splice(content, start, end, &sr.replace)),
        None => Err("search text not found".to_string()),
    }
}

fn splice(content: &str, start: usize, end: usize, replacement: &str) -> String {
    format!("{}{}{}", &content[..start], replacement, &content[end..])
}

fn strip_eol(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// 逐行比较时忽略行首空白，返回匹配区间的字节范围
fn find_with_indentation_tolerance(content: &str, search: &str) -> Option<(usize, usize)> {
    let wanted: Vec<&str> = search.lines().map(|l| strip_eol(l).trim_start()).collect();
    if wanted.is_empty() {
        return None;
    }

    let mut lines = Vec::new();
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        lines.push((offset, line));
        offset += line.len();
    }

    for i in 0..lines.len() {
        if i + wanted.len() > lines.len() {
            break;
        }
        let matched = wanted
            .iter()
            .enumerate()
            .all(|(j, w)| strip_eol(lines[i + j].1).trim_start() == *w);
        if matched {
            let start = lines[i].0;
            let (last_offset, last_line) = lines[i + wanted.len() - 1];
            let end = if search.ends_with('\n') {
                last_offset + last_line.len()
            } else {
                last_offset + strip_eol(last_line).len()
            };
            return Some((start, end));
        }
    }
    None
}
