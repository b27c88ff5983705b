//! 文件变更：CreateFile / ModifyFile（含 search/replace 子变更）与 diff 渲染

use serde::{Deserialize, Serialize};

/// 单个 search/replace 子变更；search 为空表示整体替换文件内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchReplace {
    pub search: String,
    pub replace: String,
}

/// 文件级变更
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FileChange {
    CreateFile { path: String, content: String },
    ModifyFile { path: String, changes: Vec<SearchReplace> },
}

impl FileChange {
    pub fn path(&self) -> &str {
        match self {
            FileChange::CreateFile { path, .. } | FileChange::ModifyFile { path, .. } => path,
        }
    }

    /// 由修改前后的内容构造 ModifyFile：只覆盖首尾相同行之间的变化块；
    /// 变化块为空或在原文中不唯一时退化为整文件替换
    pub fn modify(path: impl Into<String>, original: &str, updated: &str) -> Self {
        let old_lines: Vec<&str> = original.split_inclusive('\n').collect();
        let new_lines: Vec<&str> = updated.split_inclusive('\n').collect();

        let prefix = old_lines
            .iter()
            .zip(&new_lines)
            .take_while(|(a, b)| a == b)
            .count();
        let max_suffix = old_lines.len().min(new_lines.len()) - prefix;
        let suffix = old_lines
            .iter()
            .rev()
            .zip(new_lines.iter().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();

        let search: String = old_lines[prefix..old_lines.len() - suffix].concat();
        let replace: String = new_lines[prefix..new_lines.len() - suffix].concat();

        let change = if search.is_empty() || original.matches(search.as_str()).count() != 1 {
            SearchReplace {
                search: original.to_string(),
                replace: updated.to_string(),
            }
        } else {
            SearchReplace { search, replace }
        };
        FileChange::ModifyFile {
            path: path.into(),
            changes: vec![change],
        }
    }
}

fn push_prefixed(out: &mut String, prefix: char, text: &str) {
    for line in text.lines() {
        out.push(prefix);
        out.push_str(line);
        out.push('\n');
    }
}

/// 渲染 diff 文本，供人工确认
pub fn render_diff(changes: &[FileChange]) -> String {
    let mut out = String::new();
    for change in changes {
        match change {
            FileChange::CreateFile { path, content } => {
                out.push_str(&format!("--- /dev/null\n+++ b/{}\n", path));
                push_prefixed(&mut out, '+', content);
            }
            FileChange::ModifyFile { path, changes } => {
                out.push_str(&format!("--- a/{}\n+++ b/{}\n", path, path));
                for sr in changes {
                    out.push_str("@@\n");
                    push_prefixed(&mut out, '-', &sr.search);
                    push_prefixed(&mut out, '+', &sr.replace);
                }
            }
        }
    }
    out
}
