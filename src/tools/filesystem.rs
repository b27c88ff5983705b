//! 沙箱文件系统工具
//!
//! SafeFs 绑定 root_dir，所有路径经 resolve 校验必须在 root 下（禁止 ../ 逃逸）；
//! ReadFileTool / ListDirectoryTool 让模型在推理中途按需读取缺失的文件内容。
//! 挂上 StagedFiles 后，暂存（尚未落盘）的内容优先于磁盘。

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::Tool;

/// 最近的已存在祖先做 canonicalize，其余部分原样拼接；用于还未落盘的路径
fn normalize(path: &Path) -> PathBuf {
    if let Ok(c) = path.canonicalize() {
        return c;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => normalize(parent).join(name),
        _ => path.to_path_buf(),
    }
}

/// 暂存文件内容（批处理生成期间尚未落盘的修改），Workspace 写入、工具读取
#[derive(Debug, Clone, Default)]
pub struct StagedFiles {
    files: Arc<RwLock<BTreeMap<PathBuf, String>>>,
}

impl StagedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &Path, content: impl Into<String>) {
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(normalize(path), content.into());
    }

    pub fn get(&self, path: &Path) -> Option<String> {
        self.files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&normalize(path))
            .cloned()
    }

    /// path 本身或其下有暂存文件
    pub fn covers(&self, path: &Path) -> bool {
        let path = normalize(path);
        self.files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .any(|k| k.starts_with(&path))
    }

    pub fn entries(&self) -> Vec<(PathBuf, String)> {
        self.files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.files.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// 沙箱文件系统：绑定根目录，resolve 校验路径在根下
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
    max_file_bytes: usize,
    staged: StagedFiles,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self {
            root_dir,
            max_file_bytes: 1024 * 1024,
            staged: StagedFiles::new(),
        }
    }

    pub fn with_staged_files(mut self, staged: StagedFiles) -> Self {
        self.staged = staged;
        self
    }

    pub fn staged(&self) -> &StagedFiles {
        &self.staged
    }

    pub fn with_max_file_bytes(mut self, max: usize) -> Self {
        self.max_file_bytes = max;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 解析已存在的路径（相对 root 或绝对路径），必须落在 root 之下
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let trimmed = path.trim().trim_start_matches("./");
        let candidate = Path::new(trimmed);
        let full = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root_dir.join(candidate)
        };
        let canonical = match full.canonicalize() {
            Ok(c) => c,
            Err(_) if self.staged.covers(&full) => normalize(&full),
            Err(_) => {
                return Err(AgentError::ToolExecutionFailed(format!(
                    "Path not found: {}",
                    trimmed
                )))
            }
        };
        if canonical.starts_with(&self.root_dir) && !has_parent_dir(&canonical) {
            Ok(canonical)
        } else {
            Err(AgentError::PathEscape(trimmed.to_string()))
        }
    }

    pub async fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let resolved = self.resolve(path)?;
        if let Some(content) = self.staged.get(&resolved) {
            return self.check_size(content.len()).map(|_| content);
        }
        let meta = tokio::fs::metadata(&resolved)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Read failed: {}", e)))?;
        self.check_size(meta.len() as usize)?;
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Read failed: {}", e)))
    }

    fn check_size(&self, len: usize) -> Result<(), AgentError> {
        if len > self.max_file_bytes {
            return Err(AgentError::ToolExecutionFailed(format!(
                "File too large: {} bytes (max: {})",
                len, self.max_file_bytes
            )));
        }
        Ok(())
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, AgentError> {
        let base = if path.trim().is_empty() || path.trim() == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        let mut entries = BTreeSet::new();
        if base.is_dir() {
            let dir = std::fs::read_dir(&base)
                .map_err(|e| AgentError::ToolExecutionFailed(format!("List failed: {}", e)))?;
            for e in dir {
                let e = e.map_err(|e| AgentError::ToolExecutionFailed(e.to_string()))?;
                let name = e.file_name().to_string_lossy().to_string();
                if name.starts_with('.') {
                    continue;
                }
                let ty = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    "/"
                } else {
                    ""
                };
                entries.insert(format!("{}{}", name, ty));
            }
        } else if !self.staged.covers(&base) {
            return Err(AgentError::ToolExecutionFailed(format!(
                "List failed: {} is not a directory",
                path.trim()
            )));
        }

        // 暂存的新文件（及其新目录）也要列出
        for (staged, _) in self.staged.entries() {
            let Ok(rel) = staged.strip_prefix(&base) else {
                continue;
            };
            let mut parts = rel.components();
            let Some(first) = parts.next() else {
                continue;
            };
            let name = first.as_os_str().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if parts.next().is_some() {
                entries.insert(format!("{}/", name));
            } else {
                entries.insert(name);
            }
        }
        Ok(entries.into_iter().collect())
    }
}

fn has_parent_dir(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

/// read_file：读取文件完整内容
pub struct ReadFileTool {
    fs: SafeFs,
}

impl ReadFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the full content of a file in the workspace. Use it when a file you need is not in the context."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path, relative to the workspace root" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or("Missing required parameter: path")?;
        tracing::debug!(path = %path, "read_file tool execute");
        self.fs.read_file(path).await.map_err(|e| e.to_string())
    }
}

/// list_directory：列出目录（目录名以 / 结尾）
pub struct ListDirectoryTool {
    fs: SafeFs,
}

impl ListDirectoryTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List entries of a workspace directory. Directories end with '/'."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory path, default '.'" }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let entries = self.fs.list_dir(path).map_err(|e| e.to_string())?;
        Ok(entries.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, SafeFs) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn foo() {}").unwrap();
        let fs = SafeFs::new(dir.path());
        (dir, fs)
    }

    #[tokio::test]
    async fn test_read_file_tool() {
        let (_dir, fs) = setup();
        let tool = ReadFileTool::new(fs);
        let out = tool
            .execute(serde_json::json!({"path": "./src/lib.rs"}))
            .await
            .unwrap();
        assert_eq!(out, "pub fn foo() {}");
    }

    #[tokio::test]
    async fn test_path_escape_rejected() {
        let (dir, _fs) = setup();
        let fs = SafeFs::new(dir.path().join("src"));
        assert!(fs.read_file("../src/lib.rs").await.is_ok());
        std::fs::write(dir.path().join("secret.txt"), "x").unwrap();
        let err = fs.read_file("../secret.txt").await.unwrap_err();
        assert!(matches!(err, AgentError::PathEscape(_)));
    }

    #[tokio::test]
    async fn test_read_respects_size_limit() {
        let (_dir, fs) = setup();
        let fs = fs.with_max_file_bytes(4);
        let err = fs.read_file("src/lib.rs").await.unwrap_err();
        assert!(err.to_string().contains("File too large"));
    }

    #[tokio::test]
    async fn test_staged_files_shadow_disk() {
        let (dir, fs) = setup();
        let staged = StagedFiles::new();
        staged.insert(&dir.path().join("src/lib.rs"), "pub fn bar() {}");
        staged.insert(&dir.path().join("gen/new.rs"), "fn new() {}");
        let fs = fs.with_staged_files(staged.clone());

        assert_eq!(fs.read_file("src/lib.rs").await.unwrap(), "pub fn bar() {}");
        assert_eq!(fs.read_file("gen/new.rs").await.unwrap(), "fn new() {}");
        assert_eq!(fs.list_dir(".").unwrap(), vec!["gen/", "src/"]);
        assert_eq!(fs.list_dir("gen").unwrap(), vec!["new.rs"]);
        assert!(matches!(
            fs.read_file("gen/../../outside.rs").await.unwrap_err(),
            AgentError::ToolExecutionFailed(_) | AgentError::PathEscape(_)
        ));

        staged.clear();
        assert_eq!(fs.read_file("src/lib.rs").await.unwrap(), "pub fn foo() {}");
        assert!(fs.read_file("gen/new.rs").await.is_err());
    }

    #[tokio::test]
    async fn test_list_directory_tool() {
        let (dir, fs) = setup();
        std::fs::write(dir.path().join("Cargo.toml"), "").unwrap();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();
        let tool = ListDirectoryTool::new(fs);
        let out = tool.execute(serde_json::json!({})).await.unwrap();
        assert_eq!(out, "Cargo.toml\nsrc/");
    }
}
