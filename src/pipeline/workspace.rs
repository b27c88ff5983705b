//! 动作的文件写入目标
//!
//! - Direct：直接写磁盘（增量策略，逐动作生效）
//! - Staged：只在内存中记录（批处理策略，确认后由 CodeApplier 落盘）
//!
//! 两种模式都记录每个被触及文件的原始内容，用于产出 FileChange 列表。
//! Staged 模式可挂一个 StagedFiles，让工具在写盘前就读到暂存内容；Workspace 释放时清空它。

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::pipeline::FileChange;
use crate::tools::StagedFiles;

/// 写入模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Direct,
    Staged,
}

#[derive(Debug, Clone)]
struct TouchedFile {
    /// 首次触及前的磁盘内容；None 表示文件原本不存在
    original: Option<String>,
    content: String,
}

/// 绑定工作目录的写入目标
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    mode: WriteMode,
    touched: BTreeMap<PathBuf, TouchedFile>,
    staged_files: Option<StagedFiles>,
}

/// 解析路径：绝对路径原样使用，相对路径相对 root（去掉开头的 `./`）
pub fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let trimmed = path.trim();
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    let p = Path::new(trimmed);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

async fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

impl Workspace {
    pub fn direct(root: impl AsRef<Path>) -> Self {
        Self::new(root, WriteMode::Direct)
    }

    pub fn staged(root: impl AsRef<Path>) -> Self {
        Self::new(root, WriteMode::Staged)
    }

    fn new(root: impl AsRef<Path>, mode: WriteMode) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            mode,
            touched: BTreeMap::new(),
            staged_files: None,
        }
    }

    /// 共享暂存内容给工具（仅 Staged 模式）；挂上时先清空上一次运行的残留
    pub fn with_staged_files(mut self, staged: StagedFiles) -> Self {
        if self.mode == WriteMode::Staged {
            staged.clear();
            self.staged_files = Some(staged);
        }
        self
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        resolve_path(&self.root, path)
    }

    /// 读取文件当前内容（暂存内容优先）；不存在时返回 None
    pub async fn read(&self, path: &str) -> io::Result<Option<String>> {
        let resolved = self.resolve(path);
        if let Some(t) = self.touched.get(&resolved) {
            return Ok(Some(t.content.clone()));
        }
        read_optional(&resolved).await
    }

    /// 写入完整文件内容，返回解析后的路径
    pub async fn write(&mut self, path: &str, content: &str) -> io::Result<PathBuf> {
        if path.trim().is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty file path"));
        }
        let resolved = self.resolve(path);

        let original = match self.touched.get(&resolved) {
            Some(t) => t.original.clone(),
            None => read_optional(&resolved).await?,
        };

        match self.mode {
            WriteMode::Direct => {
                if let Some(parent) = resolved.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&resolved, content).await?;
            }
            WriteMode::Staged => {
                if let Some(staged) = &self.staged_files {
                    staged.insert(&resolved, content);
                }
            }
        }

        self.touched.insert(
            resolved.clone(),
            TouchedFile {
                original,
                content: content.to_string(),
            },
        );
        Ok(resolved)
    }

    /// 累计的文件变更；内容与原始一致的文件不产出变更
    pub fn file_changes(&self) -> Vec<FileChange> {
        self.touched
            .iter()
            .filter_map(|(path, t)| {
                let path = path.to_string_lossy().into_owned();
                match &t.original {
                    None => Some(FileChange::CreateFile {
                        path,
                        content: t.content.clone(),
                    }),
                    Some(orig) if orig == &t.content => None,
                    Some(orig) => Some(FileChange::modify(path, orig, &t.content)),
                }
            })
            .collect()
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(staged) = &self.staged_files {
            staged.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_staged_write_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.kt"), "fun foo() {}\n").unwrap();
        let mut ws = Workspace::staged(dir.path());

        ws.write("a.kt", "fun bar() {}\n").await.unwrap();
        ws.write("src/new.kt", "val x = 1\n").await.unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.kt")).unwrap(),
            "fun foo() {}\n"
        );
        assert!(!dir.path().join("src/new.kt").exists());
        assert_eq!(ws.read("a.kt").await.unwrap().as_deref(), Some("fun bar() {}\n"));

        let changes = ws.file_changes();
        assert_eq!(changes.len(), 2);
        assert!(matches!(&changes[0], FileChange::ModifyFile { .. }));
        assert!(matches!(&changes[1], FileChange::CreateFile { content, .. } if content == "val x = 1\n"));
    }

    #[tokio::test]
    async fn test_staged_files_shared_until_drop() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedFiles::new();
        staged.insert(&dir.path().join("stale.txt"), "left over");
        {
            let mut ws = Workspace::staged(dir.path()).with_staged_files(staged.clone());
            assert!(staged.entries().is_empty());
            ws.write("a.txt", "NEW\n").await.unwrap();
            assert_eq!(staged.get(&dir.path().join("a.txt")).as_deref(), Some("NEW\n"));
        }
        assert!(staged.entries().is_empty());

        // Direct 模式不使用暂存区
        let mut ws = Workspace::direct(dir.path()).with_staged_files(staged.clone());
        ws.write("b.txt", "x").await.unwrap();
        assert!(staged.entries().is_empty());
    }

    #[tokio::test]
    async fn test_direct_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = Workspace::direct(dir.path());
        let path = ws.write("./deep/nested/file.rs", "fn x() {}").await.unwrap();
        assert_eq!(path, dir.path().join("deep/nested/file.rs"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fn x() {}");
        assert_eq!(ws.file_changes().len(), 1);
    }

    #[tokio::test]
    async fn test_original_kept_across_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\n").unwrap();
        let mut ws = Workspace::staged(dir.path());
        ws.write("a.txt", "two\n").await.unwrap();
        ws.write("a.txt", "one\n").await.unwrap();
        assert!(ws.file_changes().is_empty());
    }

    #[tokio::test]
    async fn test_empty_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = Workspace::direct(dir.path());
        let err = ws.write("  ", "x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_resolve_absolute_and_relative() {
        let root = Path::new("/work");
        assert_eq!(resolve_path(root, "/tmp/a.kt"), PathBuf::from("/tmp/a.kt"));
        assert_eq!(resolve_path(root, "./src/a.kt"), PathBuf::from("/work/src/a.kt"));
    }
}
