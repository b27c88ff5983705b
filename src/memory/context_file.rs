//! 上下文文件：当前工作集中、会被拼入 prompt 的源码文件

use std::path::Path;

use serde::{Deserialize, Serialize};

/// 上下文文件；name 为唯一键（通常是绝对路径），display_name 为展示用的相对路径
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFile {
    pub name: String,
    pub content: String,
    pub display_name: String,
}

impl ContextFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            content: content.into(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// 从磁盘读取；name 为解析后的完整路径，display_name 尽量取相对 workspace 的路径
    pub async fn load(path: &Path, workspace: &Path) -> std::io::Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(Self::new(path.to_string_lossy(), content).with_display_name(display_name_for(path, workspace)))
    }
}

/// 相对 workspace 的展示名；不在 workspace 下时返回完整路径
pub fn display_name_for(path: &Path, workspace: &Path) -> String {
    path.strip_prefix(workspace)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_relative() {
        let ws = Path::new("/work/proj");
        assert_eq!(display_name_for(Path::new("/work/proj/src/a.rs"), ws), "src/a.rs");
        assert_eq!(display_name_for(Path::new("/tmp/a.kt"), ws), "/tmp/a.kt");
    }

    #[tokio::test]
    async fn test_load_reads_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.rs");
        std::fs::write(&path, "fn main() {}").unwrap();
        let file = ContextFile::load(&path, dir.path()).await.unwrap();
        assert_eq!(file.content, "fn main() {}");
        assert_eq!(file.display_name, "main.rs");
        assert_eq!(file.name, path.to_string_lossy());
    }
}
