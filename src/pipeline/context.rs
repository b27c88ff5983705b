//! 上下文管理：当前工作集文件 + 消息历史
//!
//! 文件集以 name 为键，同名文件后写覆盖；每条消息同时追加到持久化日志（写失败只告警）。
//! 单写者：只有正在执行的流水线会修改它，所以不加锁。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::memory::{
    directory_outline, display_name_for, ContextFile, ConversationMemory, Message, MessageLog,
};
use crate::pipeline::workspace::resolve_path;

/// 上下文管理器
pub struct ContextManager {
    workspace: PathBuf,
    files: BTreeMap<String, ContextFile>,
    conversation: ConversationMemory,
    log: Option<MessageLog>,
    /// 拼入 prompt 的最近消息条数
    max_prompt_messages: usize,
}

impl ContextManager {
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
            files: BTreeMap::new(),
            conversation: ConversationMemory::new(),
            log: None,
            max_prompt_messages: 20,
        }
    }

    pub fn with_message_log(mut self, log: MessageLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_max_prompt_messages(mut self, n: usize) -> Self {
        self.max_prompt_messages = n;
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// 合并文件：同名替换，后写覆盖
    pub fn update_files(&mut self, files: impl IntoIterator<Item = ContextFile>) {
        for file in files {
            self.files.insert(file.name.clone(), file);
        }
    }

    /// 当前文件集快照
    pub fn get_context(&self) -> Vec<ContextFile> {
        self.files.values().cloned().collect()
    }

    pub fn file(&self, name: &str) -> Option<&ContextFile> {
        self.files.get(name)
    }

    /// 只清空文件集，消息历史保留
    pub fn clear_context(&mut self) {
        self.files.clear();
    }

    pub fn resolve_path(&self, path: &str) -> PathBuf {
        resolve_path(&self.workspace, path)
    }

    /// 加载请求中引用的文件；读取失败的文件跳过并告警
    pub async fn add_request_files(&mut self, paths: &[PathBuf]) -> usize {
        let mut loaded = 0;
        for path in paths {
            let resolved = self.resolve_path(&path.to_string_lossy());
            match ContextFile::load(&resolved, &self.workspace).await {
                Ok(file) => {
                    self.update_files([file]);
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %resolved.display(), error = %e, "skipping unreadable request file");
                }
            }
        }
        loaded
    }

    /// 工作目录大纲
    pub fn fetch_working_directory(&self) -> String {
        directory_outline(&self.workspace)
    }

    /// 渲染文件列表与内容；include_full_outline 时附带目录大纲
    pub fn current_context_prompt(&self, include_full_outline: bool) -> String {
        let mut s = format!("## Working directory\n{}\n", self.workspace.display());

        if include_full_outline {
            let outline = self.fetch_working_directory();
            if !outline.is_empty() {
                s.push_str("\n## Project outline\n");
                s.push_str(&outline);
            }
        }

        s.push_str("\n## Files in context\n");
        if self.files.is_empty() {
            s.push_str("(none)\n");
            return s;
        }
        for file in self.files.values() {
            s.push_str(&format!("- {} ({})\n", file.display_name, file.name));
        }
        for file in self.files.values() {
            s.push_str(&format!(
                "\n### {}\nPath: {}\n```\n{}\n```\n",
                file.display_name,
                file.name,
                file.content.trim_end_matches('\n')
            ));
        }
        s
    }

    /// 记录一条消息并追加到持久化日志
    pub fn add_message(&mut self, message: Message) {
        if let Some(log) = &self.log {
            if let Err(e) = log.append_message(&message) {
                tracing::warn!(path = %log.path().display(), error = %e, "failed to append message log");
            }
        }
        self.conversation.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn recent_messages(&self, n: usize) -> &[Message] {
        self.conversation.recent(n)
    }

    /// 最近消息的文本形式（`LABEL: content`），用于拼 prompt；为空时返回空串
    pub fn history_prompt(&self) -> String {
        let recent = self.recent_messages(self.max_prompt_messages);
        if recent.is_empty() {
            return String::new();
        }
        let mut s = String::from("## Conversation so far\n");
        for m in recent {
            s.push_str(&format!("{}: {}\n", m.role.label(), m.content));
        }
        s
    }
}

/// 由解析后的路径与内容构造上下文文件
pub fn context_file_for(path: &Path, workspace: &Path, content: impl Into<String>) -> ContextFile {
    ContextFile::new(path.to_string_lossy(), content).with_display_name(display_name_for(path, workspace))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_files_latest_wins() {
        let mut ctx = ContextManager::new("/work");
        ctx.update_files([
            ContextFile::new("/work/a.kt", "one"),
            ContextFile::new("/work/b.kt", "two"),
            ContextFile::new("/work/a.kt", "three"),
        ]);
        let files = ctx.get_context();
        assert_eq!(files.len(), 2);
        assert_eq!(ctx.file("/work/a.kt").map(|f| f.content.as_str()), Some("three"));
    }

    #[test]
    fn test_clear_then_empty_update() {
        let mut ctx = ContextManager::new("/work");
        ctx.update_files([ContextFile::new("/work/a.kt", "x")]);
        ctx.add_message(Message::user("hi"));
        ctx.clear_context();
        ctx.update_files(Vec::new());
        assert!(ctx.get_context().is_empty());
        assert_eq!(ctx.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_add_request_files_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.kt"), "fun foo() = 1\n").unwrap();
        let mut ctx = ContextManager::new(dir.path());
        let loaded = ctx
            .add_request_files(&[PathBuf::from("a.kt"), PathBuf::from("missing.kt")])
            .await;
        assert_eq!(loaded, 1);
        let files = ctx.get_context();
        assert_eq!(files[0].display_name, "a.kt");

        let prompt = ctx.current_context_prompt(true);
        assert!(prompt.contains("## Project outline"));
        assert!(prompt.contains("fun foo() = 1"));
    }

    #[test]
    fn test_messages_are_logged() {
        let dir = tempfile::tempdir().unwrap();
        let log = MessageLog::new(dir.path().join("log/messages.log"));
        let mut ctx = ContextManager::new(dir.path()).with_message_log(log);
        ctx.add_message(Message::user("rename foo\nplease"));
        ctx.add_message(Message::agent("ok"));

        let text = std::fs::read_to_string(dir.path().join("log/messages.log")).unwrap();
        assert_eq!(text, "USER: rename foo\\nplease\nAGENT: ok\n");
        assert!(ctx.history_prompt().contains("AGENT: ok"));
    }

    #[test]
    fn test_unwritable_log_does_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blocker"), "").unwrap();
        let log = MessageLog::new(dir.path().join("blocker/messages.log"));
        let mut ctx = ContextManager::new(dir.path()).with_message_log(log);
        ctx.add_message(Message::user("still recorded"));
        assert_eq!(ctx.messages().len(), 1);
    }
}
