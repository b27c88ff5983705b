//! search_files：在工作区内按字面量或正则搜索代码行

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{SafeFs, Tool};

/// 代码搜索工具，结果格式 `path:line: text`
pub struct SearchFilesTool {
    fs: SafeFs,
    max_results: usize,
    max_file_size: usize,
}

impl SearchFilesTool {
    pub fn new(fs: SafeFs) -> Self {
        Self {
            fs,
            max_results: 50,
            max_file_size: 1024 * 1024,
        }
    }

    pub fn with_limits(mut self, max_results: usize, max_file_size: usize) -> Self {
        self.max_results = max_results;
        self.max_file_size = max_file_size;
        self
    }

    fn search(&self, pattern: &str, include: Option<&str>, use_regex: bool) -> Result<Vec<String>, String> {
        let matcher: Box<dyn Fn(&str) -> bool> = if use_regex {
            let re = regex::Regex::new(pattern).map_err(|e| format!("Invalid regex pattern: {}", e))?;
            Box::new(move |line| re.is_match(line))
        } else {
            let needle = pattern.to_string();
            Box::new(move |line| line.contains(&needle))
        };
        let include = match include {
            Some(p) => Some(glob::Pattern::new(p).map_err(|e| format!("Invalid include pattern: {}", e))?),
            None => None,
        };

        let root = self.fs.root();
        let staged = self.fs.staged();
        let included = |path: &Path| match &include {
            Some(inc) => inc.matches(path.file_name().and_then(|n| n.to_str()).unwrap_or("")),
            None => true,
        };

        let walker = walkdir::WalkDir::new(root)
            .max_depth(10)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                e.depth() == 0 || !(name.starts_with('.') || name == "target" || name == "node_modules")
            })
            .filter_map(|e| e.ok());

        let mut files: Vec<(PathBuf, String)> = Vec::new();
        for entry in walker {
            let path = entry.path();
            if !entry.file_type().is_file() || !included(path) {
                continue;
            }
            if let Some(content) = staged.get(path) {
                files.push((path.to_path_buf(), content));
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                if meta.len() > self.max_file_size as u64 {
                    continue;
                }
            }
            // 非 UTF-8 文件直接跳过
            if let Ok(content) = std::fs::read_to_string(path) {
                files.push((path.to_path_buf(), content));
            }
        }
        // 只存在于暂存区的新文件
        for (path, content) in staged.entries() {
            if path.starts_with(root) && !path.exists() && included(path.as_path()) {
                files.push((path, content));
            }
        }

        let mut results = Vec::new();
        'files: for (path, content) in &files {
            for (idx, line) in content.lines().enumerate() {
                if matcher(line) {
                    results.push(format!("{}:{}: {}", relative(path, root), idx + 1, line.trim()));
                    if results.len() >= self.max_results {
                        break 'files;
                    }
                }
            }
        }
        Ok(results)
    }
}

fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search workspace files for a literal string or regex. Returns lines as 'path:line: text'."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Text or regex to search for" },
                "include": { "type": "string", "description": "Optional file name glob, e.g. '*.rs'" },
                "regex": { "type": "boolean", "description": "Treat pattern as a regex (default false)" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let pattern = args
            .get("pattern")
            .and_then(|v| v.as_str())
            .filter(|p| !p.is_empty())
            .ok_or("Missing required parameter: pattern")?;
        let include = args.get("include").and_then(|v| v.as_str());
        let use_regex = args.get("regex").and_then(|v| v.as_bool()).unwrap_or(false);

        let results = self.search(pattern, include, use_regex)?;
        if results.is_empty() {
            Ok(format!("No matches for '{}'", pattern))
        } else {
            Ok(results.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::StagedFiles;

    fn setup() -> (tempfile::TempDir, SearchFilesTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("target")).unwrap();
        std::fs::write(dir.path().join("src/a.rs"), "fn foo() {}\nfn bar() { foo() }\n").unwrap();
        std::fs::write(dir.path().join("src/b.kt"), "fun foo() = 1\n").unwrap();
        std::fs::write(dir.path().join("target/c.rs"), "fn foo() {}\n").unwrap();
        let tool = SearchFilesTool::new(SafeFs::new(dir.path()));
        (dir, tool)
    }

    #[tokio::test]
    async fn test_literal_search_with_include() {
        let (_dir, tool) = setup();
        let out = tool
            .execute(serde_json::json!({"pattern": "foo", "include": "*.rs"}))
            .await
            .unwrap();
        assert_eq!(out, "src/a.rs:1: fn foo() {}\nsrc/a.rs:2: fn bar() { foo() }");
    }

    #[tokio::test]
    async fn test_regex_search() {
        let (_dir, tool) = setup();
        let out = tool
            .execute(serde_json::json!({"pattern": "^fun\\s+foo", "regex": true}))
            .await
            .unwrap();
        assert_eq!(out, "src/b.kt:1: fun foo() = 1");
    }

    #[tokio::test]
    async fn test_search_sees_staged_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.kt"), "fun foo() = 1\n").unwrap();
        let staged = StagedFiles::new();
        staged.insert(&dir.path().join("a.kt"), "fun bar() = 1\n");
        staged.insert(&dir.path().join("new/b.kt"), "fun bar2() = 2\n");
        let tool = SearchFilesTool::new(SafeFs::new(dir.path()).with_staged_files(staged));

        let out = tool.execute(serde_json::json!({"pattern": "bar"})).await.unwrap();
        assert_eq!(out, "a.kt:1: fun bar() = 1\nnew/b.kt:1: fun bar2() = 2");
        let out = tool.execute(serde_json::json!({"pattern": "foo"})).await.unwrap();
        assert_eq!(out, "No matches for 'foo'");
    }

    #[tokio::test]
    async fn test_invalid_regex_fails() {
        let (_dir, tool) = setup();
        assert!(tool
            .execute(serde_json::json!({"pattern": "(", "regex": true}))
            .await
            .is_err());
    }
}
