//! 工作目录大纲：限深度、限条目数的目录树文本，供 prompt 使用

use std::path::Path;

/// 大纲最大深度
pub const OUTLINE_MAX_DEPTH: usize = 4;
/// 大纲最多条目数，超出时以 `...` 结尾
pub const OUTLINE_MAX_ENTRIES: usize = 400;

fn is_skipped(name: &str) -> bool {
    name.starts_with('.') || name == "target" || name == "node_modules"
}

/// 生成目录大纲：每行一个条目，按深度缩进两个空格，目录以 `/` 结尾
pub fn directory_outline(root: &Path) -> String {
    directory_outline_with_limits(root, OUTLINE_MAX_DEPTH, OUTLINE_MAX_ENTRIES)
}

pub fn directory_outline_with_limits(root: &Path, max_depth: usize, max_entries: usize) -> String {
    let mut out = String::new();
    let mut count = 0;
    let walker = walkdir::WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped(&e.file_name().to_string_lossy()))
        .filter_map(|e| e.ok());

    for entry in walker {
        if count >= max_entries {
            out.push_str("...\n");
            break;
        }
        let indent = "  ".repeat(entry.depth() - 1);
        let name = entry.file_name().to_string_lossy();
        let suffix = if entry.file_type().is_dir() { "/" } else { "" };
        out.push_str(&format!("{indent}{name}{suffix}\n"));
        count += 1;
    }
    out
}
