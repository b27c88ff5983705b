//! 工具箱：模型可在补全中途调用的能力（读文件、列目录、搜索代码）与执行器

pub mod executor;
pub mod filesystem;
pub mod registry;
pub mod schema;
pub mod search;

use std::path::Path;

pub use executor::ToolExecutor;
pub use filesystem::{ListDirectoryTool, ReadFileTool, SafeFs, StagedFiles};
pub use registry::{Tool, ToolRegistry};
pub use schema::{output_schema_json, tool_call_schema_json};
pub use search::SearchFilesTool;

/// 默认工具集：read_file / list_directory / search_files，均限定在 workspace 内；
/// 读取时 staged 中的暂存内容优先于磁盘
pub fn default_registry(
    workspace: &Path,
    staged: StagedFiles,
    max_file_bytes: usize,
    max_search_results: usize,
) -> ToolRegistry {
    let fs = SafeFs::new(workspace)
        .with_max_file_bytes(max_file_bytes)
        .with_staged_files(staged);
    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool::new(fs.clone()));
    registry.register(ListDirectoryTool::new(fs.clone()));
    registry.register(SearchFilesTool::new(fs).with_limits(max_search_results, max_file_bytes));
    registry
}
