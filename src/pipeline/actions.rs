//! LLM 动作：EDIT_FILE / CREATE_FILE / COMPLETE 与可注册的自定义动作
//!
//! ActionRegistry 按类型名构造动作；未知类型或缺参数返回 ActionError，
//! 由生成循环转成合成的 Complete，保证循环一定终止。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::pipeline::action_parser::{ActionParams, ParsedAction, CONTENT, EXPLANATION, FILE_PATH, SUMMARY};
use crate::pipeline::context::{context_file_for, ContextManager};
use crate::pipeline::workspace::Workspace;

pub const EDIT_FILE: &str = "EDIT_FILE";
pub const CREATE_FILE: &str = "CREATE_FILE";
pub const COMPLETE: &str = "COMPLETE";

/// 动作构造或执行失败
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("{action} requires parameter {param}")]
    MissingParameter { action: String, param: String },

    #[error("Unknown action type: '{0}'")]
    UnknownAction(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Custom(String),
}

/// 动作执行环境：写入目标 + 上下文
pub struct ActionEnv<'a> {
    pub workspace: &'a mut Workspace,
    pub context: &'a mut ContextManager,
}

/// 自定义动作的处理器
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// 执行动作，返回用于反馈的摘要
    async fn process(&self, params: &ActionParams, env: &mut ActionEnv<'_>) -> Result<String, ActionError>;

    /// 是否结束生成循环
    fn is_terminal(&self) -> bool {
        false
    }
}

/// 一条已构造的动作
#[derive(Clone)]
pub enum LlmAction {
    EditFile {
        path: String,
        content: String,
        explanation: String,
    },
    CreateFile {
        path: String,
        content: String,
        explanation: String,
    },
    Complete {
        summary: String,
    },
    Custom {
        kind: String,
        params: ActionParams,
        handler: Arc<dyn ActionHandler>,
    },
}

impl fmt::Debug for LlmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmAction::EditFile { path, explanation, .. } => f
                .debug_struct("EditFile")
                .field("path", path)
                .field("explanation", explanation)
                .finish_non_exhaustive(),
            LlmAction::CreateFile { path, explanation, .. } => f
                .debug_struct("CreateFile")
                .field("path", path)
                .field("explanation", explanation)
                .finish_non_exhaustive(),
            LlmAction::Complete { summary } => f.debug_struct("Complete").field("summary", summary).finish(),
            LlmAction::Custom { kind, params, .. } => f
                .debug_struct("Custom")
                .field("kind", kind)
                .field("params", params)
                .finish_non_exhaustive(),
        }
    }
}

fn with_trailing_newline(content: &str) -> String {
    if content.is_empty() || content.ends_with('\n') {
        content.to_string()
    } else {
        format!("{}\n", content)
    }
}

impl LlmAction {
    pub fn type_name(&self) -> &str {
        match self {
            LlmAction::EditFile { .. } => EDIT_FILE,
            LlmAction::CreateFile { .. } => CREATE_FILE,
            LlmAction::Complete { .. } => COMPLETE,
            LlmAction::Custom { kind, .. } => kind.as_str(),
        }
    }

    pub fn summary(&self) -> String {
        match self {
            LlmAction::EditFile { path, explanation, .. } => describe("Edited", path, explanation),
            LlmAction::CreateFile { path, explanation, .. } => describe("Created", path, explanation),
            LlmAction::Complete { summary } => summary.clone(),
            LlmAction::Custom { kind, params, .. } => [params.get(SUMMARY), params.get(EXPLANATION)]
                .into_iter()
                .find(|s| !s.is_empty())
                .unwrap_or(kind.as_str())
                .to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            LlmAction::Complete { .. } => true,
            LlmAction::Custom { handler, .. } => handler.is_terminal(),
            _ => false,
        }
    }

    /// 执行动作；成功时返回反馈摘要
    ///
    /// 文件动作写入 workspace 后立即把新内容推入上下文，下一轮 prompt 可见。
    pub async fn process(&self, env: &mut ActionEnv<'_>) -> Result<String, ActionError> {
        match self {
            LlmAction::EditFile { path, content, .. } | LlmAction::CreateFile { path, content, .. } => {
                let content = with_trailing_newline(content);
                let resolved = env
                    .workspace
                    .write(path, &content)
                    .await
                    .map_err(|source| ActionError::Io {
                        path: path.clone(),
                        source,
                    })?;
                let file = context_file_for(&resolved, env.context.workspace(), content);
                env.context.update_files([file]);
                Ok(self.summary())
            }
            LlmAction::Complete { summary } => Ok(summary.clone()),
            LlmAction::Custom { params, handler, .. } => handler.process(params, env).await,
        }
    }
}

fn describe(verb: &str, path: &str, explanation: &str) -> String {
    if explanation.is_empty() {
        format!("{} {}", verb, path)
    } else {
        format!("{} {}: {}", verb, path, explanation)
    }
}

/// 解析失败时的合成 Complete：摘要里带上错误与原始回复
pub fn synthetic_complete(raw: &str, error: &str) -> LlmAction {
    LlmAction::Complete {
        summary: format!("Stopped: could not interpret the model reply ({}).\nRaw reply:\n{}", error, raw.trim()),
    }
}

/// 动作工厂：由参数构造动作
pub type ActionFactory = Arc<dyn Fn(&ActionParams) -> Result<LlmAction, ActionError> + Send + Sync>;

fn required<'a>(params: &'a ActionParams, action: &str, key: &str) -> Result<&'a str, ActionError> {
    let value = params.get(key);
    if value.trim().is_empty() {
        Err(ActionError::MissingParameter {
            action: action.to_string(),
            param: key.to_string(),
        })
    } else {
        Ok(value)
    }
}

fn file_action_parts(params: &ActionParams, action: &str) -> Result<(String, String, String), ActionError> {
    let path = required(params, action, FILE_PATH)?.to_string();
    if !params.contains(CONTENT) {
        return Err(ActionError::MissingParameter {
            action: action.to_string(),
            param: CONTENT.to_string(),
        });
    }
    Ok((path, params.get(CONTENT).to_string(), params.get(EXPLANATION).to_string()))
}

/// 动作注册表：类型名 -> 工厂；默认包含 EDIT_FILE / CREATE_FILE / COMPLETE
#[derive(Clone)]
pub struct ActionRegistry {
    factories: BTreeMap<String, ActionFactory>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        let mut registry = Self {
            factories: BTreeMap::new(),
        };
        registry.register(EDIT_FILE, |p| {
            let (path, content, explanation) = file_action_parts(p, EDIT_FILE)?;
            Ok(LlmAction::EditFile {
                path,
                content,
                explanation,
            })
        });
        registry.register(CREATE_FILE, |p| {
            let (path, content, explanation) = file_action_parts(p, CREATE_FILE)?;
            Ok(LlmAction::CreateFile {
                path,
                content,
                explanation,
            })
        });
        registry.register(COMPLETE, |p| {
            let summary = p.get(SUMMARY).trim();
            Ok(LlmAction::Complete {
                summary: if summary.is_empty() {
                    "Task completed".to_string()
                } else {
                    summary.to_string()
                },
            })
        });
        registry
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册（或替换）一个动作类型
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ActionParams) -> Result<LlmAction, ActionError> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_ascii_uppercase(), Arc::new(factory));
    }

    /// 注册自定义处理器
    pub fn register_handler(&mut self, name: &str, handler: impl ActionHandler + 'static) {
        let kind = name.to_ascii_uppercase();
        let handler: Arc<dyn ActionHandler> = Arc::new(handler);
        let factory_kind = kind.clone();
        self.factories.insert(
            kind,
            Arc::new(move |params: &ActionParams| {
                Ok(LlmAction::Custom {
                    kind: factory_kind.clone(),
                    params: params.clone(),
                    handler: handler.clone(),
                })
            }),
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_uppercase())
    }

    pub fn action_types(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn build(&self, parsed: &ParsedAction) -> Result<LlmAction, ActionError> {
        let factory = self
            .factories
            .get(&parsed.action_type)
            .ok_or_else(|| ActionError::UnknownAction(parsed.action_type.clone()))?;
        factory(&parsed.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::action_parser::parse_response;

    #[test]
    fn test_build_defaults() {
        let registry = ActionRegistry::new();
        let action = registry
            .build(&parse_response("ACTION: EDIT_FILE\nFILE_PATH: a.kt\nEXPLANATION: rename\nCONTENT:\nfun bar()\n```"))
            .unwrap();
        assert_eq!(action.type_name(), EDIT_FILE);
        assert_eq!(action.summary(), "Edited a.kt: rename");
        assert!(!action.is_terminal());

        let done = registry.build(&parse_response("ACTION: COMPLETE")).unwrap();
        assert!(done.is_terminal());
        assert_eq!(done.summary(), "Task completed");
    }

    #[test]
    fn test_build_errors() {
        let registry = ActionRegistry::new();
        let err = registry
            .build(&parse_response("ACTION: EDIT_FILE\nCONTENT:\nx\n```"))
            .unwrap_err();
        assert!(matches!(err, ActionError::MissingParameter { ref param, .. } if param == FILE_PATH));

        let err = registry.build(&parse_response("ACTION: EDIT_FILE\nFILE_PATH: a.kt")).unwrap_err();
        assert!(matches!(err, ActionError::MissingParameter { ref param, .. } if param == CONTENT));

        let err = registry.build(&parse_response("ACTION: DELETE_FILE")).unwrap_err();
        assert_eq!(err.to_string(), "Unknown action type: 'DELETE_FILE'");
    }

    #[test]
    fn test_synthetic_complete_embeds_raw_and_error() {
        let action = synthetic_complete("gibberish", "Unknown action type: ''");
        assert!(action.is_terminal());
        let summary = action.summary();
        assert!(summary.contains("gibberish"));
        assert!(summary.contains("Unknown action type"));
    }

    struct NoteHandler;

    #[async_trait]
    impl ActionHandler for NoteHandler {
        async fn process(&self, params: &ActionParams, env: &mut ActionEnv<'_>) -> Result<String, ActionError> {
            env.context.add_message(crate::memory::Message::agent(params.get(SUMMARY)));
            Ok(format!("noted {}", params.get(SUMMARY)))
        }
    }

    #[tokio::test]
    async fn test_custom_handler_and_file_processing() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ActionRegistry::new();
        registry.register_handler("note", NoteHandler);
        assert!(registry.contains("NOTE"));

        let mut workspace = Workspace::direct(dir.path());
        let mut context = ContextManager::new(dir.path());
        let mut env = ActionEnv {
            workspace: &mut workspace,
            context: &mut context,
        };

        let note = registry.build(&parse_response("ACTION: NOTE\nSUMMARY: hello")).unwrap();
        assert_eq!(note.process(&mut env).await.unwrap(), "noted hello");

        let create = registry
            .build(&parse_response("ACTION: CREATE_FILE\nFILE_PATH: src/x.rs\nCONTENT:\nfn x() {}\n```"))
            .unwrap();
        create.process(&mut env).await.unwrap();

        let path = dir.path().join("src/x.rs");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fn x() {}\n");
        let file = context.file(&path.to_string_lossy()).unwrap();
        assert_eq!(file.display_name, "src/x.rs");
        assert_eq!(context.messages().len(), 1);
    }
}
