//! Codewright - 把自然语言编码指令变成经过确认的文件修改
//!
//! 模块划分：
//! - **agent**: 按配置组装各角色的 Agent
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、流水线阶段、运行监管、人机交互、变更应用、编排器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与结构化补全
//! - **memory**: 消息、持久化消息日志、上下文文件、目录大纲
//! - **pipeline**: 上下文管理、理解、计划、动作解析与单动作生成循环
//! - **tools**: 模型可调用的只读工具（读文件、列目录、搜索）与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod pipeline;
pub mod tools;

pub use agent::{create_agent, create_agent_with_client, Agent};
pub use core::{AgentError, CodingOutcome, CodingRequest, OutcomeStatus};
