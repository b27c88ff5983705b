//! 运行监管：每次运行一个 CancellationToken，Ctrl+C 时取消当前运行
//!
//! 流水线在每个挂起点（LLM 补全、人工交互）都与取消令牌竞争，取消后在该点中止；
//! 已经写入的文件不回滚。

use std::future::Future;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::core::AgentError;

/// 运行级生命周期管理
#[derive(Debug, Default)]
pub struct RunSupervisor {
    current: Mutex<CancellationToken>,
}

impl RunSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始新一次运行：换一个新的令牌并返回其克隆
    pub fn begin_run(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = token.clone();
        token
    }

    /// 当前运行的令牌
    pub fn cancel_token(&self) -> CancellationToken {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 取消当前运行（用户 Ctrl+C）
    pub fn cancel(&self) {
        self.cancel_token().cancel();
    }
}

/// 在挂起点等待 fut，同时观察取消；已取消时不再 poll fut
pub async fn cancellable<T, E, F>(cancel: &CancellationToken, fut: F) -> Result<T, AgentError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<AgentError>,
{
    if cancel.is_cancelled() {
        return Err(AgentError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        res = fut => res.map_err(Into::into),
    }
}
