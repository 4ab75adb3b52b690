//! 会话监管：并发提交保护与放弃会话
//!
//! 同一会话同一时刻只允许一个状态机步骤执行，第二个提交立即得到 SessionBusy；
//! 持有 CancellationToken，宿主（Ctrl+C / 断开连接）取消后所有操作返回 SessionClosed。

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::core::{Orchestrator, SessionError, SessionState, TurnOutput};

/// 会话句柄：编排器 + 独占的会话状态
pub struct SessionHandle {
    orchestrator: Arc<Orchestrator>,
    state: Mutex<SessionState>,
    cancel_token: CancellationToken,
}

impl SessionHandle {
    pub fn new(orchestrator: Arc<Orchestrator>, state: SessionState) -> Self {
        Self {
            orchestrator,
            state: Mutex::new(state),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 放弃会话（用户 Ctrl+C）
    pub fn abandon(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_abandoned(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    fn acquire(&self) -> Result<MutexGuard<'_, SessionState>, SessionError> {
        if self.cancel_token.is_cancelled() {
            return Err(SessionError::SessionClosed);
        }
        self.state.try_lock().map_err(|_| SessionError::SessionBusy)
    }

    pub async fn select_path(&self, choice: Option<usize>) -> Result<TurnOutput, SessionError> {
        let mut state = self.acquire()?;
        self.orchestrator.select_path(&mut state, choice).await
    }

    pub async fn respond(&self, response: &str) -> Result<TurnOutput, SessionError> {
        let mut state = self.acquire()?;
        self.orchestrator.respond(&mut state, response).await
    }

    pub async fn resume(&self) -> Result<TurnOutput, SessionError> {
        let mut state = self.acquire()?;
        self.orchestrator.resume(&mut state).await
    }

    /// 当前状态的快照（等待进行中的步骤结束）
    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::lesson::LessonPlan;
    use crate::llm::MockLlmClient;

    #[tokio::test]
    async fn test_abandoned_session_is_closed() {
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(MockLlmClient), &AppConfig::default()));
        let state = orchestrator
            .start(LessonPlan::new("Traits", vec!["define a trait".into()]))
            .await
            .unwrap();
        let handle = SessionHandle::new(orchestrator, state);
        handle.abandon();
        assert!(handle.is_abandoned());
        assert!(matches!(
            handle.select_path(None).await,
            Err(SessionError::SessionClosed)
        ));
    }
}
