//! 编排器：会话状态机
//!
//! INIT -> PATH_SELECTION -> TEACHING(起草 -> 审查 -> 等待回答 -> 评估) -> COMPLETE。
//! 所有 Agent 调用都经过这里；审查门控在预算内循环重写，预算耗尽后强制放行最后一版草稿并标记降级。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::agents::{
    Agent, AgentRuntime, EvaluationRequest, Evaluator, EvaluatorVerdict, PathGenerator,
    PathRequest, Principle, ReviewRequest, Reviewer, Tutor, TutorDraft, TutorRequest,
};
use crate::config::AppConfig;
use crate::core::{
    Advance, AgentError, LearningPath, Phase, RecoveryAction, RecoveryEngine, SessionError,
    SessionEvent, SessionState, TeachingStep, Turn, TurnOutput,
};
use crate::lesson::LessonPlan;
use crate::llm::{AgentRole, LlmClient};
use crate::memory::HistoryWindow;

/// 审查门控的放行结果
enum Release {
    Approved { draft: TutorDraft, replacement: Option<String> },
    SafetyBypass(TutorDraft),
}

/// 会话编排器：持有四个 Agent 与会话参数，本身无会话状态，可在多个会话间共享
pub struct Orchestrator {
    path_generator: PathGenerator,
    tutor: Tutor,
    evaluator: Evaluator,
    reviewer: Reviewer,
    recovery: RecoveryEngine,
    max_review_attempts: u32,
    tutor_window: HistoryWindow,
    evaluator_window: HistoryWindow,
    event_tx: Option<UnboundedSender<SessionEvent>>,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, cfg: &AppConfig) -> Self {
        let runtime = AgentRuntime::new(llm)
            .with_generation_attempts(cfg.session.generation_attempts)
            .with_prompts_dir(cfg.agents.prompts_dir.clone());
        Self {
            path_generator: PathGenerator::new(runtime.clone(), cfg.agents.path_generator_temperature),
            tutor: Tutor::new(runtime.clone(), cfg.agents.tutor_temperature),
            evaluator: Evaluator::new(runtime.clone(), cfg.agents.effective_evaluator_temperature()),
            reviewer: Reviewer::new(runtime, cfg.agents.reviewer_temperature),
            recovery: RecoveryEngine::new(),
            max_review_attempts: cfg.session.max_review_attempts.max(1),
            tutor_window: HistoryWindow::new(cfg.session.tutor_history_window),
            evaluator_window: HistoryWindow::new(cfg.session.evaluator_history_window),
            event_tx: None,
        }
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<SessionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send_event(&self, ev: SessionEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }

    /// 创建会话并生成候选路径；成功后处于 PATH_SELECTION
    pub async fn start(
        &self,
        lesson: impl Into<Arc<LessonPlan>>,
    ) -> Result<SessionState, SessionError> {
        let mut state = SessionState::new(lesson);
        tracing::info!(session = %state.id(), lesson = %state.lesson().title, "Session started");

        let candidates = self
            .generate_paths(state.shared_lesson())
            .await
            .map_err(SessionError::SessionStart)?;
        self.send_event(SessionEvent::PathsGenerated {
            count: candidates.len(),
        });
        state.offer_candidates(candidates);
        Ok(state)
    }

    /// 选定候选路径（None 取第一条）并产出第一轮讲授
    ///
    /// 选定后起草失败返回 `DraftPending`：路径已生效，使用 `resume` 重新起草
    pub async fn select_path(
        &self,
        state: &mut SessionState,
        choice: Option<usize>,
    ) -> Result<TurnOutput, SessionError> {
        match state.phase() {
            Phase::PathSelection => {}
            Phase::Complete => return Err(SessionError::SessionClosed),
            other => return Err(unexpected(Phase::PathSelection, other)),
        }
        let index = choice.unwrap_or(0);
        let available = state.candidates().len();
        let path = state
            .choose_path(index)
            .ok_or(SessionError::InvalidPathSelection {
                requested: index,
                available,
            })?;
        tracing::info!(path = %path.id, nodes = path.nodes.len(), "Path selected");
        self.send_event(SessionEvent::PathSelected {
            path_id: path.id.clone(),
            nodes: path.nodes.len(),
        });
        self.draft_reviewed(state).await.map_err(pending)
    }

    /// 处理一次学习者回答：评估 -> 前移或补救 -> 下一轮讲授（或完成）
    ///
    /// 评估失败时状态回到等待回答，可原样重新提交；
    /// 评估成功后起草失败返回 `DraftPending`，回答与前移已记录，使用 `resume` 继续
    pub async fn respond(
        &self,
        state: &mut SessionState,
        response: &str,
    ) -> Result<TurnOutput, SessionError> {
        match state.phase() {
            Phase::Teaching(TeachingStep::AwaitingResponse) => {}
            Phase::Complete => return Err(SessionError::SessionClosed),
            other => {
                return Err(unexpected(
                    Phase::Teaching(TeachingStep::AwaitingResponse),
                    other,
                ))
            }
        }
        let response = response.trim();

        state.set_phase(Phase::Teaching(TeachingStep::Evaluating));
        let verdict = match self.evaluate(state, response).await {
            Ok(v) => v,
            Err(e) => {
                // 回到等待回答，学习者可以原样重新提交
                state.set_phase(Phase::Teaching(TeachingStep::AwaitingResponse));
                return Err(e.into());
            }
        };
        tracing::info!(
            intent = ?verdict.intent,
            assessment = ?verdict.assessment,
            should_advance = verdict.should_advance,
            "Response evaluated"
        );
        self.send_event(SessionEvent::Evaluated {
            intent: verdict.intent,
            assessment: verdict.assessment,
            should_advance: verdict.should_advance,
        });
        state.record_exchange(response, verdict.clone());

        match state.advance(&verdict) {
            Advance::Completed => {
                tracing::info!(session = %state.id(), turns = state.turns().len(), "Lesson complete");
                self.send_event(SessionEvent::Completed {
                    turns: state.turns().len(),
                });
                return Ok(TurnOutput::completion(state));
            }
            Advance::Next => {
                self.send_event(SessionEvent::Advanced {
                    node_index: state.node_index(),
                });
            }
            Advance::Stayed => {
                self.send_event(SessionEvent::Remediating {
                    node_index: state.node_index(),
                    guidance: verdict.guidance.clone(),
                });
                state.remediate(verdict.guidance);
            }
        }
        self.draft_reviewed(state).await.map_err(pending)
    }

    /// 上一次起草失败后重新起草（状态停在 TEACHING/DRAFTING 时可用）
    pub async fn resume(&self, state: &mut SessionState) -> Result<TurnOutput, SessionError> {
        match state.phase() {
            Phase::Teaching(TeachingStep::Drafting | TeachingStep::Reviewing) => {
                self.draft_reviewed(state).await
            }
            Phase::Complete => Err(SessionError::SessionClosed),
            other => Err(unexpected(Phase::Teaching(TeachingStep::Drafting), other)),
        }
    }

    async fn generate_paths(
        &self,
        lesson: Arc<LessonPlan>,
    ) -> Result<Vec<LearningPath>, AgentError> {
        let mut request = PathRequest::new(lesson);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.path_generator.run(request.clone()).await {
                Ok(paths) => return Ok(paths),
                Err(e) => match self.recovery.handle(&e, attempt) {
                    RecoveryAction::RetryWithPrompt(note) => {
                        tracing::warn!("Path generation attempt {} failed: {}", attempt, e);
                        request.strict_note = Some(note);
                    }
                    _ => return Err(e),
                },
            }
        }
    }

    async fn evaluate(
        &self,
        state: &SessionState,
        response: &str,
    ) -> Result<EvaluatorVerdict, AgentError> {
        let node = state
            .current_node()
            .cloned()
            .ok_or_else(|| AgentError::malformed(AgentRole::Evaluator, "no active node"))?;
        let mut request = EvaluationRequest {
            node,
            tutor_message: state.last_tutor_output().unwrap_or_default().to_string(),
            response: response.to_string(),
            history: self.evaluator_window.project(completed_turns(state)),
            strict_note: None,
        };
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.evaluator.run(request.clone()).await {
                Ok(verdict) => return Ok(verdict),
                Err(e) => match self.recovery.handle(&e, attempt) {
                    RecoveryAction::RetryWithPrompt(note) => {
                        tracing::warn!("Evaluation attempt {} failed: {}", attempt, e);
                        request.strict_note = Some(note);
                    }
                    _ => return Err(e),
                },
            }
        }
    }

    /// 审查门控：起草 -> 审查，未通过带违规说明重写，预算耗尽后强制放行
    async fn draft_reviewed(&self, state: &mut SessionState) -> Result<TurnOutput, SessionError> {
        let node_index = state.node_index();
        let node = state
            .current_node()
            .cloned()
            .ok_or_else(|| unexpected(Phase::Teaching(TeachingStep::Drafting), state.phase()))?;
        let guidance = state.pending_guidance().map(str::to_string);
        state.reset_review_attempts();

        let mut revision_notes: Vec<String> = Vec::new();
        let mut last_draft: Option<TutorDraft> = None;

        let release = loop {
            state.set_phase(Phase::Teaching(TeachingStep::Drafting));
            self.send_event(SessionEvent::Drafting {
                node_index,
                attempt: state.review_attempts() + 1,
                remediation: guidance.is_some(),
            });
            let request = TutorRequest {
                lesson: state.shared_lesson(),
                node: node.clone(),
                history: self.tutor_window.project(state.turns()),
                guidance: guidance.clone(),
                revision_notes: revision_notes.clone(),
            };

            let violations: Vec<String> = match self.tutor.run(request).await {
                Ok(draft) => {
                    state.set_phase(Phase::Teaching(TeachingStep::Reviewing));
                    let review = self
                        .reviewer
                        .run(ReviewRequest {
                            node: node.clone(),
                            draft: draft.clone(),
                        })
                        .await;
                    match review {
                        Ok(r) if r.passed => {
                            break Release::Approved {
                                draft,
                                replacement: r.replacement,
                            }
                        }
                        Ok(r) => {
                            last_draft = Some(draft);
                            r.violations
                        }
                        Err(e) => {
                            last_draft = Some(draft);
                            self.redraft_or_surface(state, e)?
                        }
                    }
                }
                Err(e) => self.redraft_or_surface(state, e)?,
            };

            let attempts = state.record_review_failure();
            self.send_event(SessionEvent::ReviewRejected {
                attempt: attempts,
                violations: violations.clone(),
            });
            if attempts >= self.max_review_attempts {
                match last_draft.take() {
                    Some(draft) => break Release::SafetyBypass(draft),
                    None => {
                        state.set_phase(Phase::Teaching(TeachingStep::Drafting));
                        return Err(SessionError::MalformedAgentOutput {
                            role: AgentRole::Tutor,
                            detail: format!("no usable draft after {attempts} attempts"),
                        });
                    }
                }
            }
            revision_notes = violations.iter().map(|v| Principle::revision_note(v)).collect();
        };

        let (draft, content, degraded) = match release {
            Release::Approved { draft, replacement } => {
                let content = replacement.unwrap_or_else(|| draft.render());
                (draft, content, false)
            }
            Release::SafetyBypass(draft) => {
                tracing::warn!(
                    event = "degraded_quality",
                    node_index,
                    attempts = state.review_attempts(),
                    "Review budget exhausted, releasing last draft"
                );
                self.send_event(SessionEvent::SafetyBypass {
                    node_index,
                    attempts: state.review_attempts(),
                });
                let content = draft.render();
                (draft, content, true)
            }
        };

        state.push_turn(Turn::new(node_index, content.clone(), degraded).with_editor(draft.editor.clone()));
        Ok(TurnOutput::project(state, content, draft.editor, degraded))
    }

    /// Tutor / Reviewer 失败：按恢复动作计入预算重写，否则上抛
    fn redraft_or_surface(
        &self,
        state: &mut SessionState,
        err: AgentError,
    ) -> Result<Vec<String>, SessionError> {
        match self.recovery.handle(&err, state.review_attempts() + 1) {
            RecoveryAction::Redraft(note) => {
                tracing::warn!("Draft attempt failed, redrafting: {}", err);
                Ok(vec![note])
            }
            _ => {
                state.set_phase(Phase::Teaching(TeachingStep::Drafting));
                Err(err.into())
            }
        }
    }
}

/// 评估上下文只包含已完成的交换（当前待评估的一轮由请求单独携带）
fn completed_turns(state: &SessionState) -> &[Turn] {
    let turns = state.turns();
    match turns.last() {
        Some(t) if t.learner_response().is_none() => &turns[..turns.len() - 1],
        _ => turns,
    }
}

fn pending(err: SessionError) -> SessionError {
    SessionError::DraftPending(Box::new(err))
}

fn unexpected(expected: Phase, actual: Phase) -> SessionError {
    SessionError::UnexpectedPhase {
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}
