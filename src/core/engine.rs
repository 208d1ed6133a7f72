//! 对话引擎：按路由状态机顺序执行节点
//!
//! 一轮（turn）从 entry 开始（若状态挂起在 human_input 则从 human_input 开始），
//! 直到抵达 end，或 human_input 在没有反馈的情况下挂起。
//! 节点错误在节点边界统一交给 RecoveryEngine；取消与超时直接中止本轮，调用方保留上一个检查点。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::agents::{
    Coordinator, CourseAdvisor, EndNode, EntryNode, HumanInputNode, LearningPlanner, Node,
};
use crate::config::AppConfig;
use crate::core::{
    check_conversation_health, enforce_loop_limit, successor, ConversationState, HealthReport,
    KeywordTopicClassifier, NodeName, RecoveryEngine, TopicClassifier, TutorError,
};
use crate::llm::{create_llm_from_config, LlmClient};
use crate::observability::PerformanceMonitor;
use crate::tools::ToolManager;

/// 一轮结束时的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// 挂起在 human_input，等待用户反馈
    AwaitingInput,
    /// 抵达 end
    Completed,
}

#[derive(Debug, Clone)]
pub struct TurnResult {
    pub state: ConversationState,
    pub outcome: TurnOutcome,
    pub visited: Vec<NodeName>,
}

pub struct ConversationEngine {
    entry: EntryNode,
    coordinator: Coordinator,
    course_advisor: CourseAdvisor,
    learning_planner: LearningPlanner,
    human_input: HumanInputNode,
    end: EndNode,
    recovery: RecoveryEngine,
    tools: Arc<ToolManager>,
    monitor: Arc<PerformanceMonitor>,
    max_loop_count: u32,
    node_timeout: Duration,
}

impl ConversationEngine {
    pub fn new(
        cfg: &AppConfig,
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolManager>,
        monitor: Arc<PerformanceMonitor>,
        classifier: Arc<dyn TopicClassifier>,
    ) -> Self {
        let max_loop_count = cfg.app.max_loop_count;
        Self {
            entry: EntryNode,
            coordinator: Coordinator::new(llm.clone(), cfg.agents.coordinator.into(), classifier, max_loop_count),
            course_advisor: CourseAdvisor::new(llm.clone(), cfg.agents.course_advisor.into(), tools.clone()),
            learning_planner: LearningPlanner::new(llm, cfg.agents.learning_planner.into(), tools.clone()),
            human_input: HumanInputNode::new(),
            end: EndNode,
            recovery: RecoveryEngine::new(),
            tools,
            monitor,
            max_loop_count,
            node_timeout: Duration::from_secs(cfg.app.node_timeout_secs),
        }
    }

    /// 按配置创建 LLM 与工具，话题检测使用关键词分类器
    pub fn from_config(cfg: &AppConfig, monitor: Arc<PerformanceMonitor>) -> Self {
        let llm = create_llm_from_config(cfg, monitor.clone());
        let tools = Arc::new(ToolManager::from_config(&cfg.tools, monitor.clone()));
        Self::new(cfg, llm, tools, monitor, Arc::new(KeywordTopicClassifier))
    }

    pub fn tools(&self) -> &Arc<ToolManager> {
        &self.tools
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn max_loop_count(&self) -> u32 {
        self.max_loop_count
    }

    pub fn health(&self, state: &ConversationState) -> HealthReport {
        check_conversation_health(state, self.max_loop_count)
    }

    /// 记录并恢复一个已分类的错误
    pub fn recover(&self, err: &TutorError, state: ConversationState, component: &str) -> ConversationState {
        self.monitor.record_error(err.kind().as_str());
        self.recovery.handle(err, state, component)
    }

    fn node(&self, name: NodeName) -> &dyn Node {
        match name {
            NodeName::Entry => &self.entry,
            NodeName::Coordinator => &self.coordinator,
            NodeName::CourseAdvisor => &self.course_advisor,
            NodeName::LearningPlanner => &self.learning_planner,
            NodeName::HumanInput => &self.human_input,
            NodeName::End => &self.end,
        }
    }

    /// 单轮内节点执行次数上限；正常情况下循环计数先触发
    fn step_limit(&self) -> usize {
        (self.max_loop_count as usize + 2) * 4
    }

    /// 执行一轮；返回 Err 只可能是取消、超时或对已完成对话的调用
    pub async fn run_turn(
        &self,
        mut state: ConversationState,
        cancel: CancellationToken,
    ) -> Result<TurnResult, TutorError> {
        if state.is_complete {
            return Err(TutorError::ConversationComplete(state.conversation_id));
        }
        if let Err(err) = state.validate() {
            state = self.recover(&err, state, "engine");
        }

        let mut current = if state.requires_human_input {
            NodeName::HumanInput
        } else {
            NodeName::Entry
        };
        let mut visited = Vec::new();

        let outcome = loop {
            if visited.len() >= self.step_limit() {
                let err = TutorError::generic("engine", "step limit exceeded");
                tracing::error!(conversation_id = %state.conversation_id, steps = visited.len(), "{err}");
                state = self.recover(&err, state, "engine");
                break TurnOutcome::AwaitingInput;
            }
            if current == NodeName::End {
                enforce_loop_limit(&mut state, self.max_loop_count);
            }

            visited.push(current);
            let recovered = self.execute_node(current, &mut state, &cancel).await?;

            if current == NodeName::End {
                break TurnOutcome::Completed;
            }
            if current == NodeName::HumanInput && state.requires_human_input {
                break TurnOutcome::AwaitingInput;
            }

            let next = if recovered && state.requires_human_input {
                Some(NodeName::HumanInput)
            } else {
                successor(current, &state, self.max_loop_count)
            };
            match next {
                Some(next) => current = next,
                None => break TurnOutcome::Completed,
            }
        };

        self.monitor.record_turn();
        tracing::info!(
            conversation_id = %state.conversation_id,
            outcome = ?outcome,
            steps = visited.len(),
            loop_count = state.loop_count,
            "turn finished"
        );
        Ok(TurnResult {
            state,
            outcome,
            visited,
        })
    }

    /// 执行单个节点；节点错误已恢复时返回 Ok(true)
    async fn execute_node(
        &self,
        name: NodeName,
        state: &mut ConversationState,
        cancel: &CancellationToken,
    ) -> Result<bool, TutorError> {
        let node = self.node(name);
        let started = Instant::now();
        tracing::debug!(conversation_id = %state.conversation_id, node = %name, "executing node");

        let conversation_id = state.conversation_id.clone();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = tokio::time::timeout(self.node_timeout, node.execute(state)) => Some(r),
        };
        let Some(result) = result else {
            tracing::warn!(conversation_id = %conversation_id, node = %name, "turn cancelled");
            return Err(TutorError::Cancelled);
        };

        let result = match result {
            Ok(result) => result,
            Err(_) => {
                self.monitor.record_node(name.as_str(), started.elapsed(), false);
                tracing::warn!(conversation_id = %conversation_id, node = %name, "node deadline exceeded");
                return Err(TutorError::DeadlineExceeded {
                    node: name.to_string(),
                    secs: self.node_timeout.as_secs(),
                });
            }
        };

        self.monitor.record_node(name.as_str(), started.elapsed(), result.is_ok());
        match result {
            Ok(()) => Ok(false),
            Err(err) => {
                let taken = std::mem::replace(state, ConversationState::new(None, "anonymous"));
                *state = self.recover(&err, taken, name.as_str());
                Ok(true)
            }
        }
    }
}
