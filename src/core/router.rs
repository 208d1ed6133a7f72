//! 路由状态机：固定节点集合与边
//!
//! route 为纯函数，严格按优先级匹配：循环超限 → 已完成 → 需用户输入 → next_agent → 兜底结束。

use std::fmt;

use crate::core::{AgentName, ConversationState, Message};

pub const DEFAULT_MAX_LOOP_COUNT: u32 = 10;

pub const LOOP_LIMIT_NOTICE: &str = "对话已达到最大轮次限制。如需继续，请开始新的对话。";

/// 图中的节点
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeName {
    Entry,
    Coordinator,
    CourseAdvisor,
    LearningPlanner,
    HumanInput,
    End,
}

impl NodeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeName::Entry => "entry",
            NodeName::Coordinator => "coordinator",
            NodeName::CourseAdvisor => "course_advisor",
            NodeName::LearningPlanner => "learning_planner",
            NodeName::HumanInput => "human_input",
            NodeName::End => "end",
        }
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AgentName> for NodeName {
    fn from(agent: AgentName) -> Self {
        match agent {
            AgentName::Coordinator => NodeName::Coordinator,
            AgentName::CourseAdvisor => NodeName::CourseAdvisor,
            AgentName::LearningPlanner => NodeName::LearningPlanner,
            AgentName::HumanInput => NodeName::HumanInput,
            AgentName::End => NodeName::End,
        }
    }
}

/// 协调器之后的条件路由
pub fn route(state: &ConversationState, max_loop_count: u32) -> NodeName {
    if state.loop_count > max_loop_count {
        tracing::warn!(
            conversation_id = %state.conversation_id,
            loop_count = state.loop_count,
            "loop limit exceeded, routing to end"
        );
        return NodeName::End;
    }
    if state.is_complete {
        return NodeName::End;
    }
    if state.requires_human_input {
        return NodeName::HumanInput;
    }
    match state.next_agent {
        Some(agent) => agent.into(),
        None => {
            tracing::debug!(conversation_id = %state.conversation_id, "no next_agent, routing to end");
            NodeName::End
        }
    }
}

/// 节点执行后的下一个节点；End 为终点
pub fn successor(node: NodeName, state: &ConversationState, max_loop_count: u32) -> Option<NodeName> {
    match node {
        NodeName::Entry => Some(NodeName::Coordinator),
        NodeName::Coordinator => Some(route(state, max_loop_count)),
        NodeName::CourseAdvisor => Some(NodeName::Coordinator),
        NodeName::LearningPlanner => Some(NodeName::HumanInput),
        NodeName::HumanInput => Some(NodeName::Coordinator),
        NodeName::End => None,
    }
}

/// 循环超限时追加提示并标记完成；对已终止的状态重复调用不产生变化
pub fn enforce_loop_limit(state: &mut ConversationState, max_loop_count: u32) -> bool {
    if state.loop_count <= max_loop_count {
        return false;
    }
    if !state.is_complete {
        state.add_message(Message::from_agent("system", LOOP_LIMIT_NOTICE));
        state.mark_complete();
    }
    true
}
