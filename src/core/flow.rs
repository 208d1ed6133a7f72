//! 上下文与分支控制：阶段推断、话题栈、子任务总结、一致性与健康检查
//!
//! 话题栈存放在 user_profile.preferences.conversation_stack，后进先出。

use chrono::Utc;
use serde::Serialize;

use crate::core::{
    AgentName, ContextSnapshot, ConversationState, Message, MessageDigest, Phase, PlanStatus,
};

const SNAPSHOT_MESSAGES: usize = 5;
const SNAPSHOT_CONTENT_CHARS: usize = 100;

const SWITCH_KEYWORDS: &[&str] = &[
    "换个话题",
    "另外",
    "还有",
    "对了",
    "顺便问一下",
    "我想问",
    "我还想",
    "by the way",
    "also",
    "another question",
];

const RETURN_KEYWORDS: &[&str] = &["回到", "之前", "刚才", "前面", "earlier", "previous", "back to"];

/// 话题变化类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicShift {
    /// 开启新话题
    NewTopic,
    /// 回到上一个话题
    PreviousTopic,
}

/// 话题切换分类器；默认实现为关键词匹配，可替换为模型分类
pub trait TopicClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Option<TopicShift>;
}

/// 关键词分类：小写后子串匹配，切换关键词优先于返回关键词
#[derive(Debug, Default, Clone)]
pub struct KeywordTopicClassifier;

impl TopicClassifier for KeywordTopicClassifier {
    fn classify(&self, text: &str) -> Option<TopicShift> {
        let lower = text.to_lowercase();
        if SWITCH_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Some(TopicShift::NewTopic)
        } else if RETURN_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Some(TopicShift::PreviousTopic)
        } else {
            None
        }
    }
}

/// 只看最近一条用户消息
pub fn detect_topic_switch(
    state: &ConversationState,
    classifier: &dyn TopicClassifier,
) -> Option<TopicShift> {
    let last_user = state.last_user_message()?;
    let shift = classifier.classify(&last_user.content);
    if let Some(shift) = shift {
        tracing::debug!(conversation_id = %state.conversation_id, ?shift, "topic shift detected");
    }
    shift
}

/// 按优先级推断当前阶段
pub fn current_phase(state: &ConversationState) -> Phase {
    match &state.learning_plan {
        Some(plan) if plan.status == PlanStatus::Approved => Phase::PlanExecution,
        Some(_) => Phase::PlanReview,
        None if !state.course_candidates.is_empty() => Phase::CourseSelection,
        None if !state.user_profile.learning_goals.is_empty() => Phase::GoalClarification,
        None => Phase::InitialInquiry,
    }
}

/// 提取当前上下文快照
pub fn extract_context(state: &ConversationState) -> ContextSnapshot {
    let start = state.messages.len().saturating_sub(SNAPSHOT_MESSAGES);
    let recent_messages = state.messages[start..]
        .iter()
        .map(|m| MessageDigest {
            role: m.role,
            content: m.content.chars().take(SNAPSHOT_CONTENT_CHARS).collect(),
            agent: m.agent.clone(),
        })
        .collect();

    ContextSnapshot {
        phase: current_phase(state),
        recent_messages,
        user_goals: state.user_profile.learning_goals.clone(),
        has_courses: !state.course_candidates.is_empty(),
        num_courses: state.course_candidates.len(),
        has_plan: state.learning_plan.is_some(),
        plan_status: state.learning_plan.as_ref().map(|p| p.status),
        current_task: state.current_task.clone(),
        timestamp: Utc::now(),
    }
}

/// 保存当前上下文并切到新话题
pub fn handle_topic_switch(state: &mut ConversationState) {
    let snapshot = extract_context(state);
    tracing::info!(
        conversation_id = %state.conversation_id,
        phase = snapshot.phase.label(),
        depth = state.conversation_stack().len() + 1,
        "pushing topic snapshot"
    );
    state.user_profile.preferences.conversation_stack.push(snapshot);
    state.add_message(Message::from_agent(
        "system",
        "好的，我明白了。让我们来讨论这个新话题。",
    ));
    state.current_task = None;
    state.next_agent = Some(AgentName::Coordinator);
}

/// 弹出最近的快照并恢复任务；栈为空时只追加提示
pub fn return_to_previous_topic(state: &mut ConversationState) {
    let Some(snapshot) = state.user_profile.preferences.conversation_stack.pop() else {
        state.add_message(Message::from_agent(
            "system",
            "我们还没有讨论过其他话题。您想讨论什么呢？",
        ));
        return;
    };

    state.add_message(Message::from_agent(
        "system",
        format!("好的，让我们回到{}。", snapshot.phase.label()),
    ));
    if snapshot.current_task.is_some() {
        state.current_task = snapshot.current_task;
    }
    state.next_agent = Some(AgentName::Coordinator);
}

/// 子任务完成后追加总结消息；未知子任务给出通用总结
pub fn summarize_subtask_completion(
    state: &mut ConversationState,
    subtask: &str,
    result: &serde_json::Value,
) {
    let text = match subtask {
        "course_search" => {
            let n = result
                .get("num_courses")
                .and_then(|n| n.as_u64())
                .map(|n| n as usize)
                .or_else(|| result.get("courses").and_then(|c| c.as_array()).map(|c| c.len()))
                .unwrap_or(0);
            format!("✓ 课程搜索完成：找到了 {n} 门相关课程。\n您可以查看上述推荐，或告诉我您的反馈。")
        }
        "learning_plan_creation" => {
            let plan = result.get("plan").unwrap_or(result);
            let milestones = match plan.get("milestones") {
                Some(serde_json::Value::Array(m)) => m.len(),
                Some(m) => m.as_u64().map(|m| m as usize).unwrap_or(0),
                None => 0,
            };
            let duration = plan
                .get("estimated_duration")
                .and_then(|d| d.as_str())
                .filter(|d| !d.is_empty())
                .unwrap_or("未知");
            format!(
                "✓ 学习计划制定完成：包含 {milestones} 个里程碑，预计学习时长 {duration}。\n请查看上述计划并告诉我您的意见。"
            )
        }
        "plan_approval" => {
            if result.get("status").and_then(|s| s.as_str()) == Some("approved") {
                "✓ 学习计划已确认。\n接下来我会继续协助您执行这个计划。".to_string()
            } else {
                "✓ 已收到您的反馈。\n让我根据您的建议调整计划。".to_string()
            }
        }
        "course_recommendation_feedback" => {
            match result.get("feedback_type").and_then(|f| f.as_str()) {
                Some("satisfied") => {
                    "✓ 很高兴您对推荐满意。\n如果需要制定学习计划或有其他问题，请告诉我。".to_string()
                }
                Some("more") => "✓ 收到，让我为您寻找更多课程。".to_string(),
                _ => "✓ 已收到您的反馈。\n让我根据您的需求调整推荐。".to_string(),
            }
        }
        other => format!("✓ {other} 已完成。"),
    };
    state.add_message(Message::from_agent("system", text));
}

/// 一致性检查结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub ok: bool,
    pub violations: Vec<String>,
}

/// 检查软约束并返回全部违例；不修改状态
pub fn ensure_context_consistency(state: &ConversationState) -> ConsistencyReport {
    let mut violations = Vec::new();

    if let Some(plan) = &state.learning_plan {
        for course in plan.recommended_courses.iter().filter(|c| !c.url.is_empty()) {
            if !state.course_candidates.iter().any(|c| c.url == course.url) {
                violations.push(format!(
                    "Learning plan references course not in candidates: {}",
                    course.title
                ));
            }
        }
    }

    if state.requires_human_input && state.next_agent != Some(AgentName::HumanInput) {
        violations.push(format!(
            "requires_human_input is True but next_agent is {}",
            agent_label(state.next_agent)
        ));
    }

    if state.is_complete && !matches!(state.next_agent, None | Some(AgentName::End)) {
        violations.push(format!(
            "is_complete is True but next_agent is {}",
            agent_label(state.next_agent)
        ));
    }

    ConsistencyReport {
        ok: violations.is_empty(),
        violations,
    }
}

fn agent_label(agent: Option<AgentName>) -> String {
    agent.map(|a| a.to_string()).unwrap_or_else(|| "None".to_string())
}

/// 健康等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Warning,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub health: Health,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub loop_count: u32,
    pub message_count: usize,
}

/// 对话健康检查：循环次数、进展停滞、目标缺失、一致性
pub fn check_conversation_health(state: &ConversationState, max_loop_count: u32) -> HealthReport {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    if state.loop_count > max_loop_count.saturating_sub(2) {
        warnings.push(format!("High loop count: {}", state.loop_count));
    }
    if state.loop_count > max_loop_count {
        issues.push(format!("Loop count exceeded limit: {}", state.loop_count));
    }

    if state.messages.len() > 10
        && state.course_candidates.is_empty()
        && state.learning_plan.is_none()
    {
        warnings.push("No progress: no courses or plan after 10+ messages".to_string());
    }

    if state.messages.len() > 3 && state.user_profile.learning_goals.is_empty() {
        warnings.push("User goals not captured after 3+ messages".to_string());
    }

    let report = ensure_context_consistency(state);
    issues.extend(
        report
            .violations
            .into_iter()
            .map(|v| format!("Context inconsistency: {v}")),
    );

    let health = if !issues.is_empty() {
        Health::Unhealthy
    } else if !warnings.is_empty() {
        Health::Warning
    } else {
        Health::Healthy
    };

    HealthReport {
        health,
        issues,
        warnings,
        loop_count: state.loop_count,
        message_count: state.messages.len(),
    }
}

/// 智能体交接时的过渡提示
pub fn maintain_context_on_transition(state: &mut ConversationState, from: AgentName, to: AgentName) {
    let notice = match (from, to) {
        (AgentName::Coordinator, AgentName::CourseAdvisor) => Some("让我为您查找相关课程..."),
        (AgentName::Coordinator, AgentName::LearningPlanner) => Some("让我为您制定学习计划..."),
        _ => None,
    };
    if let Some(notice) = notice {
        state.add_message(Message::from_agent(from.as_str(), notice));
    }
    tracing::debug!(conversation_id = %state.conversation_id, %from, %to, "agent transition");
}

/// 注入智能体提示词的上下文摘要
pub fn build_context_summary(state: &ConversationState) -> String {
    let profile = &state.user_profile;
    let mut parts = Vec::new();

    if !profile.learning_goals.is_empty() {
        parts.push(format!("用户的学习目标：{}", profile.learning_goals.join("、")));
    }
    if let Some(background) = &profile.background {
        parts.push(format!("用户背景：{background}"));
    }
    if let Some(level) = profile.skill_level {
        parts.push(format!("技能水平：{}", level.label()));
    }
    if !state.course_candidates.is_empty() {
        parts.push(format!("已推荐 {} 门课程", state.course_candidates.len()));
    }
    if let Some(plan) = &state.learning_plan {
        parts.push(format!("学习计划状态：{}", plan.status.label()));
    }
    if let Some(task) = &state.current_task {
        parts.push(format!("当前任务：{task}"));
    }

    if parts.is_empty() {
        "对话上下文：这是一个新的对话。".to_string()
    } else {
        let lines: Vec<String> = parts.iter().map(|p| format!("- {p}")).collect();
        format!("对话上下文：\n{}", lines.join("\n"))
    }
}

/// 整个对话的诊断摘要
pub fn create_conversation_summary(state: &ConversationState) -> String {
    let profile = &state.user_profile;
    let mut parts = vec![
        format!("对话 ID: {}", state.conversation_id),
        format!("消息数量: {}", state.messages.len()),
        format!("循环计数: {}", state.loop_count),
    ];

    if !profile.learning_goals.is_empty() {
        parts.push(format!("学习目标: {}", profile.learning_goals.join("、")));
    }
    if let Some(level) = profile.skill_level {
        parts.push(format!("技能水平: {}", level.label()));
    }
    if !state.course_candidates.is_empty() {
        parts.push(format!("推荐课程: {} 门", state.course_candidates.len()));
    }
    if let Some(plan) = &state.learning_plan {
        parts.push(format!(
            "学习计划: {} ({} 个里程碑)",
            plan.status.label(),
            plan.milestones.len()
        ));
    }
    if let Some(task) = &state.current_task {
        parts.push(format!("当前任务: {task}"));
    }
    if let Some(next) = state.next_agent {
        parts.push(format!("下一个智能体: {next}"));
    }

    parts.join("\n")
}
