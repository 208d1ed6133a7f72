//! 对话状态：在所有节点之间传递的共享记录
//!
//! 消息只追加不修改；next_agent / skill_level / 计划状态均为封闭枚举，来自 LLM 或存储的文本在边界处解析。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::TutorError;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// 提示词中使用的中文标签
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "用户",
            Role::Assistant => "助手",
            Role::System => "系统",
        }
    }
}

/// 单条消息；追加后不可变
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// 发送消息的智能体（用户消息为空）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            agent: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            agent: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            timestamp: Utc::now(),
            agent: None,
        }
    }

    /// 由某个智能体发出的助手消息
    pub fn from_agent(agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            agent: Some(agent.into()),
            ..Self::assistant(content)
        }
    }
}

/// 可路由的智能体（next_agent 的封闭取值）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    /// 协调器
    Coordinator,
    /// 课程顾问
    CourseAdvisor,
    /// 学习规划师
    LearningPlanner,
    /// 等待用户反馈
    HumanInput,
    /// 结束对话
    End,
}

impl AgentName {
    pub const ALL: [AgentName; 5] = [
        AgentName::Coordinator,
        AgentName::CourseAdvisor,
        AgentName::LearningPlanner,
        AgentName::HumanInput,
        AgentName::End,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentName::Coordinator => "coordinator",
            AgentName::CourseAdvisor => "course_advisor",
            AgentName::LearningPlanner => "learning_planner",
            AgentName::HumanInput => "human_input",
            AgentName::End => "end",
        }
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentName {
    type Err = TutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        AgentName::ALL
            .into_iter()
            .find(|a| a.as_str() == name)
            .ok_or_else(|| TutorError::RoutingDecision(format!("unknown agent: {s}")))
    }
}

/// 存储中的未知智能体名按「无」处理，交给路由的兜底规则
fn lenient_agent<'de, D>(deserializer: D) -> Result<Option<AgentName>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

/// 技能水平
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl SkillLevel {
    pub fn label(&self) -> &'static str {
        match self {
            SkillLevel::Beginner => "初学者",
            SkillLevel::Intermediate => "中级",
            SkillLevel::Advanced => "高级",
        }
    }
}

/// 对话阶段（由 extract_context 推断）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// 计划已批准，执行中
    PlanExecution,
    /// 计划待审核
    PlanReview,
    /// 已有课程候选
    CourseSelection,
    /// 已知学习目标
    GoalClarification,
    /// 初始咨询
    InitialInquiry,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::PlanExecution => "学习计划执行",
            Phase::PlanReview => "学习计划审核",
            Phase::CourseSelection => "课程选择",
            Phase::GoalClarification => "目标明确",
            Phase::InitialInquiry => "初始咨询",
        }
    }
}

/// 学习计划状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Approved,
    InProgress,
}

impl PlanStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PlanStatus::Draft => "草稿",
            PlanStatus::Approved => "已批准",
            PlanStatus::InProgress => "进行中",
        }
    }
}

/// 快照中保存的消息摘要（内容截断到 100 字符）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageDigest {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// 话题切换时压栈的上下文快照；入栈后不可变
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub phase: Phase,
    pub recent_messages: Vec<MessageDigest>,
    pub user_goals: Vec<String>,
    pub has_courses: bool,
    pub num_courses: usize,
    pub has_plan: bool,
    pub plan_status: Option<PlanStatus>,
    pub current_task: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// 用户偏好：保留键 conversation_stack 为话题栈（后进先出），其余键原样保留
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversation_stack: Vec<ContextSnapshot>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// 用户画像
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub skill_level: Option<SkillLevel>,
    #[serde(default)]
    pub learning_goals: Vec<String>,
    #[serde(default)]
    pub time_availability: Option<String>,
    #[serde(default)]
    pub preferences: Preferences,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            background: None,
            skill_level: None,
            learning_goals: Vec::new(),
            time_availability: None,
            preferences: Preferences::default(),
        }
    }
}

/// 课程信息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CourseInfo {
    pub title: String,
    pub url: String,
    pub description: String,
    pub difficulty: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub rating: Option<f32>,
    /// 来源：geektime / web_search
    pub source: String,
}

/// 学习计划中的里程碑
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Milestone {
    pub title: String,
    pub content: String,
    pub courses: Vec<String>,
    pub estimated_time: String,
    pub acceptance_criteria: String,
    pub tips: String,
}

/// 学习计划
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LearningPlan {
    pub goal: String,
    pub milestones: Vec<Milestone>,
    pub recommended_courses: Vec<CourseInfo>,
    pub estimated_duration: String,
    pub created_at: DateTime<Utc>,
    pub status: PlanStatus,
}

/// 对话状态：会话 ID 不变，消息只追加
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub user_profile: UserProfile,
    #[serde(default)]
    pub current_task: Option<String>,
    #[serde(default, deserialize_with = "lenient_agent")]
    pub next_agent: Option<AgentName>,
    #[serde(default)]
    pub course_candidates: Vec<CourseInfo>,
    #[serde(default)]
    pub learning_plan: Option<LearningPlan>,
    #[serde(default)]
    pub requires_human_input: bool,
    #[serde(default)]
    pub human_feedback: Option<String>,
    #[serde(default)]
    pub loop_count: u32,
    #[serde(default)]
    pub is_complete: bool,
}

impl ConversationState {
    /// 新对话；conversation_id 为空时生成 UUID
    pub fn new(conversation_id: Option<String>, user_id: impl Into<String>) -> Self {
        let conversation_id = conversation_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            conversation_id,
            messages: Vec::new(),
            user_profile: UserProfile::new(user_id),
            current_task: None,
            next_agent: None,
            course_candidates: Vec::new(),
            learning_plan: None,
            requires_human_input: false,
            human_feedback: None,
            loop_count: 0,
            is_complete: false,
        }
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// 最近一条用户消息
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    pub fn increment_loop_count(&mut self) -> u32 {
        self.loop_count += 1;
        self.loop_count
    }

    pub fn reset_loop_count(&mut self) {
        self.loop_count = 0;
    }

    pub fn mark_complete(&mut self) {
        self.is_complete = true;
        self.next_agent = Some(AgentName::End);
    }

    pub fn request_human_input(&mut self) {
        self.requires_human_input = true;
        self.next_agent = Some(AgentName::HumanInput);
    }

    pub fn clear_human_input_request(&mut self) {
        self.requires_human_input = false;
        self.human_feedback = None;
    }

    /// 话题栈（user_profile.preferences 下的保留键）
    pub fn conversation_stack(&self) -> &[ContextSnapshot] {
        &self.user_profile.preferences.conversation_stack
    }

    /// 校验类型系统表达不了的结构约束；失败视为状态损坏
    pub fn validate(&self) -> Result<(), TutorError> {
        if self.conversation_id.trim().is_empty() {
            return Err(TutorError::StateCorruption(
                "conversation_id is empty".to_string(),
            ));
        }
        if self.user_profile.user_id.trim().is_empty() {
            return Err(TutorError::StateCorruption(
                "user_profile.user_id is empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_name_parse() {
        assert_eq!("course_advisor".parse::<AgentName>().unwrap(), AgentName::CourseAdvisor);
        assert_eq!(" END ".parse::<AgentName>().unwrap(), AgentName::End);
        assert!("bogus".parse::<AgentName>().is_err());
    }

    #[test]
    fn test_new_state_generates_id() {
        let state = ConversationState::new(None, "u1");
        assert!(!state.conversation_id.is_empty());
        let state = ConversationState::new(Some("  ".into()), "u1");
        assert!(!state.conversation_id.trim().is_empty());
        let state = ConversationState::new(Some("abc".into()), "u1");
        assert_eq!(state.conversation_id, "abc");
    }

    #[test]
    fn test_unknown_next_agent_loads_as_none() {
        let mut value = serde_json::to_value(ConversationState::new(Some("abc".into()), "u1")).unwrap();
        value["next_agent"] = serde_json::json!("bogus");
        let state: ConversationState = serde_json::from_value(value).unwrap();
        assert_eq!(state.next_agent, None);
    }

    #[test]
    fn test_preferences_keep_extra_keys() {
        let json = serde_json::json!({
            "theme": "dark",
            "conversation_stack": []
        });
        let prefs: Preferences = serde_json::from_value(json).unwrap();
        assert!(prefs.conversation_stack.is_empty());
        assert_eq!(prefs.extra.get("theme"), Some(&serde_json::json!("dark")));
    }

    #[test]
    fn test_validate_rejects_empty_ids() {
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        assert!(state.validate().is_ok());
        state.user_profile.user_id.clear();
        assert!(matches!(state.validate(), Err(TutorError::StateCorruption(_))));
    }

    #[test]
    fn test_helpers() {
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        state.request_human_input();
        assert!(state.requires_human_input);
        assert_eq!(state.next_agent, Some(AgentName::HumanInput));
        state.human_feedback = Some("好的".into());
        state.clear_human_input_request();
        assert!(!state.requires_human_input);
        assert!(state.human_feedback.is_none());
        state.mark_complete();
        assert!(state.is_complete);
        assert_eq!(state.next_agent, Some(AgentName::End));
        assert_eq!(state.increment_loop_count(), 1);
    }
}
