//! 人工输入节点：无反馈时给出提示并挂起；有反馈时按上下文（计划草稿 / 课程推荐 / 通用）处理

use async_trait::async_trait;

use crate::agents::Node;
use crate::core::{
    maintain_context_on_transition, summarize_subtask_completion, AgentName, ConversationState,
    Message, NodeName, PlanStatus, TutorError,
};

const PLAN_PROMPT: &str = "我已经为您制定了学习计划。请查看上述计划并提供反馈：
- 如果您同意该计划，请回复「同意」或「批准」
- 如果需要调整，请告诉我您的具体建议
- 如果想重新规划，请回复「重新规划」";

const COURSES_PROMPT: &str = "我已经为您推荐了一些课程。请提供您的反馈：
- 如果您对推荐满意，请回复「满意」
- 如果需要更多课程，请回复「更多推荐」
- 如果想调整推荐方向，请告诉我您的具体需求";

const GENERAL_PROMPT: &str = "请提供您的反馈或确认，以便我继续为您服务。";

const APPROVE_KEYWORDS: &[&str] = &["同意", "批准", "确认", "好的", "可以", "approve", "yes"];
const REVISE_KEYWORDS: &[&str] = &["重新", "不同", "修改", "调整", "redo", "change"];
const MORE_KEYWORDS: &[&str] = &["更多", "其他", "别的", "再推荐", "more", "other"];
const SATISFIED_KEYWORDS: &[&str] = &["满意", "好的", "可以", "不错", "satisfied", "good"];

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// 用户反馈所处的上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedbackContext {
    DraftPlan,
    Courses,
    General,
}

impl FeedbackContext {
    fn of(state: &ConversationState) -> Self {
        if matches!(&state.learning_plan, Some(plan) if plan.status == PlanStatus::Draft) {
            FeedbackContext::DraftPlan
        } else if !state.course_candidates.is_empty() {
            FeedbackContext::Courses
        } else {
            FeedbackContext::General
        }
    }

    fn prompt(&self) -> &'static str {
        match self {
            FeedbackContext::DraftPlan => PLAN_PROMPT,
            FeedbackContext::Courses => COURSES_PROMPT,
            FeedbackContext::General => GENERAL_PROMPT,
        }
    }
}

#[derive(Debug, Default)]
pub struct HumanInputNode;

impl HumanInputNode {
    pub fn new() -> Self {
        Self
    }

    fn on_plan_feedback(state: &mut ConversationState, feedback: &str) {
        if contains_any(feedback, APPROVE_KEYWORDS) {
            if let Some(plan) = state.learning_plan.as_mut() {
                plan.status = PlanStatus::Approved;
            }
            summarize_subtask_completion(state, "plan_approval", &serde_json::json!({ "status": "approved" }));
            tracing::info!(conversation_id = %state.conversation_id, "learning plan approved");
        } else if contains_any(feedback, REVISE_KEYWORDS) {
            state.current_task = Some("revise_learning_plan".to_string());
            state.add_message(Message::from_agent(
                "system",
                "好的，我会根据您的反馈调整学习计划。请告诉我您希望如何调整？",
            ));
        } else {
            state.current_task = Some("adjust_learning_plan_with_feedback".to_string());
            state.add_message(Message::from_agent(
                "system",
                "我理解了您的反馈。让我根据您的建议调整学习计划。",
            ));
        }
    }

    /// 「更多」优先于「满意」
    fn on_course_feedback(state: &mut ConversationState, feedback: &str) {
        let feedback_type = if contains_any(feedback, MORE_KEYWORDS) {
            state.current_task = Some("find_more_courses".to_string());
            "more"
        } else if contains_any(feedback, SATISFIED_KEYWORDS) {
            "satisfied"
        } else {
            state.current_task = Some("adjust_course_recommendations".to_string());
            "adjust"
        };
        summarize_subtask_completion(
            state,
            "course_recommendation_feedback",
            &serde_json::json!({ "feedback_type": feedback_type }),
        );
    }
}

#[async_trait]
impl Node for HumanInputNode {
    fn name(&self) -> NodeName {
        NodeName::HumanInput
    }

    async fn execute(&self, state: &mut ConversationState) -> Result<(), TutorError> {
        let feedback = state
            .human_feedback
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(String::from);
        let context = FeedbackContext::of(state);

        let Some(feedback) = feedback else {
            let prompt = context.prompt();
            if state.last_message().map(|m| m.content.as_str()) != Some(prompt) {
                state.add_message(Message::from_agent("system", prompt));
            }
            state.human_feedback = None;
            state.request_human_input();
            tracing::info!(conversation_id = %state.conversation_id, "waiting for human feedback");
            return Ok(());
        };

        state.add_message(Message::user(feedback.as_str()));
        let lowered = feedback.to_lowercase();
        match context {
            FeedbackContext::DraftPlan => Self::on_plan_feedback(state, &lowered),
            FeedbackContext::Courses => Self::on_course_feedback(state, &lowered),
            FeedbackContext::General => {
                state.add_message(Message::from_agent("system", "感谢您的反馈。让我继续为您服务。"));
            }
        }

        state.clear_human_input_request();
        maintain_context_on_transition(state, AgentName::HumanInput, AgentName::Coordinator);
        state.next_agent = Some(AgentName::Coordinator);
        tracing::info!(
            conversation_id = %state.conversation_id,
            current_task = state.current_task.as_deref().unwrap_or(""),
            "human feedback processed"
        );
        Ok(())
    }
}
