//! 学习规划师：搜索学习路径资料 → 生成结构化计划（草稿）→ 请求用户确认

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::agents::{extract_json, format_history, user_request, Node};
use crate::core::{
    summarize_subtask_completion, AgentName, ConversationState, LearningPlan, Message, Milestone,
    NodeName, PlanStatus, TutorError,
};
use crate::llm::{GenerationParams, LlmClient};
use crate::tools::{ToolManager, WebResult};

const MAX_QUERIES: usize = 3;
const RESULTS_PER_QUERY: usize = 3;

/// 模型返回的计划 JSON
#[derive(Debug, Deserialize)]
struct PlanDraft {
    goal: String,
    milestones: Vec<Milestone>,
    estimated_duration: String,
    #[serde(default)]
    learning_advice: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

pub struct LearningPlanner {
    llm: Arc<dyn LlmClient>,
    params: GenerationParams,
    tools: Arc<ToolManager>,
}

impl LearningPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, params: GenerationParams, tools: Arc<ToolManager>) -> Self {
        Self { llm, params, tools }
    }

    async fn search_queries(&self, state: &ConversationState, goals: &str) -> Vec<String> {
        let prompt = format!(
            "基于用户的学习目标，决定需要搜索哪些学习路径和最佳实践资料。

学习目标：{goals}
技能水平：{skill}

请决定搜索关键词，用于查找学习路径和路线图、最佳实践和学习方法、技能树和知识体系。

以 JSON 格式返回，格式如下：
{{
    \"queries\": [\"Python数据分析学习路径\", \"数据分析技能树\"]
}}

请确保返回有效的 JSON 格式。",
            skill = state.user_profile.skill_level.map(|s| s.label()).unwrap_or("未知"),
        );

        let defaults = || vec![format!("{goals} 学习路径"), format!("{goals} 最佳实践")];
        let output = match self.llm.generate(&prompt, &self.params).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, "search query generation failed, using defaults");
                return defaults();
            }
        };

        let queries: Vec<String> = extract_json(&output)
            .and_then(|v| v.get("queries").cloned())
            .and_then(|q| serde_json::from_value(q).ok())
            .unwrap_or_default();
        let queries: Vec<String> = queries
            .into_iter()
            .filter(|q| !q.trim().is_empty())
            .take(MAX_QUERIES)
            .collect();
        if queries.is_empty() {
            defaults()
        } else {
            queries
        }
    }

    fn plan_prompt(&self, state: &ConversationState, goals: &str, resources: &[WebResult]) -> String {
        let profile = &state.user_profile;
        let courses = if state.course_candidates.is_empty() {
            "（暂无推荐课程）".to_string()
        } else {
            state
                .course_candidates
                .iter()
                .map(|c| format!("- {}（{}，{}）", c.title, c.difficulty, c.duration.as_deref().unwrap_or("时长未知")))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let resources = if resources.is_empty() {
            "（暂无参考资料）".to_string()
        } else {
            resources
                .iter()
                .map(|r| format!("- {}：{}", r.title, r.snippet))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "你是一个专业的学习规划师。请根据用户情况制定个性化学习计划。

用户信息：
- 学习目标：{goals}
- 可用时间：{time}
- 当前水平：{skill}
- 技术背景：{background}

当前任务：{task}

对话历史：
{history}

推荐课程：
{courses}

学习路径参考资料：
{resources}

请将目标分解为 3-5 个里程碑，每个里程碑包含学习内容、推荐课程、预计时间、验收标准和学习建议，并给出总体时间估算。

请以 JSON 格式返回学习计划：
{{
    \"goal\": \"学习目标描述\",
    \"milestones\": [
        {{
            \"title\": \"里程碑1标题\",
            \"content\": \"学习内容描述\",
            \"courses\": [\"课程1标题\"],
            \"estimated_time\": \"2-3周\",
            \"acceptance_criteria\": \"验收标准描述\",
            \"tips\": \"学习建议\"
        }}
    ],
    \"estimated_duration\": \"总体预计时间\",
    \"learning_advice\": \"整体学习建议\",
    \"summary\": \"给用户的友好总结和鼓励\"
}}

请返回有效的 JSON 格式。",
            time = profile.time_availability.as_deref().unwrap_or("未知"),
            skill = profile.skill_level.map(|s| s.label()).unwrap_or("未知"),
            background = profile.background.as_deref().unwrap_or("未知"),
            task = state.current_task.as_deref().unwrap_or("制定学习计划"),
            history = format_history(&state.messages, 5),
        )
    }

    /// 缺少 goal / milestones / estimated_duration 视为校验失败
    fn parse_plan(output: &str, state: &ConversationState) -> Result<(LearningPlan, String), TutorError> {
        let value = extract_json(output)
            .ok_or_else(|| TutorError::Validation("learning plan is not valid JSON".to_string()))?;
        let draft: PlanDraft = serde_json::from_value(value)
            .map_err(|e| TutorError::Validation(format!("learning plan is incomplete: {e}")))?;

        let message = match (draft.summary, draft.learning_advice) {
            (Some(summary), _) if !summary.trim().is_empty() => summary,
            (_, Some(advice)) if !advice.trim().is_empty() => advice,
            _ => output.to_string(),
        };
        let plan = LearningPlan {
            goal: draft.goal,
            milestones: draft.milestones,
            recommended_courses: state.course_candidates.clone(),
            estimated_duration: draft.estimated_duration,
            created_at: Utc::now(),
            status: PlanStatus::Draft,
        };
        Ok((plan, message))
    }
}

#[async_trait]
impl Node for LearningPlanner {
    fn name(&self) -> NodeName {
        NodeName::LearningPlanner
    }

    async fn execute(&self, state: &mut ConversationState) -> Result<(), TutorError> {
        let goals = if state.user_profile.learning_goals.is_empty() {
            user_request(state)
        } else {
            state.user_profile.learning_goals.join("、")
        };

        let queries = self.search_queries(state, &goals).await;
        let resources = self.tools.search_learning_resources(&queries, RESULTS_PER_QUERY).await;
        tracing::info!(
            conversation_id = %state.conversation_id,
            queries = queries.len(),
            resources = resources.len(),
            "learning planner drafting plan"
        );

        let prompt = self.plan_prompt(state, &goals, &resources);
        let output = self.llm.generate(&prompt, &self.params).await?;
        let (plan, message) = Self::parse_plan(&output, state)?;

        let plan_json = serde_json::to_value(&plan).unwrap_or_default();
        state.learning_plan = Some(plan);
        state.add_message(Message::from_agent(AgentName::LearningPlanner.as_str(), message));
        summarize_subtask_completion(state, "learning_plan_creation", &serde_json::json!({ "plan": plan_json }));
        state.request_human_input();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolsSection;
    use crate::llm::ScriptedLlmClient;
    use crate::observability::PerformanceMonitor;

    const PLAN: &str = r#"{"goal": "掌握 Python", "milestones": [{"title": "基础", "content": "语法", "courses": [], "estimated_time": "2周", "acceptance_criteria": "完成练习", "tips": "多写"}], "estimated_duration": "1个月", "summary": "这是您的计划"}"#;

    fn tools() -> Arc<ToolManager> {
        Arc::new(ToolManager::from_config(&ToolsSection::default(), Arc::new(PerformanceMonitor::new())))
    }

    #[tokio::test]
    async fn test_creates_draft_and_requests_review() {
        let llm = Arc::new(ScriptedLlmClient::with_texts([r#"{"queries": ["Python 学习路径"]}"#, PLAN]));
        let node = LearningPlanner::new(llm.clone(), GenerationParams::default(), tools());
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        state.user_profile.learning_goals = vec!["Python".into()];

        node.execute(&mut state).await.unwrap();
        let plan = state.learning_plan.as_ref().unwrap();
        assert_eq!(plan.status, PlanStatus::Draft);
        assert_eq!(plan.milestones.len(), 1);
        assert!(state.requires_human_input);
        assert_eq!(state.next_agent, Some(AgentName::HumanInput));
        assert!(state.messages.iter().any(|m| m.content == "这是您的计划"));
        assert!(state.last_message().unwrap().content.contains("预计学习时长 1个月"));
        assert!(llm.prompts()[1].contains("Python官方文档"));
    }

    #[tokio::test]
    async fn test_incomplete_plan_is_validation_error() {
        let llm = Arc::new(ScriptedLlmClient::with_texts([r#"{"queries": []}"#, r#"{"goal": "x"}"#]));
        let node = LearningPlanner::new(llm, GenerationParams::default(), tools());
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        state.add_message(Message::user("帮我制定计划"));
        let err = node.execute(&mut state).await.unwrap_err();
        assert!(matches!(err, TutorError::Validation(_)));
        assert!(state.learning_plan.is_none());
    }
}
