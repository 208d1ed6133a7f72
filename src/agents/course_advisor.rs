//! 课程顾问：选择工具 → 搜索课程与资源 → 生成推荐

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Deserialize;

use crate::agents::{extract_json, format_history, user_request, Node};
use crate::core::{
    build_context_summary, summarize_subtask_completion, AgentName, ConversationState, CourseInfo,
    Message, NodeName, TutorError,
};
use crate::llm::{GenerationParams, LlmClient};
use crate::tools::{ToolManager, WebResult};

/// LLM 选择的一次工具调用
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolSelection {
    pub name: String,
    pub query: String,
}

fn default_selections(request: &str) -> Vec<ToolSelection> {
    vec![
        ToolSelection {
            name: "search_geektime".to_string(),
            query: request.to_string(),
        },
        ToolSelection {
            name: "web_search".to_string(),
            query: format!("{request} 学习资源"),
        },
    ]
}

pub struct CourseAdvisor {
    llm: Arc<dyn LlmClient>,
    params: GenerationParams,
    tools: Arc<ToolManager>,
}

impl CourseAdvisor {
    pub fn new(llm: Arc<dyn LlmClient>, params: GenerationParams, tools: Arc<ToolManager>) -> Self {
        Self { llm, params, tools }
    }

    /// 选择失败时使用默认组合（课程目录 + 网络搜索）
    async fn select_tools(&self, state: &ConversationState, request: &str) -> Vec<ToolSelection> {
        let prompt = format!(
            "基于用户的需求，决定需要使用哪些工具来搜索课程信息。

用户需求：{request}
用户学习目标：{goals}

可用工具：
1. search_geektime: 搜索极客时间课程（适合技术类课程）
2. web_search: 网络搜索补充资源（适合查找教程、文档、最佳实践）

以 JSON 格式返回，格式如下：
{{
    \"tools\": [
        {{\"name\": \"search_geektime\", \"query\": \"Python数据分析\"}},
        {{\"name\": \"web_search\", \"query\": \"Python数据分析教程\"}}
    ]
}}

请确保返回有效的 JSON 格式。",
            goals = state.user_profile.learning_goals.join("、"),
        );

        let output = match self.llm.generate(&prompt, &self.params).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, "tool selection failed, using defaults");
                return default_selections(request);
            }
        };

        let selections: Vec<ToolSelection> = extract_json(&output)
            .and_then(|v| v.get("tools").cloned())
            .and_then(|t| serde_json::from_value(t).ok())
            .unwrap_or_default();
        let selections: Vec<ToolSelection> = selections
            .into_iter()
            .filter(|s| matches!(s.name.as_str(), "search_geektime" | "web_search") && !s.query.trim().is_empty())
            .collect();

        if selections.is_empty() {
            default_selections(request)
        } else {
            selections
        }
    }

    /// 并发执行所选工具；课程搜索全部失败时返回 ToolExecution
    async fn run_tools(&self, selections: &[ToolSelection]) -> Result<(Vec<CourseInfo>, Vec<WebResult>), TutorError> {
        let course_queries: Vec<&str> = selections
            .iter()
            .filter(|s| s.name == "search_geektime")
            .map(|s| s.query.as_str())
            .collect();
        let web_queries: Vec<&str> = selections
            .iter()
            .filter(|s| s.name == "web_search")
            .map(|s| s.query.as_str())
            .collect();

        let max = self.tools.max_results();
        let (course_results, web_results) = tokio::join!(
            join_all(course_queries.iter().map(|q| self.tools.search_courses(q))),
            join_all(web_queries.iter().map(|q| self.tools.search_web(q, max))),
        );

        let mut courses: Vec<CourseInfo> = Vec::new();
        let mut last_error = None;
        for result in course_results {
            match result {
                Ok(outcome) => {
                    if outcome.fallback_used {
                        tracing::info!(tool = %outcome.tool_name, "course search served by fallback");
                    }
                    for course in outcome.data {
                        if !courses.iter().any(|c| c.url == course.url) {
                            courses.push(course);
                        }
                    }
                }
                Err(e) => last_error = Some(e),
            }
        }
        if courses.is_empty() {
            if let Some(err) = last_error {
                return Err(err);
            }
        }

        let mut resources = Vec::new();
        for result in web_results {
            match result {
                Ok(outcome) => resources.extend(outcome.data),
                Err(e) => tracing::warn!(error = %e, "web search failed, continuing without resources"),
            }
        }
        Ok((courses, resources))
    }

    fn recommendation_prompt(
        &self,
        state: &ConversationState,
        request: &str,
        courses: &[CourseInfo],
        resources: &[WebResult],
    ) -> String {
        let profile = &state.user_profile;
        let courses_text = if courses.is_empty() {
            "（暂无课程信息）".to_string()
        } else {
            courses
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    format!(
                        "{}. {}\n   链接：{}\n   简介：{}\n   难度：{}  时长：{}  评分：{}",
                        i + 1,
                        c.title,
                        c.url,
                        c.description,
                        c.difficulty,
                        c.duration.as_deref().unwrap_or("未知"),
                        c.rating.map(|r| r.to_string()).unwrap_or_else(|| "暂无".to_string()),
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        let resources_text = if resources.is_empty() {
            "（暂无补充资源）".to_string()
        } else {
            resources
                .iter()
                .map(|r| format!("- {}（{}）：{}", r.title, r.url, r.snippet))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "你是一个专业的课程顾问。你的职责是根据用户的学习目标和背景推荐合适的课程。

用户画像：
- 背景：{background}
- 技能水平：{skill}
- 学习目标：{goals}
- 可用时间：{time}

{context}

当前任务：{request}

对话历史：
{history}

可用的课程信息：
{courses_text}

补充学习资源：
{resources_text}

请从可用课程中选择 3-5 门最合适的课程，说明每门课程为什么适合用户、难度是否匹配、如何帮助实现目标，并给出学习建议。
请用友好、专业的语气回复用户。",
            background = profile.background.as_deref().unwrap_or("未知"),
            skill = profile.skill_level.map(|s| s.label()).unwrap_or("未知"),
            goals = profile.learning_goals.join("、"),
            time = profile.time_availability.as_deref().unwrap_or("未知"),
            context = build_context_summary(state),
            history = format_history(&state.messages, 5),
        )
    }
}

#[async_trait]
impl Node for CourseAdvisor {
    fn name(&self) -> NodeName {
        NodeName::CourseAdvisor
    }

    async fn execute(&self, state: &mut ConversationState) -> Result<(), TutorError> {
        let request = user_request(state);
        let selections = self.select_tools(state, &request).await;
        tracing::info!(conversation_id = %state.conversation_id, tools = selections.len(), "course advisor searching");

        let (courses, resources) = self.run_tools(&selections).await?;
        let prompt = self.recommendation_prompt(state, &request, &courses, &resources);
        let recommendation = self.llm.generate(&prompt, &self.params).await?;

        let found = serde_json::to_value(&courses).unwrap_or_default();
        for course in courses {
            if !state.course_candidates.iter().any(|c| c.url == course.url) {
                state.course_candidates.push(course);
            }
        }
        state.add_message(Message::from_agent(AgentName::CourseAdvisor.as_str(), recommendation));
        summarize_subtask_completion(state, "course_search", &serde_json::json!({ "courses": found }));
        state.next_agent = Some(AgentName::Coordinator);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolsSection;
    use crate::llm::{LlmError, ScriptedLlmClient};
    use crate::observability::PerformanceMonitor;

    fn tools() -> Arc<ToolManager> {
        Arc::new(ToolManager::from_config(&ToolsSection::default(), Arc::new(PerformanceMonitor::new())))
    }

    #[tokio::test]
    async fn test_recommends_and_summarizes() {
        let llm = Arc::new(ScriptedLlmClient::with_texts([
            r#"{"tools": [{"name": "search_geektime", "query": "Python"}]}"#,
            "推荐您先学习 Python核心技术与实战。",
        ]));
        let node = CourseAdvisor::new(llm.clone(), GenerationParams::default(), tools());
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        state.add_message(Message::user("我想学 Python"));

        node.execute(&mut state).await.unwrap();
        assert_eq!(state.course_candidates.len(), 2);
        assert_eq!(state.next_agent, Some(AgentName::Coordinator));
        let last = state.last_message().unwrap();
        assert!(last.content.contains("找到了 2 门"));
        assert!(llm.prompts()[1].contains("Python核心技术与实战"));
    }

    #[tokio::test]
    async fn test_selection_failure_uses_defaults() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::Api("500".into())),
            Ok("推荐如下。".into()),
        ]));
        let node = CourseAdvisor::new(llm.clone(), GenerationParams::default(), tools());
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        state.current_task = Some("机器学习".into());

        node.execute(&mut state).await.unwrap();
        assert_eq!(state.course_candidates.len(), 2);
        assert!(llm.prompts()[1].contains("Coursera"));
    }

    #[tokio::test]
    async fn test_repeated_search_does_not_duplicate_candidates() {
        let llm = Arc::new(ScriptedLlmClient::with_texts([
            r#"{"tools": [{"name": "search_geektime", "query": "Python"}]}"#,
            "第一次推荐",
            r#"{"tools": [{"name": "search_geektime", "query": "Python"}]}"#,
            "第二次推荐",
        ]));
        let node = CourseAdvisor::new(llm, GenerationParams::default(), tools());
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        state.add_message(Message::user("Python"));
        node.execute(&mut state).await.unwrap();
        node.execute(&mut state).await.unwrap();
        assert_eq!(state.course_candidates.len(), 2);
    }
}
