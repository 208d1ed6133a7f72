//! 协调器：计数循环、处理话题切换、让 LLM 决定下一个智能体

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{extract_json, format_history, unanswered_user_input, Node};
use crate::core::{
    build_context_summary, detect_topic_switch, enforce_loop_limit, handle_topic_switch,
    maintain_context_on_transition, return_to_previous_topic, AgentName, ConversationState, Message,
    NodeName, Role, TopicClassifier, TopicShift, TutorError,
};
use crate::llm::{GenerationParams, LlmClient};

const CLARIFY_RESPONSE: &str = "抱歉，我不太确定如何帮助您。能否请您详细说明一下您的需求？";

/// 从 LLM 输出解析出的路由决策
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorDecision {
    pub next_agent: AgentName,
    pub current_task: Option<String>,
    pub requires_human_input: bool,
    pub response: Option<String>,
}

impl CoordinatorDecision {
    /// 无法解析时：请用户澄清
    pub fn clarify() -> Self {
        Self {
            next_agent: AgentName::HumanInput,
            current_task: Some("需要用户澄清".to_string()),
            requires_human_input: true,
            response: Some(CLARIFY_RESPONSE.to_string()),
        }
    }

    /// 未知智能体名按 human_input 处理
    pub fn parse(text: &str) -> Self {
        let Some(value) = extract_json(text) else {
            tracing::warn!("coordinator output is not JSON, asking user to clarify");
            return Self::clarify();
        };

        let requested = value.get("next_agent").and_then(|v| v.as_str()).unwrap_or("");
        let (next_agent, forced) = match requested.parse::<AgentName>() {
            Ok(agent) => (agent, false),
            Err(_) => {
                tracing::warn!(next_agent = requested, "invalid next_agent, defaulting to human_input");
                (AgentName::HumanInput, true)
            }
        };
        let text_field = |key: &str| {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        Self {
            next_agent,
            current_task: text_field("current_task"),
            requires_human_input: forced
                || next_agent == AgentName::HumanInput
                || value
                    .get("requires_human_input")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
            response: text_field("response"),
        }
    }
}

pub struct Coordinator {
    llm: Arc<dyn LlmClient>,
    params: GenerationParams,
    classifier: Arc<dyn TopicClassifier>,
    max_loop_count: u32,
}

impl Coordinator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        params: GenerationParams,
        classifier: Arc<dyn TopicClassifier>,
        max_loop_count: u32,
    ) -> Self {
        Self {
            llm,
            params,
            classifier,
            max_loop_count,
        }
    }

    fn build_prompt(&self, state: &ConversationState, user_input: Option<&str>) -> String {
        let profile = &state.user_profile;
        let goals = if profile.learning_goals.is_empty() {
            "未设置".to_string()
        } else {
            profile.learning_goals.join("、")
        };
        format!(
            "你是一个教育辅导系统的协调器。你的职责是：
1. 理解用户的需求和意图
2. 决定由哪个专业智能体处理任务
3. 在必要时请求用户确认

可用的智能体：
- course_advisor: 课程顾问，负责推荐和介绍课程
- learning_planner: 学习规划师，负责制定学习计划

{context}

当前对话历史：
{history}

用户最新输入：
{input}

用户画像：
- 背景：{background}
- 技能水平：{skill}
- 学习目标：{goals}

请分析用户意图，并以 JSON 格式返回决策：
{{
    \"next_agent\": \"course_advisor\",
    \"current_task\": \"推荐 Python 数据分析课程\",
    \"requires_human_input\": false,
    \"response\": \"好的，我来为您推荐一些 Python 数据分析的课程。\"
}}

决策规则：
- 用户询问课程或想要课程推荐 → course_advisor
- 用户想要制定学习计划或规划学习路径 → learning_planner
- 意图不明确或需要更多信息 → human_input，并设置 requires_human_input=true
- 用户表示结束、感谢或再见 → end
- 需要用户确认重要决策时 → 设置 requires_human_input=true

请只返回有效的 JSON。",
            context = build_context_summary(state),
            history = format_history(&state.messages, 10),
            input = user_input.unwrap_or("（无）"),
            background = profile.background.as_deref().unwrap_or("未知"),
            skill = profile.skill_level.map(|s| s.label()).unwrap_or("未知"),
            goals = goals,
        )
    }

    fn apply(&self, state: &mut ConversationState, decision: CoordinatorDecision) {
        if decision.current_task.is_some() {
            state.current_task = decision.current_task;
        }
        if decision.requires_human_input {
            state.request_human_input();
        } else {
            state.requires_human_input = false;
            state.next_agent = Some(decision.next_agent);
        }
        if let Some(response) = decision.response {
            state.add_message(Message::from_agent(AgentName::Coordinator.as_str(), response));
        }
        if !decision.requires_human_input && decision.next_agent != AgentName::Coordinator {
            maintain_context_on_transition(state, AgentName::Coordinator, decision.next_agent);
        }
    }
}

#[async_trait]
impl Node for Coordinator {
    fn name(&self) -> NodeName {
        NodeName::Coordinator
    }

    async fn execute(&self, state: &mut ConversationState) -> Result<(), TutorError> {
        let loop_count = state.increment_loop_count();
        if loop_count > self.max_loop_count {
            enforce_loop_limit(state, self.max_loop_count);
            return Ok(());
        }

        // 只对刚到达的用户消息做话题检测，避免重复弹栈
        if matches!(state.last_message(), Some(m) if m.role == Role::User) {
            match detect_topic_switch(state, self.classifier.as_ref()) {
                Some(TopicShift::NewTopic) => handle_topic_switch(state),
                Some(TopicShift::PreviousTopic) => {
                    return_to_previous_topic(state);
                    return Ok(());
                }
                None => {}
            }
        }

        let user_input = unanswered_user_input(state).map(|m| m.content.clone());
        let prompt = self.build_prompt(state, user_input.as_deref());
        let output = self.llm.generate(&prompt, &self.params).await?;
        let decision = CoordinatorDecision::parse(&output);

        tracing::info!(
            conversation_id = %state.conversation_id,
            loop_count,
            next_agent = %decision.next_agent,
            requires_human_input = decision.requires_human_input,
            "coordinator decision"
        );
        self.apply(state, decision);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::KeywordTopicClassifier;
    use crate::llm::{LlmError, ScriptedLlmClient};

    fn coordinator(llm: Arc<ScriptedLlmClient>) -> Coordinator {
        Coordinator::new(llm, GenerationParams::default(), Arc::new(KeywordTopicClassifier), 10)
    }

    #[test]
    fn test_parse_decision() {
        let d = CoordinatorDecision::parse(
            r#"{"next_agent": "learning_planner", "current_task": "制定计划", "requires_human_input": false, "response": "好的"}"#,
        );
        assert_eq!(d.next_agent, AgentName::LearningPlanner);
        assert!(!d.requires_human_input);

        let d = CoordinatorDecision::parse(r#"{"next_agent": "librarian"}"#);
        assert_eq!(d.next_agent, AgentName::HumanInput);
        assert!(d.requires_human_input);

        assert_eq!(CoordinatorDecision::parse("我觉得应该推荐课程"), CoordinatorDecision::clarify());
    }

    #[tokio::test]
    async fn test_routes_to_course_advisor_with_transition() {
        let llm = Arc::new(ScriptedLlmClient::with_texts([
            r#"{"next_agent": "course_advisor", "current_task": "推荐 Python 课程", "requires_human_input": false, "response": "好的，我来推荐。"}"#,
        ]));
        let node = coordinator(llm.clone());
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        state.add_message(Message::user("我想学 Python"));

        node.execute(&mut state).await.unwrap();
        assert_eq!(state.loop_count, 1);
        assert_eq!(state.next_agent, Some(AgentName::CourseAdvisor));
        assert_eq!(state.current_task.as_deref(), Some("推荐 Python 课程"));
        assert_eq!(state.messages.len(), 3);
        assert!(state.messages[2].content.contains("查找相关课程"));
        assert!(llm.prompts()[0].contains("我想学 Python"));
    }

    #[tokio::test]
    async fn test_return_keyword_skips_llm() {
        let llm = Arc::new(ScriptedLlmClient::with_texts(Vec::<String>::new()));
        let node = coordinator(llm.clone());
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        state.add_message(Message::user("我们回到刚才的问题吧"));

        node.execute(&mut state).await.unwrap();
        assert!(llm.prompts().is_empty());
        assert!(state.last_message().unwrap().content.contains("还没有讨论过其他话题"));
    }

    #[tokio::test]
    async fn test_llm_error_propagates() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![Err(LlmError::Connection("refused".into()))]));
        let node = coordinator(llm);
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        state.add_message(Message::user("推荐课程"));
        let err = node.execute(&mut state).await.unwrap_err();
        assert!(matches!(err, TutorError::LlmConnection(_)));
        assert_eq!(state.loop_count, 1);
    }

    #[tokio::test]
    async fn test_over_limit_completes() {
        let llm = Arc::new(ScriptedLlmClient::with_texts(Vec::<String>::new()));
        let node = coordinator(llm);
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        state.loop_count = 10;
        node.execute(&mut state).await.unwrap();
        assert!(state.is_complete);
        assert!(state.last_message().unwrap().content.contains("最大轮次"));
    }
}
