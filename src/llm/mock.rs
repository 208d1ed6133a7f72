//! Mock LLM 客户端（无需 API）
//!
//! MockLlmClient 按提示词类型返回启发式结果，便于离线跑通完整对话；ScriptedLlmClient 按队列回放，供测试使用。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::llm::{GenerationParams, LlmClient, LlmError};

/// 离线演示客户端：识别各智能体的提示词并给出合理的 JSON / 文本
#[derive(Debug, Default)]
pub struct MockLlmClient;

/// 提示词中某个标题之后的第一行
fn line_after<'a>(prompt: &'a str, marker: &str) -> Option<&'a str> {
    let start = prompt.find(marker)? + marker.len();
    prompt[start..]
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
}

/// 两个标题之间的文本
fn section<'a>(prompt: &'a str, from: &str, to: &str) -> &'a str {
    let Some(start) = prompt.find(from).map(|i| i + from.len()) else {
        return "";
    };
    let rest = &prompt[start..];
    rest.find(to).map(|end| &rest[..end]).unwrap_or(rest)
}

fn decision(next_agent: &str, task: &str, requires_human_input: bool, response: &str) -> String {
    json!({
        "next_agent": next_agent,
        "current_task": task,
        "requires_human_input": requires_human_input,
        "response": response,
    })
    .to_string()
}

impl MockLlmClient {
    fn coordinator(&self, prompt: &str) -> String {
        let input = line_after(prompt, "用户最新输入：").unwrap_or("（无）");
        if input != "（无）" {
            let lower = input.to_lowercase();
            return if ["再见", "谢谢", "bye"].iter().any(|k| lower.contains(k)) {
                decision("end", "结束对话", false, "不客气！祝您学习顺利。")
            } else if ["计划", "规划", "路径", "plan"].iter().any(|k| lower.contains(k)) {
                decision("learning_planner", input, false, "好的，我来为您制定学习计划。")
            } else if ["课程", "推荐", "学", "course"].iter().any(|k| lower.contains(k)) {
                decision("course_advisor", input, false, "好的，我来为您推荐一些课程。")
            } else {
                decision("human_input", "需要用户澄清", true, "能否请您详细说明一下您的学习需求？")
            };
        }

        // 没有新的用户输入：根据最近一次用户发言之后的系统消息决定
        let history = section(prompt, "当前对话历史：", "用户最新输入：");
        let tail = history.rfind("用户:").map(|i| &history[i..]).unwrap_or(history);
        if tail.contains("希望如何调整") {
            decision("human_input", "等待调整意见", true, "请告诉我您的具体想法。")
        } else if tail.contains("寻找更多课程") || tail.contains("调整推荐") {
            decision("course_advisor", "补充课程推荐", false, "好的，我再为您找找。")
        } else if tail.contains("调整学习计划") || tail.contains("调整计划") {
            decision("learning_planner", "调整学习计划", false, "好的，我来调整学习计划。")
        } else if tail.contains("课程搜索完成") {
            decision("human_input", "收集课程反馈", true, "请看看以上推荐是否合适。")
        } else if tail.contains("学习计划已确认") || tail.contains("推荐满意") {
            decision("end", "结束对话", false, "很高兴能帮到您！")
        } else {
            decision("human_input", "需要用户澄清", true, "还有什么可以帮您的吗？")
        }
    }

    fn tool_selection(&self, prompt: &str) -> String {
        let request = line_after(prompt, "用户需求：").unwrap_or("编程");
        json!({
            "tools": [
                {"name": "search_geektime", "query": request},
                {"name": "web_search", "query": format!("{request} 学习资源")},
            ]
        })
        .to_string()
    }

    fn search_queries(&self, prompt: &str) -> String {
        let goals = line_after(prompt, "学习目标：").unwrap_or("编程");
        json!({ "queries": [format!("{goals} 学习路径"), format!("{goals} 最佳实践")] }).to_string()
    }

    fn learning_plan(&self, prompt: &str) -> String {
        let goal = line_after(prompt, "- 学习目标：").unwrap_or("编程");
        json!({
            "goal": goal,
            "milestones": [
                {
                    "title": "打好基础",
                    "content": format!("{goal} 的核心概念与基础语法"),
                    "courses": [],
                    "estimated_time": "2-3周",
                    "acceptance_criteria": "能独立完成基础练习",
                    "tips": "每天保持固定的学习时间"
                },
                {
                    "title": "项目实践",
                    "content": "完成一个完整的小项目",
                    "courses": [],
                    "estimated_time": "3-4周",
                    "acceptance_criteria": "项目可运行并有文档",
                    "tips": "先做最小可用版本再迭代"
                },
                {
                    "title": "进阶提升",
                    "content": "学习进阶主题与最佳实践",
                    "courses": [],
                    "estimated_time": "4周",
                    "acceptance_criteria": "能讲清关键原理",
                    "tips": "阅读优秀开源代码"
                }
            ],
            "estimated_duration": "约2-3个月",
            "learning_advice": "理论与实践结合，循序渐进。",
            "summary": format!("我为您制定了「{goal}」的学习计划，共 3 个阶段，预计 2-3 个月完成。")
        })
        .to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String, LlmError> {
        let reply = if prompt.contains("教育辅导系统的协调器") {
            self.coordinator(prompt)
        } else if prompt.contains("决定需要使用哪些工具") {
            self.tool_selection(prompt)
        } else if prompt.contains("决定搜索关键词") {
            self.search_queries(prompt)
        } else if prompt.contains("专业的学习规划师") {
            self.learning_plan(prompt)
        } else if prompt.contains("专业的课程顾问") {
            "根据您的学习目标，以上课程由浅入深，建议先从评分最高的入门课程开始，边学边练。".to_string()
        } else {
            "（Mock 回复）".to_string()
        };
        Ok(reply)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// 按顺序回放预设结果的客户端，并记录收到的提示词
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 全部为成功回复的便捷构造
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| Ok(t.into())).collect())
    }

    pub fn push(&self, reply: Result<String, LlmError>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or_else(|| Err(LlmError::Api("script exhausted".to_string())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_coordinator_routes_by_keywords() {
        let mock = MockLlmClient;
        let prompt = "你是一个教育辅导系统的协调器。\n当前对话历史：\n用户: 我想学 Python\n\n用户最新输入：\n我想学 Python\n";
        let out = mock.generate(prompt, &GenerationParams::default()).await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["next_agent"], "course_advisor");
    }

    #[tokio::test]
    async fn test_mock_coordinator_asks_feedback_after_search() {
        let mock = MockLlmClient;
        let prompt = "你是一个教育辅导系统的协调器。\n当前对话历史：\n用户: 推荐课程\n系统[system]: ✓ 课程搜索完成：找到了 3 门相关课程。\n\n用户最新输入：\n（无）\n";
        let out = mock.generate(prompt, &GenerationParams::default()).await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["next_agent"], "human_input");
        assert_eq!(v["requires_human_input"], true);
    }

    #[tokio::test]
    async fn test_scripted_replays_in_order() {
        let scripted = ScriptedLlmClient::with_texts(["a", "b"]);
        let p = GenerationParams::default();
        assert_eq!(scripted.generate("1", &p).await.unwrap(), "a");
        assert_eq!(scripted.generate("2", &p).await.unwrap(), "b");
        assert!(scripted.generate("3", &p).await.is_err());
        assert_eq!(scripted.prompts(), vec!["1", "2", "3"]);
    }
}
