//! 网络搜索（模拟数据）与「网页结果 → 课程」适配器

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::CourseInfo;
use crate::tools::SearchTool;

/// 单条搜索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl WebResult {
    fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}

/// 模拟网络搜索：按关键词返回常见学习站点
#[derive(Debug, Default)]
pub struct WebSearch;

impl WebSearch {
    fn lookup(query: &str) -> Vec<WebResult> {
        let lower = query.to_lowercase();
        let mut results = Vec::new();

        if lower.contains("python") {
            results.push(WebResult::new("Python官方文档", "https://docs.python.org/zh-cn/3/", "Python 3.x 官方中文文档，包含教程、库参考和语言参考。"));
            results.push(WebResult::new("Real Python - Python教程和文章", "https://realpython.com/", "高质量的Python教程、文章和视频课程，适合各个水平的学习者。"));
            results.push(WebResult::new("Python最佳实践指南", "https://docs.python-guide.org/", "Python开发的最佳实践和风格指南，由社区维护。"));
        }
        if lower.contains("数据分析") || lower.contains("data analysis") {
            results.push(WebResult::new("Pandas官方文档", "https://pandas.pydata.org/docs/", "Pandas是Python中最流行的数据分析库，提供强大的数据结构和分析工具。"));
            results.push(WebResult::new("数据分析学习路径 - Kaggle", "https://www.kaggle.com/learn", "Kaggle提供的免费数据分析和机器学习课程，包含实践项目。"));
        }
        if lower.contains("机器学习") || lower.contains("machine learning") {
            results.push(WebResult::new("机器学习课程 - Coursera", "https://www.coursera.org/learn/machine-learning", "Andrew Ng教授的经典机器学习课程，适合初学者。"));
            results.push(WebResult::new("Scikit-learn官方教程", "https://scikit-learn.org/stable/tutorial/", "Scikit-learn是Python中最流行的机器学习库，提供丰富的算法实现。"));
        }
        if lower.contains("学习路径") || lower.contains("learning path") {
            results.push(WebResult::new("开发者学习路线图", "https://roadmap.sh/", "各种技术栈的学习路线图，帮助开发者规划学习路径。"));
            results.push(WebResult::new("GitHub学习资源集合", "https://github.com/topics/learning-resources", "GitHub上精选的学习资源和教程集合。"));
        }
        if results.is_empty() {
            let slug = query.replace(' ', "-");
            results.push(WebResult::new(format!("{query} - 学习资源"), format!("https://example.com/learn/{slug}"), format!("关于{query}的学习资源和教程。")));
            results.push(WebResult::new(format!("{query} - 最佳实践"), format!("https://example.com/best-practices/{slug}"), format!("{query}的最佳实践和经验分享。")));
            results.push(WebResult::new(format!("{query} - 入门指南"), format!("https://example.com/guide/{slug}"), format!("从零开始学习{query}的完整指南。")));
        }
        results
    }
}

#[async_trait]
impl SearchTool for WebSearch {
    type Item = WebResult;

    fn name(&self) -> &str {
        "web_search"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<WebResult>, String> {
        let query = query.trim();
        if query.is_empty() {
            return Err("empty query".to_string());
        }
        let mut results = Self::lookup(query);
        results.truncate(limit);
        Ok(results)
    }
}

/// 课程目录不可用时的备用方案：用网络搜索结果充当课程
pub struct WebCourseSearch {
    web: Arc<dyn SearchTool<Item = WebResult>>,
}

impl WebCourseSearch {
    pub fn new(web: Arc<dyn SearchTool<Item = WebResult>>) -> Self {
        Self { web }
    }
}

#[async_trait]
impl SearchTool for WebCourseSearch {
    type Item = CourseInfo;

    fn name(&self) -> &str {
        "web_search"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CourseInfo>, String> {
        let results = self.web.search(&format!("{query} 在线课程"), limit).await?;
        Ok(results
            .into_iter()
            .map(|r| CourseInfo {
                title: r.title,
                url: r.url,
                description: r.snippet,
                difficulty: "intermediate".to_string(),
                duration: None,
                rating: None,
                source: "web_search".to_string(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_web_search_limit() {
        let results = WebSearch.search("Python 学习路径", 4).await.unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].url, "https://docs.python.org/zh-cn/3/");
    }

    #[tokio::test]
    async fn test_web_course_adapter() {
        let adapter = WebCourseSearch::new(Arc::new(WebSearch));
        let courses = adapter.search("Go", 5).await.unwrap();
        assert_eq!(courses.len(), 3);
        assert!(courses.iter().all(|c| c.source == "web_search" && c.difficulty == "intermediate"));
        assert!(courses[0].title.contains("Go 在线课程"));
    }
}
