//! 极客时间课程目录（模拟数据）
//!
//! 按查询关键词返回静态课程列表，最多 5 门；未命中时生成「入门 / 进阶」两门通用课程。

use async_trait::async_trait;

use crate::core::CourseInfo;
use crate::tools::SearchTool;

const MAX_CATALOG_RESULTS: usize = 5;

pub struct GeekTimeCatalog {
    base_url: String,
}

impl GeekTimeCatalog {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self { base_url }
    }

    fn course(&self, id: u32, title: String, description: String, difficulty: &str, duration: &str, rating: f32) -> CourseInfo {
        CourseInfo {
            title,
            url: format!("{}course/intro/{id}", self.base_url),
            description,
            difficulty: difficulty.to_string(),
            duration: Some(duration.to_string()),
            rating: Some(rating),
            source: "geektime".to_string(),
        }
    }

    fn lookup(&self, query: &str) -> Vec<CourseInfo> {
        let lower = query.to_lowercase();
        let mut courses = Vec::new();

        if lower.contains("python") {
            courses.push(self.course(100001, "Python核心技术与实战".into(), "从基础到进阶，全面掌握Python核心技术".into(), "intermediate", "20小时", 4.8));
            courses.push(self.course(100002, "Python数据分析实战".into(), "使用Python进行数据分析和可视化".into(), "intermediate", "15小时", 4.6));
        }
        if lower.contains("数据") || lower.contains("data") {
            courses.push(self.course(100003, "数据分析实战45讲".into(), "从零开始学习数据分析的方法和工具".into(), "beginner", "12小时", 4.7));
        }
        if lower.contains("机器学习") || lower.contains("machine learning") {
            courses.push(self.course(100004, "机器学习40讲".into(), "系统学习机器学习的理论和实践".into(), "advanced", "25小时", 4.9));
            courses.push(self.course(100005, "深度学习实战".into(), "深入理解深度学习算法和应用".into(), "advanced", "30小时", 4.8));
        }
        if courses.is_empty() {
            courses.push(self.course(100099, format!("{query}入门课程"), format!("学习{query}的基础知识和实践技能"), "beginner", "10小时", 4.5));
            courses.push(self.course(100100, format!("{query}进阶实战"), format!("深入学习{query}的高级特性和最佳实践"), "intermediate", "18小时", 4.6));
        }

        courses.truncate(MAX_CATALOG_RESULTS);
        courses
    }
}

#[async_trait]
impl SearchTool for GeekTimeCatalog {
    type Item = CourseInfo;

    fn name(&self) -> &str {
        "search_geektime"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CourseInfo>, String> {
        let query = query.trim();
        if query.is_empty() {
            return Err("empty query".to_string());
        }
        let mut courses = self.lookup(query);
        courses.truncate(limit);
        Ok(courses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catalog_keyword_hits() {
        let catalog = GeekTimeCatalog::new("https://time.geekbang.org");
        let courses = catalog.search("Python 数据分析", 5).await.unwrap();
        assert_eq!(courses.len(), 3);
        assert_eq!(courses[0].url, "https://time.geekbang.org/course/intro/100001");
        assert!(courses.iter().all(|c| c.source == "geektime"));
    }

    #[tokio::test]
    async fn test_catalog_generic_fallback() {
        let catalog = GeekTimeCatalog::new("https://time.geekbang.org/");
        let courses = catalog.search("Rust", 5).await.unwrap();
        assert_eq!(courses[0].title, "Rust入门课程");
        assert_eq!(courses.len(), 2);
        assert!(catalog.search("  ", 5).await.is_err());
    }
}
