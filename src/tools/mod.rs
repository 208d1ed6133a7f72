//! 工具层：搜索工具抽象、课程目录、网络搜索与主备降级
//!
//! 所有搜索工具实现 SearchTool（search(query, limit)），由 ToolManager 组合为主备链，供课程顾问与学习规划师调用。

pub mod catalog;
pub mod fallback;
pub mod web_search;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::ToolsSection;
use crate::core::{CourseInfo, TutorError};
use crate::observability::PerformanceMonitor;

pub use catalog::GeekTimeCatalog;
pub use fallback::{FallbackChain, ToolOutcome};
pub use web_search::{WebCourseSearch, WebResult, WebSearch};

/// 搜索工具 trait：名称 + 异步搜索
#[async_trait]
pub trait SearchTool: Send + Sync {
    type Item: Send;

    /// 工具名称（日志、统计与提示词中使用）
    fn name(&self) -> &str;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Self::Item>, String>;
}

/// 各工具的可用状态
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolStatus {
    pub course_catalog_available: bool,
    pub web_search_available: bool,
}

/// 工具管理器：课程搜索（目录 → 网络降级）与网络搜索
pub struct ToolManager {
    courses: FallbackChain<CourseInfo>,
    web: FallbackChain<WebResult>,
    max_results: usize,
}

impl ToolManager {
    pub fn new(courses: FallbackChain<CourseInfo>, web: FallbackChain<WebResult>, max_results: usize) -> Self {
        Self {
            courses,
            web,
            max_results,
        }
    }

    /// 按配置组装内置工具
    pub fn from_config(cfg: &ToolsSection, monitor: Arc<PerformanceMonitor>) -> Self {
        let web: Arc<dyn SearchTool<Item = WebResult>> = Arc::new(WebSearch);
        let timeout = Duration::from_secs(cfg.timeout_secs);

        let catalog: Arc<dyn SearchTool<Item = CourseInfo>> =
            Arc::new(GeekTimeCatalog::new(cfg.catalog_base_url.clone()));
        let courses = FallbackChain::new("course_search", catalog)
            .with_secondary(Arc::new(WebCourseSearch::new(web.clone())))
            .with_timeout(timeout)
            .with_retry(cfg.max_attempts, Duration::from_millis(500))
            .with_monitor(monitor.clone());
        if !cfg.catalog_enabled {
            courses.mark_primary_unavailable();
        }

        let web_chain = FallbackChain::new("web_search", web)
            .with_timeout(timeout)
            .with_retry(cfg.max_attempts, Duration::from_millis(500))
            .with_monitor(monitor);
        if !cfg.web_enabled {
            web_chain.mark_primary_unavailable();
        }

        Self::new(courses, web_chain, cfg.max_results)
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub async fn search_courses(&self, query: &str) -> Result<ToolOutcome<CourseInfo>, TutorError> {
        self.courses.search(query, self.max_results).await
    }

    pub async fn search_web(&self, query: &str, limit: usize) -> Result<ToolOutcome<WebResult>, TutorError> {
        self.web.search(query, limit).await
    }

    /// 多个查询的学习资源；单个查询失败只记录日志
    pub async fn search_learning_resources(&self, queries: &[String], per_query: usize) -> Vec<WebResult> {
        let mut resources = Vec::new();
        for query in queries {
            match self.search_web(query, per_query).await {
                Ok(outcome) => resources.extend(outcome.data),
                Err(e) => tracing::warn!(query = %query, error = %e, "learning resource search failed"),
            }
        }
        resources
    }

    pub fn tool_status(&self) -> ToolStatus {
        ToolStatus {
            course_catalog_available: self.courses.is_primary_available(),
            web_search_available: self.web.is_primary_available(),
        }
    }

    pub fn reset_tool_availability(&self) {
        self.courses.reset();
        self.web.reset();
        tracing::info!("tool availability reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolsSection;

    #[tokio::test]
    async fn test_manager_uses_catalog_first() {
        let manager = ToolManager::from_config(&ToolsSection::default(), Arc::new(PerformanceMonitor::new()));
        let outcome = manager.search_courses("Python").await.unwrap();
        assert!(!outcome.fallback_used);
        assert_eq!(outcome.tool_name, "search_geektime");
        assert!(manager.tool_status().course_catalog_available);
    }

    #[tokio::test]
    async fn test_disabled_catalog_falls_back_until_reset() {
        let cfg = ToolsSection {
            catalog_enabled: false,
            ..ToolsSection::default()
        };
        let manager = ToolManager::from_config(&cfg, Arc::new(PerformanceMonitor::new()));
        let outcome = manager.search_courses("Python").await.unwrap();
        assert!(outcome.fallback_used);
        assert!(outcome.data.iter().all(|c| c.source == "web_search"));

        manager.reset_tool_availability();
        assert!(manager.tool_status().course_catalog_available);
    }

    #[tokio::test]
    async fn test_learning_resources_collects_all_queries() {
        let manager = ToolManager::from_config(&ToolsSection::default(), Arc::new(PerformanceMonitor::new()));
        let queries = vec!["Python 学习路径".to_string(), "Go 最佳实践".to_string()];
        let resources = manager.search_learning_resources(&queries, 3).await;
        assert_eq!(resources.len(), 6);
    }
}
