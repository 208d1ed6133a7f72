//! 主备工具链
//!
//! 同一能力先调主工具，失败后置「不可用」标记（仅显式 reset 清除），之后直接走备用工具并标记 fallback_used；
//! 两者都失败时返回一个携带双方错误的 ToolExecution。每次调用带超时与有限重试，并输出结构化审计日志。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::{backoff_with_jitter, TutorError};
use crate::observability::PerformanceMonitor;
use crate::tools::SearchTool;

/// 一次工具调用的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome<T> {
    pub data: Vec<T>,
    /// 实际产出结果的工具
    pub tool_name: String,
    pub fallback_used: bool,
}

pub struct FallbackChain<T> {
    capability: String,
    primary: Arc<dyn SearchTool<Item = T>>,
    secondary: Option<Arc<dyn SearchTool<Item = T>>>,
    primary_available: AtomicBool,
    timeout: Duration,
    max_attempts: u32,
    retry_base: Duration,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl<T: Send + 'static> FallbackChain<T> {
    pub fn new(capability: impl Into<String>, primary: Arc<dyn SearchTool<Item = T>>) -> Self {
        Self {
            capability: capability.into(),
            primary,
            secondary: None,
            primary_available: AtomicBool::new(true),
            timeout: Duration::from_secs(30),
            max_attempts: 2,
            retry_base: Duration::from_millis(500),
            monitor: None,
        }
    }

    pub fn with_secondary(mut self, secondary: Arc<dyn SearchTool<Item = T>>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, base: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_base = base;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }

    pub fn primary_name(&self) -> &str {
        self.primary.name()
    }

    pub fn is_primary_available(&self) -> bool {
        self.primary_available.load(Ordering::SeqCst)
    }

    /// 配置禁用主工具时使用
    pub fn mark_primary_unavailable(&self) {
        self.primary_available.store(false, Ordering::SeqCst);
    }

    /// 恢复主工具
    pub fn reset(&self) {
        self.primary_available.store(true, Ordering::SeqCst);
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<ToolOutcome<T>, TutorError> {
        let mut errors = Vec::new();

        if self.is_primary_available() {
            match self.call_with_retry(self.primary.as_ref(), query, limit).await {
                Ok(data) => {
                    return Ok(ToolOutcome {
                        data,
                        tool_name: self.primary.name().to_string(),
                        fallback_used: false,
                    })
                }
                Err(e) => {
                    tracing::warn!(
                        capability = %self.capability,
                        tool = self.primary.name(),
                        error = %e,
                        "primary tool failed, marking unavailable"
                    );
                    self.primary_available.store(false, Ordering::SeqCst);
                    errors.push(format!("{}: {e}", self.primary.name()));
                }
            }
        } else {
            tracing::debug!(capability = %self.capability, "primary tool unavailable, using fallback");
        }

        let Some(secondary) = &self.secondary else {
            if errors.is_empty() {
                errors.push(format!("{}: unavailable", self.primary.name()));
            }
            return Err(TutorError::ToolExecution {
                tool: self.capability.clone(),
                errors,
            });
        };

        match self.call_with_retry(secondary.as_ref(), query, limit).await {
            Ok(data) => Ok(ToolOutcome {
                data,
                tool_name: secondary.name().to_string(),
                fallback_used: true,
            }),
            Err(e) => {
                errors.push(format!("{}: {e}", secondary.name()));
                Err(TutorError::ToolExecution {
                    tool: self.capability.clone(),
                    errors,
                })
            }
        }
    }

    async fn call_with_retry(
        &self,
        tool: &dyn SearchTool<Item = T>,
        query: &str,
        limit: usize,
    ) -> Result<Vec<T>, String> {
        let mut attempt = 1;
        loop {
            match self.call_once(tool, query, limit).await {
                Ok(data) => return Ok(data),
                Err(e) if attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    let delay = backoff_with_jitter(attempt, self.retry_base, self.retry_base * 8);
                    tracing::debug!(tool = tool.name(), attempt, error = %e, "tool call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// 单次调用：超时 + 审计日志
    async fn call_once(&self, tool: &dyn SearchTool<Item = T>, query: &str, limit: usize) -> Result<Vec<T>, String> {
        let start = Instant::now();
        let result = timeout(self.timeout, tool.search(query, limit)).await;

        let (ok, outcome, count) = match &result {
            Ok(Ok(data)) => (true, "ok", data.len()),
            Ok(Err(_)) => (false, "error", 0),
            Err(_) => (false, "timeout", 0),
        };
        let elapsed = start.elapsed();
        let audit = serde_json::json!({
            "event": "tool_audit",
            "capability": self.capability,
            "tool": tool.name(),
            "ok": ok,
            "outcome": outcome,
            "results": count,
            "duration_ms": elapsed.as_millis() as u64,
            "query": query,
        });
        tracing::info!(audit = %audit, "tool");
        if let Some(monitor) = &self.monitor {
            monitor.record_tool(tool.name(), elapsed, ok);
        }

        match result {
            Ok(inner) => inner,
            Err(_) => Err(format!("timed out after {:?}", self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct Fixed {
        name: &'static str,
        fail: bool,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self { name, fail, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl SearchTool for Fixed {
        type Item = String;

        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<String>, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(format!("{} down", self.name))
            } else {
                Ok(vec![format!("{}:{query}", self.name)])
            }
        }
    }

    fn chain(primary: Arc<Fixed>, secondary: Arc<Fixed>) -> FallbackChain<String> {
        FallbackChain::new("search", primary as Arc<dyn SearchTool<Item = String>>)
            .with_secondary(secondary)
            .with_retry(2, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_primary_success() {
        let chain = chain(Fixed::new("a", false), Fixed::new("b", false));
        let out = chain.search("q", 5).await.unwrap();
        assert_eq!(out.data, vec!["a:q"]);
        assert!(!out.fallback_used);
    }

    #[tokio::test]
    async fn test_fallback_is_sticky_until_reset() {
        let primary = Fixed::new("a", true);
        let chain = chain(primary.clone(), Fixed::new("b", false));

        let out = chain.search("q", 5).await.unwrap();
        assert!(out.fallback_used);
        assert_eq!(out.tool_name, "b");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
        assert!(!chain.is_primary_available());

        let out = chain.search("q", 5).await.unwrap();
        assert!(out.fallback_used);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);

        chain.reset();
        assert!(chain.is_primary_available());
    }

    #[tokio::test]
    async fn test_both_failing_carries_both_errors() {
        let chain = chain(Fixed::new("a", true), Fixed::new("b", true));
        match chain.search("q", 5).await {
            Err(TutorError::ToolExecution { tool, errors }) => {
                assert_eq!(tool, "search");
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("a down"));
                assert!(errors[1].contains("b down"));
            }
            other => panic!("Expected ToolExecution, got {other:?}"),
        }
    }
}
