//! 带重试的 LLM 包装器
//!
//! 连接失败与超时按 RetryPolicy 指数退避重试；API 错误立即返回。每次调用记入 PerformanceMonitor。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::core::{RetryPolicy, TutorError};
use crate::llm::{GenerationParams, LlmClient, LlmError};
use crate::observability::PerformanceMonitor;

pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    policy: RetryPolicy,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            monitor: None,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError> {
        let mut attempt = 1;
        loop {
            let start = Instant::now();
            let result = self.inner.generate(prompt, params).await;
            if let Some(monitor) = &self.monitor {
                monitor.record_llm_call(start.elapsed(), result.is_ok());
            }

            match result {
                Ok(text) => return Ok(text),
                Err(e) => {
                    let err = TutorError::from(e.clone());
                    if !self.policy.should_retry(&err, attempt) {
                        tracing::error!(backend = self.inner.name(), attempt, error = %e, "llm call failed");
                        return Err(e);
                    }
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        backend = self.inner.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "llm call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let scripted = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::Timeout("slow".into())),
            Err(LlmError::Connection("refused".into())),
            Ok("ok".into()),
        ]));
        let monitor = Arc::new(PerformanceMonitor::new());
        let client = RetryingLlmClient::new(scripted.clone(), fast_policy()).with_monitor(monitor.clone());

        let out = client.generate("hi", &GenerationParams::default()).await.unwrap();
        assert_eq!(out, "ok");
        assert_eq!(scripted.prompts().len(), 3);
        assert_eq!(monitor.summary().llm.count, 3);
        assert_eq!(monitor.summary().llm.failures, 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let scripted = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::Timeout("1".into())),
            Err(LlmError::Timeout("2".into())),
            Err(LlmError::Timeout("3".into())),
            Ok("never".into()),
        ]));
        let client = RetryingLlmClient::new(scripted.clone(), fast_policy());
        let err = client.generate("hi", &GenerationParams::default()).await.unwrap_err();
        assert_eq!(err, LlmError::Timeout("3".into()));
        assert_eq!(scripted.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_api_error_is_not_retried() {
        let scripted = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::Api("bad request".into())),
            Ok("never".into()),
        ]));
        let client = RetryingLlmClient::new(scripted.clone(), fast_policy());
        assert!(client.generate("hi", &GenerationParams::default()).await.is_err());
        assert_eq!(scripted.prompts().len(), 1);
    }
}
