//! 可观测性：日志初始化与性能统计

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化 tracing：默认 info，RUST_LOG 可覆盖；重复调用无副作用
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// 一类调用的累计统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallStats {
    pub count: u64,
    pub failures: u64,
    pub total_ms: u64,
    pub avg_ms: u64,
}

impl CallStats {
    fn record(&mut self, elapsed: Duration, ok: bool) {
        self.count += 1;
        if !ok {
            self.failures += 1;
        }
        self.total_ms += elapsed.as_millis() as u64;
        self.avg_ms = self.total_ms / self.count;
    }
}

#[derive(Debug, Default)]
struct MonitorInner {
    llm: CallStats,
    nodes: BTreeMap<String, CallStats>,
    tools: BTreeMap<String, CallStats>,
    errors: BTreeMap<String, u64>,
    turns: u64,
}

/// 统计摘要
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorSummary {
    pub llm: CallStats,
    pub nodes: BTreeMap<String, CallStats>,
    pub tools: BTreeMap<String, CallStats>,
    pub errors: BTreeMap<String, u64>,
    pub turns: u64,
}

/// 性能监控：记录节点、LLM、工具调用与已处理的错误
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    inner: Mutex<MonitorInner>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<F: FnOnce(&mut MonitorInner)>(&self, f: F) {
        if let Ok(mut inner) = self.inner.lock() {
            f(&mut inner);
        }
    }

    pub fn record_llm_call(&self, elapsed: Duration, ok: bool) {
        self.with(|m| m.llm.record(elapsed, ok));
    }

    pub fn record_node(&self, node: &str, elapsed: Duration, ok: bool) {
        self.with(|m| m.nodes.entry(node.to_string()).or_default().record(elapsed, ok));
    }

    pub fn record_tool(&self, tool: &str, elapsed: Duration, ok: bool) {
        self.with(|m| m.tools.entry(tool.to_string()).or_default().record(elapsed, ok));
    }

    pub fn record_error(&self, kind: &str) {
        self.with(|m| *m.errors.entry(kind.to_string()).or_default() += 1);
    }

    pub fn record_turn(&self) {
        self.with(|m| m.turns += 1);
    }

    pub fn summary(&self) -> MonitorSummary {
        self.inner
            .lock()
            .map(|m| MonitorSummary {
                llm: m.llm.clone(),
                nodes: m.nodes.clone(),
                tools: m.tools.clone(),
                errors: m.errors.clone(),
                turns: m.turns,
            })
            .unwrap_or_default()
    }

    /// 以 JSON 写入日志
    pub fn log_summary(&self) {
        let summary = serde_json::to_string(&self.summary()).unwrap_or_default();
        tracing::info!(summary = %summary, "performance summary");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_aggregates() {
        let monitor = PerformanceMonitor::new();
        monitor.record_node("coordinator", Duration::from_millis(10), true);
        monitor.record_node("coordinator", Duration::from_millis(30), false);
        monitor.record_tool("search_geektime", Duration::from_millis(5), true);
        monitor.record_error("llm_timeout");
        monitor.record_error("llm_timeout");

        let summary = monitor.summary();
        let node = &summary.nodes["coordinator"];
        assert_eq!(node.count, 2);
        assert_eq!(node.failures, 1);
        assert_eq!(node.avg_ms, 20);
        assert_eq!(summary.tools["search_geektime"].count, 1);
        assert_eq!(summary.errors["llm_timeout"], 2);
    }
}
