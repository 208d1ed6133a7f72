//! Tutor - 多智能体学习辅导对话编排引擎
//!
//! 模块划分：
//! - **agents**: 节点处理器（入口、协调器、课程顾问、学习规划师、人工输入、结束）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 状态模型、路由状态机、上下文与分支控制、错误恢复、对话引擎与会话层
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / 重试包装）
//! - **memory**: 检查点存储（内存 / SQLite）
//! - **observability**: 日志初始化与性能统计
//! - **tools**: 课程目录与网络搜索，主备降级链

pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;
