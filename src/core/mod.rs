//! 核心编排层：状态模型、路由状态机、上下文与分支控制、错误恢复、对话引擎与会话层

pub mod engine;
pub mod error;
pub mod flow;
pub mod recovery;
pub mod router;
pub mod session;
pub mod state;

pub use engine::{ConversationEngine, TurnOutcome, TurnResult};
pub use error::{ErrorKind, RecoveryAction, TutorError};
pub use flow::{
    build_context_summary, check_conversation_health, create_conversation_summary, current_phase,
    detect_topic_switch, ensure_context_consistency, extract_context, handle_topic_switch,
    maintain_context_on_transition, return_to_previous_topic, summarize_subtask_completion,
    ConsistencyReport, Health, HealthReport, KeywordTopicClassifier, TopicClassifier, TopicShift,
};
pub use recovery::{backoff_with_jitter, is_recoverable, should_retry, RecoveryEngine, RetryPolicy};
pub use router::{enforce_loop_limit, route, successor, NodeName, DEFAULT_MAX_LOOP_COUNT, LOOP_LIMIT_NOTICE};
pub use session::{ConversationActor, SessionCommand, SessionHandle, SessionHub, SessionSupervisor};
pub use state::{
    AgentName, ContextSnapshot, ConversationState, CourseInfo, LearningPlan, Message, MessageDigest,
    Milestone, Phase, PlanStatus, Preferences, Role, SkillLevel, UserProfile,
};
