//! 错误恢复与上下文一致性集成测试

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tutor::core::{
        check_conversation_health, ensure_context_consistency, return_to_previous_topic, route,
        should_retry, AgentName, ConversationState, Health, Message, NodeName, RecoveryEngine,
        SkillLevel, TutorError,
    };

    fn state() -> ConversationState {
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        state.user_profile.skill_level = Some(SkillLevel::Beginner);
        state.user_profile.learning_goals = vec!["Python".into()];
        state.add_message(Message::user("推荐课程"));
        state.current_task = Some("推荐 Python 课程".into());
        state.next_agent = Some(AgentName::CourseAdvisor);
        state
    }

    fn all_errors() -> Vec<TutorError> {
        vec![
            TutorError::LlmConnection("refused".into()),
            TutorError::LlmTimeout("slow".into()),
            TutorError::LlmApi("500".into()),
            TutorError::NetworkTimeout("slow".into()),
            TutorError::tool("search_geektime", "503"),
            TutorError::RoutingDecision("unknown".into()),
            TutorError::Validation("missing milestones".into()),
            TutorError::generic("course_advisor", "boom"),
        ]
    }

    #[test]
    fn test_handlers_preserve_identity_and_append_one_message() {
        let engine = RecoveryEngine::new();
        for err in all_errors() {
            let before = state();
            let after = engine.handle(&err, before.clone(), "test");
            assert_eq!(after.conversation_id, before.conversation_id, "{err}");
            assert_eq!(after.user_profile, before.user_profile, "{err}");
            assert_eq!(after.messages.len(), before.messages.len() + 1, "{err}");
            assert_eq!(after.next_agent, before.next_agent, "{err}");
            assert_eq!(after.current_task, before.current_task, "{err}");
        }
    }

    #[test]
    fn test_only_tool_errors_do_not_suspend() {
        let engine = RecoveryEngine::new();
        for err in all_errors() {
            let after = engine.handle(&err, state(), "test");
            let is_tool = matches!(err, TutorError::ToolExecution { .. });
            assert_eq!(after.requires_human_input, !is_tool, "{err}");
            if after.requires_human_input {
                assert_eq!(route(&after, 10), NodeName::HumanInput);
            }
        }
    }

    #[test]
    fn test_state_corruption_resets_everything_but_id() {
        let engine = RecoveryEngine::new();
        let mut corrupted = state();
        corrupted.loop_count = 7;
        corrupted.user_profile.user_id = "  ".into();
        let after = engine.handle(&TutorError::StateCorruption("bad".into()), corrupted, "test");
        assert_eq!(after.conversation_id, "abc");
        assert_eq!(after.user_profile.user_id, "anonymous");
        assert!(after.user_profile.learning_goals.is_empty());
        assert_eq!(after.loop_count, 0);
        assert_eq!(after.messages.len(), 1);
    }

    #[test]
    fn test_retry_gate() {
        let timeout = TutorError::LlmTimeout("slow".into());
        assert!(should_retry(&timeout, 1, 3));
        assert!(should_retry(&timeout, 2, 3));
        assert!(!should_retry(&timeout, 3, 3));
        for err in [
            TutorError::LlmApi("500".into()),
            TutorError::tool("web_search", "down"),
            TutorError::StateCorruption("bad".into()),
        ] {
            assert!(!should_retry(&err, 1, 3), "{err}");
        }
    }

    #[test]
    fn test_consistency_check_is_read_only() {
        let mut s = state();
        s.requires_human_input = true;
        s.next_agent = Some(AgentName::CourseAdvisor);
        s.is_complete = true;

        let before = s.clone();
        let first = ensure_context_consistency(&s);
        let second = ensure_context_consistency(&s);
        assert_eq!(first, second);
        assert!(!first.ok);
        assert_eq!(first.violations.len(), 2);
        assert_eq!(s, before);
    }

    #[test]
    fn test_empty_stack_return_only_appends_notice() {
        let mut s = state();
        s.current_task = Some("推荐课程".into());
        s.next_agent = Some(AgentName::CourseAdvisor);
        let before = s.clone();
        return_to_previous_topic(&mut s);
        assert_eq!(s.messages.len(), before.messages.len() + 1);
        assert_eq!(s.current_task, before.current_task);
        assert_eq!(s.next_agent, before.next_agent);
    }

    #[test]
    fn test_health_degrades_with_loop_count() {
        let mut s = state();
        assert_eq!(check_conversation_health(&s, 10).health, Health::Healthy);
        s.loop_count = 9;
        let report = check_conversation_health(&s, 10);
        assert_eq!(report.health, Health::Warning);
        assert!(report.issues.is_empty());
        s.loop_count = 11;
        assert_eq!(check_conversation_health(&s, 10).health, Health::Unhealthy);
    }
}
