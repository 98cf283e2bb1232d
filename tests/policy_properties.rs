use proptest::prelude::*;

use toolgate::config::parse_policy;
use toolgate::engine::evaluator::PolicyEvaluator;
use toolgate::engine_core::constants::policy;
use toolgate::engine_core::models::{
    Actor, Decision, FindingAction, InjectionFinding, PatternClass, RiskTier, Role, Severity,
    Span, ToolDefinition,
};
use toolgate::tools::default_registry;

const DEFAULT_POLICY: &str = include_str!("../policies/default.yaml");

fn evaluator() -> PolicyEvaluator {
    PolicyEvaluator::new(&parse_policy(DEFAULT_POLICY).unwrap())
}

fn tools() -> Vec<ToolDefinition> {
    default_registry(&[]).definitions()
}

fn role() -> impl Strategy<Value = Role> {
    prop::sample::select(vec![Role::Viewer, Role::Researcher, Role::Admin])
}

fn actor_id() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("ada".to_string()),
        Just("ext-partner".to_string()),
        "[a-z]{1,6}(-[a-z]{1,4})?",
    ]
}

fn scope() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("sandbox-1".to_string()),
        Just("proj-1".to_string()),
        "[a-z0-9-]{0,12}",
    ]
}

fn finding() -> impl Strategy<Value = InjectionFinding> {
    (
        prop::sample::select(vec![Severity::Low, Severity::Medium, Severity::High]),
        prop::sample::select(vec![FindingAction::Flagged, FindingAction::Stripped]),
        prop::sample::select(vec![
            PatternClass::InstructionOverride,
            PatternClass::EncodedPayload,
            PatternClass::ToolHijack,
        ]),
    )
        .prop_map(|(severity, action, class)| InjectionFinding {
            source: "evidence[0]".to_string(),
            span: Span { start: 0, end: 4 },
            class,
            severity,
            action,
            excerpt: "....".to_string(),
        })
}

proptest! {
    #[test]
    fn evaluation_is_deterministic(
        id in actor_id(),
        role in role(),
        tool_index in any::<prop::sample::Index>(),
        scope in scope(),
        findings in prop::collection::vec(finding(), 0..4),
    ) {
        let tools = tools();
        let tool = tool_index.get(&tools);
        let actor = Actor::new(id, role);

        let first = evaluator().evaluate(&actor, tool, &scope, &findings);
        let second = evaluator().evaluate(&actor, tool, &scope, &findings);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn unresolved_high_finding_always_denies(
        id in actor_id(),
        role in role(),
        tool_index in any::<prop::sample::Index>(),
        scope in scope(),
        mut findings in prop::collection::vec(finding(), 0..4),
        high in finding(),
    ) {
        let tools = tools();
        let tool = tool_index.get(&tools);
        findings.push(InjectionFinding {
            severity: Severity::High,
            action: FindingAction::Flagged,
            ..high
        });

        let outcome = evaluator().evaluate(&Actor::new(id, role), tool, &scope, &findings);
        prop_assert_eq!(outcome.decision, Decision::Deny);
        prop_assert_eq!(outcome.matched_rule, policy::INJECTION_FLOOR_RULE);
    }

    #[test]
    fn high_risk_tools_are_never_allowed_by_wildcards(
        id in actor_id(),
        role in role(),
        scope in scope(),
    ) {
        let tools = tools();
        let outcome_for = |tool: &ToolDefinition| {
            evaluator().evaluate(&Actor::new(id.clone(), role), tool, &scope, &[])
        };
        for tool in tools.iter().filter(|t| t.risk == RiskTier::High) {
            prop_assert_ne!(outcome_for(tool).decision, Decision::Allow);
        }
    }

    #[test]
    fn external_accounts_are_always_denied(
        suffix in "[a-z]{1,8}",
        role in role(),
        tool_index in any::<prop::sample::Index>(),
        scope in scope(),
    ) {
        let tools = tools();
        let tool = tool_index.get(&tools);
        let outcome = evaluator().evaluate(&Actor::new(format!("ext-{}", suffix), role), tool, &scope, &[]);
        prop_assert_eq!(outcome.decision, Decision::Deny);
    }
}
