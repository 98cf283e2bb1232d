#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use toolgate::config::parse_policy;
use toolgate::engine_core::audit::{AuditChain, AuditEntry};
use toolgate::engine_core::errors::GateError;
use toolgate::engine_core::gate_core::{GateCore, GateSettings};
use toolgate::engine_core::models::{
    Actor, AuditStage, FieldKind, FieldSpec, RiskTier, Role, SideEffect, ToolCallRequest,
    ToolDefinition,
};
use toolgate::engine_core::store::MemoryStore;
use toolgate::engine_core::traits::{ChainStore, Tool, ToolContext, ToolFailure};
use toolgate::engine_core::types::ValidatedArgs;
use toolgate::tools;

pub const DEFAULT_POLICY: &str = include_str!("../../policies/default.yaml");

pub const TEST_POLICY: &str = r#"
name: integration
rules:
  - id: count-for-researchers
    priority: 20
    subject: { min_role: Researcher }
    tool: "count"
    decision: ALLOW
  - id: slow-and-broken
    priority: 20
    subject: any
    tool: "misbehave_*"
    decision: ALLOW
  - id: reviewed-count
    priority: 30
    subject: { role: Viewer }
    tool: count
    decision: REQUIRE_APPROVAL
role_permissions:
  Viewer: [summarize_text]
"#;

pub fn actor(id: &str, role: Role) -> Actor {
    Actor::new(id, role)
}

pub fn call(actor: Actor, tool: &str, arguments: Value, scope: &str) -> ToolCallRequest {
    ToolCallRequest {
        actor,
        tool: tool.to_string(),
        arguments,
        scope: scope.to_string(),
        evidence: Vec::new(),
    }
}

pub fn stages(entries: &[AuditEntry]) -> Vec<AuditStage> {
    entries.iter().map(|e| e.stage).collect()
}

/// Counts invocations; used to prove a tool ran exactly once.
pub struct CountTool {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for CountTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "count".to_string(),
            description: "counts calls".to_string(),
            fields: vec![FieldSpec::optional("label", FieldKind::String)],
            risk: RiskTier::Low,
            side_effect: SideEffect::Mutating,
            requires_approval: false,
            allow_unknown_fields: false,
            approval_ttl_secs: None,
        }
    }

    async fn invoke(&self, _args: ValidatedArgs, _ctx: ToolContext) -> Result<Value, ToolFailure> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({ "n": n }))
    }
}

/// Sleeps far past any test timeout.
pub struct HangingTool;

#[async_trait]
impl Tool for HangingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "misbehave_hang".to_string(),
            description: String::new(),
            fields: vec![],
            risk: RiskTier::Low,
            side_effect: SideEffect::ReadOnly,
            requires_approval: false,
            allow_unknown_fields: false,
            approval_ttl_secs: None,
        }
    }

    async fn invoke(&self, _args: ValidatedArgs, _ctx: ToolContext) -> Result<Value, ToolFailure> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Value::Null)
    }
}

pub struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "misbehave_panic".to_string(),
            ..HangingTool.definition()
        }
    }

    async fn invoke(&self, _args: ValidatedArgs, _ctx: ToolContext) -> Result<Value, ToolFailure> {
        panic!("tool blew up");
    }
}

/// Memory store that accepts a fixed number of writes, then fails until
/// reset. A negative budget means unlimited.
pub struct BudgetStore {
    inner: MemoryStore,
    budget: AtomicI64,
}

impl BudgetStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            budget: AtomicI64::new(-1),
        }
    }

    pub fn allow(&self, writes: i64) {
        self.budget.store(writes, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.budget.store(-1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainStore for BudgetStore {
    async fn persist(&self, line: &str) -> Result<(), GateError> {
        let left = self.budget.load(Ordering::SeqCst);
        if left == 0 {
            return Err(GateError::ChainIo("store unavailable".to_string()));
        }
        if left > 0 {
            self.budget.store(left - 1, Ordering::SeqCst);
        }
        self.inner.persist(line).await
    }

    async fn load(&self) -> Result<Vec<String>, GateError> {
        self.inner.load().await
    }
}

pub struct Harness {
    pub gate: Arc<GateCore>,
    pub chain: Arc<AuditChain>,
    pub calls: Arc<AtomicUsize>,
}

pub async fn harness_with(policy_yaml: &str, store: Arc<dyn ChainStore>, settings: GateSettings) -> Harness {
    let policy = parse_policy(policy_yaml).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = tools::default_registry(&[]);
    registry.register(Arc::new(CountTool {
        calls: calls.clone(),
    }));
    registry.register(Arc::new(HangingTool));
    registry.register(Arc::new(PanickingTool));

    let chain = Arc::new(AuditChain::open(store).await.unwrap());
    let gate = GateCore::new(&policy, registry, chain.clone(), settings).unwrap();
    Harness {
        gate: Arc::new(gate),
        chain,
        calls,
    }
}

pub async fn harness(policy_yaml: &str) -> Harness {
    harness_with(policy_yaml, Arc::new(MemoryStore::new()), GateSettings::default()).await
}
