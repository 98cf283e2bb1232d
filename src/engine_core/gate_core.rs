// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Gate core.
//!
//! Drives every invocation through validation, screening, policy, approval
//! and execution. Stateless stages run without any lock. Every state change
//! happens under the ledger lock and only after its audit entry committed,
//! so a failed append leaves the invocation at its last durable state and
//! `resume` can pick it up without re-dispatching a tool.
//!
//! Lock order is always ledger, then chain.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::engine::evaluator::{PolicyEvaluator, PolicyOutcome};
use crate::engine::firewall::{ContextFirewall, Screening};
use crate::engine::schema::SchemaValidator;
use crate::engine_core::approval::{self, ApprovalBook, ReviewCheck};
use crate::engine_core::audit::{AuditChain, AuditEvent, AuditReader};
use crate::engine_core::constants::{config, limits, policy};
use crate::engine_core::errors::{ErrorKind, GateError, SchemaError, Violation};
use crate::engine_core::executor::{ExecutionOutcome, ToolExecutor, ToolRegistry};
use crate::engine_core::models::{
    ApprovalTicket, AuditSeverity, AuditStage, Decision, DecisionRecord, Invocation, InvocationId,
    InvocationState, PolicyDefinition, ReviewerDecision, Role, TicketId, TicketStatus,
    ToolCallRequest, ToolDefinition, Verdict,
};
use crate::engine_core::state::{self, InvocationRecord};
use crate::engine_core::taint::{Clean, Tainted};
use crate::engine_core::types::ValidatedArgs;
use crate::utils::security::ContentGuard;
use crate::utils::time;

use InvocationState::*;

/// Runtime knobs for the gate.
#[derive(Debug, Clone)]
pub struct GateSettings {
    pub approval_ttl_secs: u64,
    pub exec_timeout: Duration,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            approval_ttl_secs: config::DEFAULT_APPROVAL_TTL_SECS,
            exec_timeout: Duration::from_millis(config::DEFAULT_EXEC_TIMEOUT_MS),
        }
    }
}

#[derive(Default)]
struct Ledger {
    invocations: HashMap<InvocationId, InvocationRecord>,
    approvals: ApprovalBook,
}

fn transition_details(from: InvocationState, to: InvocationState, extra: Value) -> Value {
    let mut details = json!({
        "from": from,
        "state": to,
        "recorded_at": time::now().to_rfc3339(),
    });
    if let (Some(base), Value::Object(more)) = (details.as_object_mut(), extra) {
        base.extend(more);
    }
    details
}

fn snapshot(value: &Value) -> Value {
    ContentGuard::snapshot(value, limits::MAX_AUDIT_TEXT_CHARS)
}

pub struct GateCore {
    policy_name: String,
    reviewer_roles: Vec<Role>,
    firewall: ContextFirewall,
    evaluator: PolicyEvaluator,
    executor: ToolExecutor,
    chain: Arc<AuditChain>,
    ledger: Mutex<Ledger>,
    settings: GateSettings,
}

impl GateCore {
    pub fn new(
        policy: &PolicyDefinition,
        mut registry: ToolRegistry,
        chain: Arc<AuditChain>,
        settings: GateSettings,
    ) -> Result<Self, GateError> {
        registry.apply_overrides(&policy.tools);
        let firewall = ContextFirewall::new(&policy.firewall)?;
        let evaluator = PolicyEvaluator::new(policy);

        info!(
            policy = %policy.name,
            rules = evaluator.rules().len(),
            tools = registry.definitions().len(),
            "Gate ready"
        );

        Ok(Self {
            policy_name: policy.name.clone(),
            reviewer_roles: policy.reviewer_roles.clone(),
            firewall,
            evaluator,
            executor: ToolExecutor::new(Arc::new(registry), settings.exec_timeout),
            chain,
            ledger: Mutex::new(Ledger::default()),
            settings,
        })
    }

    pub fn policy_name(&self) -> &str {
        &self.policy_name
    }

    pub fn tools(&self) -> Vec<ToolDefinition> {
        self.executor.registry().definitions()
    }

    pub fn firewall(&self) -> &ContextFirewall {
        &self.firewall
    }

    /// Read-only ledger access for audit consumers.
    pub fn audit_reader(&self) -> AuditReader {
        AuditReader::new(self.chain.clone())
    }

    // --- Planner surface ---

    /// Gate one proposed call. Only `ChainIo` comes back as `Err`; every
    /// other outcome is a committed decision record.
    pub async fn submit(&self, request: ToolCallRequest) -> Result<DecisionRecord, GateError> {
        let invocation = Invocation {
            id: InvocationId::generate(),
            actor: request.actor,
            tool: request.tool,
            arguments: request.arguments,
            scope: request.scope,
            created_at: time::now(),
            state: Created,
            findings: Vec::new(),
        };
        let id = invocation.id;
        info!(
            invocation_id = %id,
            actor = %invocation.actor.id,
            tool = %invocation.tool,
            scope = %invocation.scope,
            "Invocation created"
        );

        self.ledger
            .lock()
            .await
            .invocations
            .insert(id, InvocationRecord::new(invocation, request.evidence));

        self.run_stages(id).await
    }

    /// Continue an invocation from its last durable state.
    pub async fn resume(&self, id: InvocationId) -> Result<DecisionRecord, GateError> {
        let (current, decision, pending) = {
            let ledger = self.ledger.lock().await;
            let rec = ledger
                .invocations
                .get(&id)
                .ok_or_else(|| GateError::NotFound(format!("invocation {}", id)))?;
            (rec.state(), rec.decision, rec.pending_outcome.clone())
        };
        info!(invocation_id = %id, state = %current, "Resuming invocation");

        match (current, decision, pending) {
            (Created, _, _) => self.run_stages(id).await,
            (PolicyEvaluated, Some(Decision::Allow), _) | (Approved, _, _) => self.execute(id).await,
            (PolicyEvaluated, Some(Decision::RequireApproval), _) => {
                let mut ledger = self.ledger.lock().await;
                let Ledger {
                    invocations,
                    approvals,
                } = &mut *ledger;
                let rec = invocations
                    .get_mut(&id)
                    .ok_or_else(|| GateError::NotFound(format!("invocation {}", id)))?;
                if rec.state() != PolicyEvaluated {
                    return Ok(rec.to_decision_record());
                }
                self.open_ticket(rec, approvals).await
            }
            (Executing, _, Some(outcome)) => self.commit_outcome(id, outcome).await,
            _ => self.record(id).await,
        }
    }

    /// Withdraw an invocation that has not started executing.
    pub async fn cancel(&self, id: InvocationId, reason: &str) -> Result<DecisionRecord, GateError> {
        let mut ledger = self.ledger.lock().await;
        let Ledger {
            invocations,
            approvals,
        } = &mut *ledger;
        let rec = invocations
            .get_mut(&id)
            .ok_or_else(|| GateError::NotFound(format!("invocation {}", id)))?;
        let from = rec.state();
        state::check(from, Rejected)?;

        let receipt = self
            .chain
            .append(AuditEvent {
                invocation_id: id,
                stage: AuditStage::Cancelled,
                severity: AuditSeverity::Info,
                details: transition_details(
                    from,
                    Rejected,
                    json!({ "reason": reason, "ticket_id": rec.ticket_id }),
                ),
            })
            .await?;
        rec.apply(Rejected, receipt.seq)?;
        rec.reason = format!("Cancelled: {}", reason);
        if let Some(ticket_id) = rec.ticket_id {
            approvals.close(&ticket_id, TicketStatus::Cancelled, None, time::now());
        }

        info!(invocation_id = %id, from = %from, "Invocation cancelled");
        Ok(rec.to_decision_record())
    }

    // --- Reviewer surface ---

    pub async fn review(
        &self,
        ticket_id: TicketId,
        decision: ReviewerDecision,
    ) -> Result<DecisionRecord, GateError> {
        self.review_at(ticket_id, decision, time::now()).await
    }

    /// Apply a reviewer decision as of `now`. The first accepted decision
    /// wins; later ones fail with `AlreadyDecided`.
    pub async fn review_at(
        &self,
        ticket_id: TicketId,
        decision: ReviewerDecision,
        now: DateTime<Utc>,
    ) -> Result<DecisionRecord, GateError> {
        let mut ledger = self.ledger.lock().await;
        let Ledger {
            invocations,
            approvals,
        } = &mut *ledger;

        let ticket = approvals
            .get(&ticket_id)
            .cloned()
            .ok_or_else(|| GateError::NotFound(format!("ticket {}", ticket_id)))?;
        let check = approval::check_review(&ticket, &decision, &self.reviewer_roles, now)
            .inspect_err(|e| {
                warn!(
                    ticket_id = %ticket_id,
                    reviewer = %decision.reviewer.id,
                    error = %e,
                    "Review attempt refused"
                )
            })?;

        let id = ticket.invocation_id;
        let rec = invocations
            .get_mut(&id)
            .ok_or_else(|| GateError::NotFound(format!("invocation {}", id)))?;

        let verdict = match check {
            ReviewCheck::Expire => {
                self.expire(rec, approvals, &ticket, now).await?;
                return Err(GateError::AlreadyDecided {
                    ticket: ticket_id.to_string(),
                    state: Expired,
                });
            }
            ReviewCheck::Accept(verdict) => verdict,
        };

        let (stage, to, status) = match verdict {
            Verdict::Approve => (AuditStage::Approved, Approved, TicketStatus::Approved),
            Verdict::Reject => (AuditStage::Rejected, Rejected, TicketStatus::Rejected),
        };
        let from = rec.state();
        state::check(from, to)?;

        let receipt = self
            .chain
            .append(AuditEvent {
                invocation_id: id,
                stage,
                severity: AuditSeverity::Info,
                details: transition_details(
                    from,
                    to,
                    json!({
                        "ticket_id": ticket_id,
                        "reviewer": decision.reviewer.id,
                        "reviewer_role": decision.reviewer.role,
                        "verdict": verdict,
                        "rationale": decision.rationale,
                    }),
                ),
            })
            .await?;
        rec.apply(to, receipt.seq)?;
        approvals.close(&ticket_id, status, Some(&decision), now);

        let rationale = decision
            .rationale
            .as_deref()
            .map(|r| format!(": {}", r))
            .unwrap_or_default();
        info!(invocation_id = %id, ticket_id = %ticket_id, reviewer = %decision.reviewer.id, ?verdict, "Ticket decided");

        match verdict {
            Verdict::Reject => {
                rec.reason = format!("Rejected by {}{}", decision.reviewer.id, rationale);
                rec.error = Some(ErrorKind::PolicyDenied);
                Ok(rec.to_decision_record())
            }
            Verdict::Approve => {
                rec.reason = format!("Approved by {}{}", decision.reviewer.id, rationale);
                drop(ledger);
                self.execute(id).await
            }
        }
    }

    /// Expire every open ticket whose deadline is at or before `now`.
    /// Re-sweeping is a no-op.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<InvocationId>, GateError> {
        let mut ledger = self.ledger.lock().await;
        let Ledger {
            invocations,
            approvals,
        } = &mut *ledger;

        let mut expired = Vec::new();
        for ticket_id in approvals.due(now) {
            let Some(ticket) = approvals.get(&ticket_id).cloned() else {
                continue;
            };
            let Some(rec) = invocations.get_mut(&ticket.invocation_id) else {
                continue;
            };
            if rec.state() != PendingApproval {
                continue;
            }
            self.expire(rec, approvals, &ticket, now).await?;
            expired.push(ticket.invocation_id);
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Expired approval tickets");
        }
        Ok(expired)
    }

    /// Background deadline sweep.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let gate = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = gate.sweep_expired(time::now()).await {
                    error!(error = %e, "Approval sweep failed");
                }
            }
        })
    }

    // --- Lookups ---

    pub async fn invocation(&self, id: InvocationId) -> Option<InvocationRecord> {
        self.ledger.lock().await.invocations.get(&id).cloned()
    }

    pub async fn ticket(&self, id: TicketId) -> Option<ApprovalTicket> {
        self.ledger.lock().await.approvals.get(&id).cloned()
    }

    pub async fn ticket_for(&self, id: InvocationId) -> Option<ApprovalTicket> {
        self.ledger.lock().await.approvals.for_invocation(&id).cloned()
    }

    pub async fn pending_tickets(&self) -> Vec<ApprovalTicket> {
        let ledger = self.ledger.lock().await;
        let mut open: Vec<ApprovalTicket> = ledger.approvals.open().cloned().collect();
        open.sort_by_key(|t| t.deadline);
        open
    }

    /// JSON snapshot of every invocation and ticket record.
    pub async fn export_records(&self) -> Value {
        let ledger = self.ledger.lock().await;
        let mut invocations: Vec<&InvocationRecord> = ledger.invocations.values().collect();
        invocations.sort_by_key(|r| r.invocation.created_at);
        let mut tickets: Vec<&ApprovalTicket> = ledger.approvals.all().collect();
        tickets.sort_by_key(|t| t.created_at);
        json!({
            "policy": self.policy_name,
            "invocations": invocations,
            "tickets": tickets,
        })
    }

    // --- Pipeline ---

    async fn record(&self, id: InvocationId) -> Result<DecisionRecord, GateError> {
        self.ledger
            .lock()
            .await
            .invocations
            .get(&id)
            .map(InvocationRecord::to_decision_record)
            .ok_or_else(|| GateError::NotFound(format!("invocation {}", id)))
    }

    /// Validation, screening and policy: no lock held until the commit.
    async fn run_stages(&self, id: InvocationId) -> Result<DecisionRecord, GateError> {
        let (invocation, evidence) = {
            let ledger = self.ledger.lock().await;
            let rec = ledger
                .invocations
                .get(&id)
                .ok_or_else(|| GateError::NotFound(format!("invocation {}", id)))?;
            (rec.invocation.clone(), rec.evidence.clone())
        };

        let Some(definition) = self.executor.registry().definition(&invocation.tool).cloned() else {
            let err = SchemaError::new("tool", Violation::UnknownTool);
            return self.commit_validation_rejected(id, err).await;
        };
        let mut args = match SchemaValidator::validate(&definition, &invocation.arguments) {
            Ok(args) => args,
            Err(err) => return self.commit_validation_rejected(id, err).await,
        };

        let tainted: Vec<Tainted<String>> = evidence
            .into_iter()
            .enumerate()
            .map(|(i, text)| Tainted::new(text, format!("evidence[{}]", i)))
            .collect();
        let screening = self.firewall.screen(tainted, &mut args, &definition);

        let outcome = self.evaluator.evaluate(
            &invocation.actor,
            &definition,
            &invocation.scope,
            &screening.findings,
        );

        self.commit_policy(id, &definition, args, screening, outcome).await
    }

    async fn commit_validation_rejected(
        &self,
        id: InvocationId,
        err: SchemaError,
    ) -> Result<DecisionRecord, GateError> {
        let mut ledger = self.ledger.lock().await;
        let rec = ledger
            .invocations
            .get_mut(&id)
            .ok_or_else(|| GateError::NotFound(format!("invocation {}", id)))?;
        let from = rec.state();
        state::check(from, Rejected)?;

        let receipt = self
            .chain
            .append(AuditEvent {
                invocation_id: id,
                stage: AuditStage::ValidationRejected,
                severity: AuditSeverity::Info,
                details: transition_details(
                    from,
                    Rejected,
                    json!({
                        "actor": rec.invocation.actor.id,
                        "tool": rec.invocation.tool,
                        "scope": rec.invocation.scope,
                        "field": err.field,
                        "violation": err.violation,
                        "arguments": snapshot(&rec.invocation.arguments),
                    }),
                ),
            })
            .await?;
        rec.apply(Rejected, receipt.seq)?;
        rec.reason = GateError::Schema(err).user_message();
        rec.error = Some(ErrorKind::SchemaError);

        warn!(invocation_id = %id, reason = %rec.reason, "Validation rejected");
        Ok(rec.to_decision_record())
    }

    async fn commit_policy(
        &self,
        id: InvocationId,
        definition: &ToolDefinition,
        args: ValidatedArgs,
        screening: Screening,
        outcome: PolicyOutcome,
    ) -> Result<DecisionRecord, GateError> {
        let mut ledger = self.ledger.lock().await;
        let Ledger {
            invocations,
            approvals,
        } = &mut *ledger;
        let rec = invocations
            .get_mut(&id)
            .ok_or_else(|| GateError::NotFound(format!("invocation {}", id)))?;

        let denied = outcome.decision == Decision::Deny;
        let path: &[InvocationState] = if denied {
            &[Validated, Scanned, PolicyEvaluated, Rejected]
        } else {
            &[Validated, Scanned, PolicyEvaluated]
        };
        let from = rec.state();
        state::check_path(from, path)?;
        let to = if denied { Rejected } else { PolicyEvaluated };

        let severity = if screening.is_clean() {
            outcome.severity
        } else {
            outcome.severity.max(AuditSeverity::Elevated)
        };

        let receipt = self
            .chain
            .append(AuditEvent {
                invocation_id: id,
                stage: AuditStage::PolicyEvaluated,
                severity,
                details: transition_details(
                    from,
                    to,
                    json!({
                        "actor": rec.invocation.actor.id,
                        "role": rec.invocation.actor.role,
                        "tool": definition.name,
                        "risk": definition.risk,
                        "scope": rec.invocation.scope,
                        "arguments": snapshot(&args.to_value()),
                        "findings": screening.findings,
                        "decision": outcome.decision,
                        "matched_rule": outcome.matched_rule,
                        "reason": outcome.reason,
                        "explicit_override": outcome.explicit_override,
                    }),
                ),
            })
            .await?;

        rec.apply_path(path, receipt.seq)?;
        rec.decision = Some(outcome.decision);
        rec.matched_rule = Some(outcome.matched_rule.clone());
        rec.invocation.findings = screening.findings;
        rec.validated = Some(args);

        match outcome.decision {
            Decision::Deny => {
                let err = if outcome.matched_rule == policy::INJECTION_FLOOR_RULE {
                    GateError::InjectionDetected(outcome.reason.clone())
                } else {
                    GateError::PolicyDenied {
                        rule: outcome.matched_rule.clone(),
                        reason: outcome.reason.clone(),
                    }
                };
                rec.reason = err.user_message();
                rec.error = Some(err.kind());
                warn!(invocation_id = %id, rule = %outcome.matched_rule, reason = %outcome.reason, "Invocation denied");
                Ok(rec.to_decision_record())
            }
            Decision::RequireApproval => {
                rec.reason = outcome.reason.clone();
                rec.released_evidence = spotlight_all(&screening.evidence);
                info!(invocation_id = %id, rule = %outcome.matched_rule, "Approval required");
                self.open_ticket(rec, approvals).await
            }
            Decision::Allow => {
                rec.reason = outcome.reason.clone();
                rec.released_evidence = spotlight_all(&screening.evidence);
                if outcome.explicit_override {
                    warn!(invocation_id = %id, rule = %outcome.matched_rule, "High-risk tool allowed by explicit rule");
                }
                drop(ledger);
                self.execute(id).await
            }
        }
    }

    async fn open_ticket(
        &self,
        rec: &mut InvocationRecord,
        approvals: &mut ApprovalBook,
    ) -> Result<DecisionRecord, GateError> {
        let from = rec.state();
        state::check(from, PendingApproval)?;

        let ttl = self
            .executor
            .registry()
            .definition(&rec.invocation.tool)
            .and_then(|d| d.approval_ttl_secs)
            .unwrap_or(self.settings.approval_ttl_secs);
        let ticket = ApprovalBook::draft(
            rec.id(),
            &rec.invocation.actor,
            &rec.invocation.tool,
            ttl,
            time::now(),
        );

        let receipt = self
            .chain
            .append(AuditEvent {
                invocation_id: rec.id(),
                stage: AuditStage::PendingApproval,
                severity: AuditSeverity::Info,
                details: transition_details(
                    from,
                    PendingApproval,
                    json!({
                        "ticket_id": ticket.id,
                        "requested_by": rec.invocation.actor.id,
                        "deadline": ticket.deadline.to_rfc3339(),
                    }),
                ),
            })
            .await?;
        rec.apply(PendingApproval, receipt.seq)?;
        rec.ticket_id = Some(ticket.id);
        info!(invocation_id = %rec.id(), ticket_id = %ticket.id, deadline = %ticket.deadline, "Ticket opened");
        approvals.insert(ticket);

        Ok(rec.to_decision_record())
    }

    async fn expire(
        &self,
        rec: &mut InvocationRecord,
        approvals: &mut ApprovalBook,
        ticket: &ApprovalTicket,
        now: DateTime<Utc>,
    ) -> Result<(), GateError> {
        let from = rec.state();
        state::check(from, Expired)?;

        let receipt = self
            .chain
            .append(AuditEvent {
                invocation_id: rec.id(),
                stage: AuditStage::Expired,
                severity: AuditSeverity::Info,
                details: transition_details(
                    from,
                    Expired,
                    json!({
                        "ticket_id": ticket.id,
                        "deadline": ticket.deadline.to_rfc3339(),
                    }),
                ),
            })
            .await?;
        rec.apply(Expired, receipt.seq)?;
        rec.reason = "Approval deadline passed without a decision".to_string();
        approvals.close(&ticket.id, TicketStatus::Expired, None, now);

        info!(invocation_id = %rec.id(), ticket_id = %ticket.id, "Ticket expired");
        Ok(())
    }

    /// Audit the move into `EXECUTING`, then dispatch outside the lock.
    async fn execute(&self, id: InvocationId) -> Result<DecisionRecord, GateError> {
        let permit = {
            let mut ledger = self.ledger.lock().await;
            let rec = ledger
                .invocations
                .get_mut(&id)
                .ok_or_else(|| GateError::NotFound(format!("invocation {}", id)))?;
            state::precheck_executing(rec)?;
            let from = rec.state();
            let authorized_by = if from == Approved { "approval" } else { "policy" };

            let receipt = self
                .chain
                .append(AuditEvent {
                    invocation_id: id,
                    stage: AuditStage::Executing,
                    severity: AuditSeverity::Info,
                    details: transition_details(
                        from,
                        Executing,
                        json!({
                            "tool": rec.invocation.tool,
                            "authorized_by": authorized_by,
                            "ticket_id": rec.ticket_id,
                        }),
                    ),
                })
                .await?;
            state::enter_executing(rec, receipt.seq)?
        };

        let outcome = self.executor.dispatch(permit).await;
        self.commit_outcome(id, outcome).await
    }

    async fn commit_outcome(
        &self,
        id: InvocationId,
        outcome: ExecutionOutcome,
    ) -> Result<DecisionRecord, GateError> {
        let mut ledger = self.ledger.lock().await;
        let rec = ledger
            .invocations
            .get_mut(&id)
            .ok_or_else(|| GateError::NotFound(format!("invocation {}", id)))?;
        let from = rec.state();
        let (stage, landed, severity) = match &outcome {
            ExecutionOutcome::Completed { .. } => (AuditStage::Completed, Completed, AuditSeverity::Info),
            ExecutionOutcome::Failed { .. } => (AuditStage::Failed, Failed, AuditSeverity::Elevated),
        };
        state::check_path(from, &[landed, Audited])?;

        // Kept until the append succeeds so a retry never re-dispatches
        rec.pending_outcome = Some(outcome.clone());

        let details = match &outcome {
            ExecutionOutcome::Completed { result } => json!({ "result": snapshot(result) }),
            ExecutionOutcome::Failed { error, reason } => json!({ "error": error, "reason": reason }),
        };
        let receipt = self
            .chain
            .append(AuditEvent {
                invocation_id: id,
                stage,
                severity,
                details: transition_details(from, Audited, details),
            })
            .await?;
        rec.apply_path(&[landed, Audited], receipt.seq)?;
        rec.pending_outcome = None;

        match outcome {
            ExecutionOutcome::Completed { result } => {
                rec.result = Some(result);
                rec.error = None;
            }
            ExecutionOutcome::Failed { error, reason } => {
                let err = match error {
                    ErrorKind::Timeout => GateError::Timeout(self.settings.exec_timeout.as_millis() as u64),
                    _ => GateError::ExecutionFailure(reason),
                };
                rec.reason = err.user_message();
                rec.error = Some(err.kind());
            }
        }

        info!(invocation_id = %id, stage = %stage, "Invocation audited");
        Ok(rec.to_decision_record())
    }
}

fn spotlight_all(evidence: &[Clean<String>]) -> Vec<String> {
    evidence.iter().map(|e| ContentGuard::spotlight(e)).collect()
}
