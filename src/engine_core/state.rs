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

//! Invocation state machine.
//!
//! The transition table is the only place that decides which moves are
//! legal. Entering `EXECUTING` additionally mints an [`ExecutionPermit`],
//! the sole value the executor accepts; nothing outside this module can
//! construct one.

use serde::Serialize;

use crate::engine_core::errors::{ErrorKind, GateError};
use crate::engine_core::executor::ExecutionOutcome;
use crate::engine_core::models::{
    Decision, DecisionRecord, InjectionFinding, Invocation, InvocationId, InvocationState,
    TicketId,
};
use crate::engine_core::traits::ToolContext;
use crate::engine_core::types::ValidatedArgs;

use InvocationState::*;

/// Legal moves. Pre-policy stages chain through in memory; cancellation
/// is a move to `Rejected` from any state before `Executing`.
pub fn is_allowed(from: InvocationState, to: InvocationState) -> bool {
    matches!(
        (from, to),
        (Created, Validated)
            | (Created, Rejected)
            | (Validated, Scanned)
            | (Validated, Rejected)
            | (Scanned, PolicyEvaluated)
            | (Scanned, Rejected)
            | (PolicyEvaluated, Executing)
            | (PolicyEvaluated, PendingApproval)
            | (PolicyEvaluated, Rejected)
            | (PendingApproval, Approved)
            | (PendingApproval, Rejected)
            | (PendingApproval, Expired)
            | (Approved, Executing)
            | (Approved, Rejected)
            | (Executing, Completed)
            | (Executing, Failed)
            | (Completed, Audited)
            | (Failed, Audited)
    )
}

pub fn check(from: InvocationState, to: InvocationState) -> Result<(), GateError> {
    if is_allowed(from, to) {
        Ok(())
    } else {
        Err(GateError::InvalidTransition { from, to })
    }
}

/// Check a multi-step path such as `CREATED → VALIDATED → SCANNED →
/// POLICY_EVALUATED` that commits under a single audit entry.
pub fn check_path(from: InvocationState, path: &[InvocationState]) -> Result<(), GateError> {
    let mut current = from;
    for &next in path {
        check(current, next)?;
        current = next;
    }
    Ok(())
}

/// Book entry for one invocation. Mutated only through this module.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationRecord {
    pub invocation: Invocation,
    /// Seq of the last audit entry reflecting `invocation.state`
    pub last_seq: Option<u64>,
    pub decision: Option<Decision>,
    pub matched_rule: Option<String>,
    pub reason: String,
    pub ticket_id: Option<TicketId>,
    pub result: Option<serde_json::Value>,
    pub error: Option<ErrorKind>,
    #[serde(skip)]
    pub(crate) evidence: Vec<String>,
    #[serde(skip)]
    pub(crate) validated: Option<ValidatedArgs>,
    /// Spotlighted evidence released to the planner after screening
    #[serde(skip)]
    pub(crate) released_evidence: Vec<String>,
    /// Outcome captured by the executor but not yet committed
    #[serde(skip)]
    pub(crate) pending_outcome: Option<ExecutionOutcome>,
}

impl InvocationRecord {
    pub(crate) fn new(invocation: Invocation, evidence: Vec<String>) -> Self {
        Self {
            invocation,
            last_seq: None,
            decision: None,
            matched_rule: None,
            reason: String::new(),
            ticket_id: None,
            result: None,
            error: None,
            evidence,
            validated: None,
            released_evidence: Vec::new(),
            pending_outcome: None,
        }
    }

    pub fn id(&self) -> InvocationId {
        self.invocation.id
    }

    pub fn state(&self) -> InvocationState {
        self.invocation.state
    }

    pub fn findings(&self) -> &[InjectionFinding] {
        &self.invocation.findings
    }

    /// Apply an already-audited move. `Executing` is refused here; it goes
    /// through [`enter_executing`].
    pub(crate) fn apply(&mut self, to: InvocationState, seq: u64) -> Result<(), GateError> {
        if to == Executing {
            return Err(GateError::InvalidTransition {
                from: self.invocation.state,
                to,
            });
        }
        check(self.invocation.state, to)?;
        self.invocation.state = to;
        self.last_seq = Some(seq);
        Ok(())
    }

    /// Apply an audited multi-step path.
    pub(crate) fn apply_path(&mut self, path: &[InvocationState], seq: u64) -> Result<(), GateError> {
        check_path(self.invocation.state, path)?;
        if path.contains(&Executing) {
            return Err(GateError::InvalidTransition {
                from: self.invocation.state,
                to: Executing,
            });
        }
        if let Some(&last) = path.last() {
            self.invocation.state = last;
            self.last_seq = Some(seq);
        }
        Ok(())
    }

    /// True when the record may enter `Executing` next.
    pub fn is_cleared_for_execution(&self) -> bool {
        match self.invocation.state {
            PolicyEvaluated => self.decision == Some(Decision::Allow),
            Approved => true,
            _ => false,
        }
    }

    pub fn to_decision_record(&self) -> DecisionRecord {
        DecisionRecord {
            invocation_id: self.invocation.id,
            status: self.invocation.state,
            reason: self.reason.clone(),
            audit_seq: self.last_seq.unwrap_or_default(),
            decision: self.decision,
            matched_rule: self.matched_rule.clone(),
            ticket_id: self.ticket_id,
            findings: self.invocation.findings.clone(),
            result: self.result.clone(),
            error: self.error,
            evidence: self.released_evidence.clone(),
        }
    }
}

/// Proof that an invocation was audited into `EXECUTING`.
#[derive(Debug)]
pub struct ExecutionPermit {
    invocation_id: InvocationId,
    tool: String,
    args: ValidatedArgs,
    context: ToolContext,
    audit_seq: u64,
}

impl ExecutionPermit {
    pub fn invocation_id(&self) -> InvocationId {
        self.invocation_id
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn audit_seq(&self) -> u64 {
        self.audit_seq
    }

    pub(crate) fn into_parts(self) -> (String, ValidatedArgs, ToolContext) {
        (self.tool, self.args, self.context)
    }
}

/// Everything `enter_executing` needs, checked before the entry is appended.
pub(crate) fn precheck_executing(record: &InvocationRecord) -> Result<(), GateError> {
    let from = record.invocation.state;
    if !record.is_cleared_for_execution() || record.validated.is_none() {
        return Err(GateError::InvalidTransition { from, to: Executing });
    }
    check(from, Executing)
}

/// Move a cleared record into `Executing` after its entry committed at
/// `seq`, returning the permit for dispatch.
pub(crate) fn enter_executing(
    record: &mut InvocationRecord,
    seq: u64,
) -> Result<ExecutionPermit, GateError> {
    precheck_executing(record)?;
    let from = record.invocation.state;
    let args = record
        .validated
        .clone()
        .ok_or(GateError::InvalidTransition { from, to: Executing })?;

    record.invocation.state = Executing;
    record.last_seq = Some(seq);

    Ok(ExecutionPermit {
        invocation_id: record.invocation.id,
        tool: record.invocation.tool.clone(),
        args,
        context: ToolContext {
            invocation_id: record.invocation.id,
            actor: record.invocation.actor.clone(),
            scope: record.invocation.scope.clone(),
        },
        audit_seq: seq,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_core::models::{Actor, Role};
    use serde_json::{json, Map};

    fn record(state: InvocationState) -> InvocationRecord {
        let mut rec = InvocationRecord::new(
            Invocation {
                id: InvocationId::generate(),
                actor: Actor::new("r", Role::Researcher),
                tool: "summarize_text".to_string(),
                arguments: json!({"text": "x"}),
                scope: "p1".to_string(),
                created_at: crate::utils::time::now(),
                state,
                findings: vec![],
            },
            vec![],
        );
        rec.validated = Some(ValidatedArgs::new(Map::new()));
        rec
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        let all = [
            Created, Validated, Scanned, PolicyEvaluated, PendingApproval, Approved, Rejected,
            Expired, Executing, Completed, Failed, Audited,
        ];
        for from in [Rejected, Expired, Audited] {
            for to in all {
                assert!(!is_allowed(from, to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_no_path_skips_the_gate() {
        assert!(!is_allowed(Created, Executing));
        assert!(!is_allowed(PendingApproval, Executing));
        assert!(!is_allowed(Expired, Executing));
        assert!(check_path(Created, &[Validated, Scanned, PolicyEvaluated]).is_ok());
        assert!(check_path(Created, &[Scanned]).is_err());
    }

    #[test]
    fn test_permit_requires_allow_or_approval() {
        let mut denied = record(PolicyEvaluated);
        denied.decision = Some(Decision::RequireApproval);
        assert!(enter_executing(&mut denied, 1).is_err());
        assert_eq!(denied.state(), PolicyEvaluated);

        let mut allowed = record(PolicyEvaluated);
        allowed.decision = Some(Decision::Allow);
        let permit = enter_executing(&mut allowed, 4).unwrap();
        assert_eq!(permit.audit_seq(), 4);
        assert_eq!(allowed.state(), Executing);

        // Entered exactly once
        assert!(enter_executing(&mut allowed, 5).is_err());

        let mut approved = record(Approved);
        assert!(enter_executing(&mut approved, 9).is_ok());
    }

    #[test]
    fn test_apply_refuses_executing() {
        let mut rec = record(Approved);
        assert!(rec.apply(Executing, 3).is_err());
        assert!(rec.apply_path(&[Executing], 3).is_err());
        assert_eq!(rec.state(), Approved);
    }
}
