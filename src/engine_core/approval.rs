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

//! Approval tickets.
//!
//! The book is only touched under the gate's ledger lock, which is what
//! serializes concurrent reviewers: the first accepted decision closes the
//! ticket and every later attempt sees it closed.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::engine_core::errors::GateError;
use crate::engine_core::models::{
    Actor, ApprovalTicket, InvocationId, InvocationState, ReviewerDecision, Role, TicketId,
    TicketStatus, Verdict,
};
use crate::utils::time;

/// What a reviewer attempt is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewCheck {
    Accept(Verdict),
    /// The deadline passed before the decision arrived
    Expire,
}

#[derive(Debug, Default)]
pub struct ApprovalBook {
    tickets: HashMap<TicketId, ApprovalTicket>,
    by_invocation: HashMap<InvocationId, TicketId>,
}

impl ApprovalBook {
    /// Draft a ticket; it is only inserted once its audit entry commits.
    pub fn draft(
        invocation_id: InvocationId,
        requested_by: &Actor,
        tool: &str,
        ttl_secs: u64,
        now: DateTime<Utc>,
    ) -> ApprovalTicket {
        ApprovalTicket {
            id: TicketId::generate(),
            invocation_id,
            requested_by: requested_by.clone(),
            tool: tool.to_string(),
            created_at: now,
            deadline: time::deadline_after(now, ttl_secs),
            status: TicketStatus::Pending,
            reviewer: None,
            verdict: None,
            rationale: None,
            decided_at: None,
        }
    }

    pub fn insert(&mut self, ticket: ApprovalTicket) {
        self.by_invocation.insert(ticket.invocation_id, ticket.id);
        self.tickets.insert(ticket.id, ticket);
    }

    pub fn get(&self, id: &TicketId) -> Option<&ApprovalTicket> {
        self.tickets.get(id)
    }

    pub fn for_invocation(&self, id: &InvocationId) -> Option<&ApprovalTicket> {
        self.by_invocation.get(id).and_then(|t| self.tickets.get(t))
    }

    pub fn open(&self) -> impl Iterator<Item = &ApprovalTicket> {
        self.tickets.values().filter(|t| t.is_open())
    }

    pub fn all(&self) -> impl Iterator<Item = &ApprovalTicket> {
        self.tickets.values()
    }

    /// Open tickets whose deadline is at or before `now`, oldest first.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<TicketId> {
        let mut due: Vec<&ApprovalTicket> = self.open().filter(|t| t.deadline <= now).collect();
        due.sort_by_key(|t| (t.deadline, t.created_at));
        due.into_iter().map(|t| t.id).collect()
    }

    /// Close a ticket after its audit entry committed.
    pub fn close(
        &mut self,
        id: &TicketId,
        status: TicketStatus,
        reviewer: Option<&ReviewerDecision>,
        now: DateTime<Utc>,
    ) {
        if let Some(ticket) = self.tickets.get_mut(id) {
            ticket.status = status;
            ticket.decided_at = Some(now);
            if let Some(decision) = reviewer {
                ticket.reviewer = Some(decision.reviewer.id.clone());
                ticket.verdict = Some(decision.verdict);
                ticket.rationale = decision.rationale.clone();
            }
        }
    }
}

fn invocation_state_for(status: TicketStatus) -> InvocationState {
    match status {
        TicketStatus::Pending => InvocationState::PendingApproval,
        TicketStatus::Approved => InvocationState::Approved,
        TicketStatus::Expired => InvocationState::Expired,
        TicketStatus::Rejected | TicketStatus::Cancelled => InvocationState::Rejected,
    }
}

/// Decide what a reviewer attempt may do. Authorization is checked before
/// the deadline so an unauthorized caller cannot trigger a commit.
pub fn check_review(
    ticket: &ApprovalTicket,
    decision: &ReviewerDecision,
    reviewer_roles: &[Role],
    now: DateTime<Utc>,
) -> Result<ReviewCheck, GateError> {
    if !ticket.is_open() {
        return Err(GateError::AlreadyDecided {
            ticket: ticket.id.to_string(),
            state: invocation_state_for(ticket.status),
        });
    }
    if !reviewer_roles.contains(&decision.reviewer.role) {
        return Err(GateError::PolicyDenied {
            rule: "reviewer-roles".to_string(),
            reason: format!(
                "{} ({}) may not review approval tickets",
                decision.reviewer.id, decision.reviewer.role
            ),
        });
    }
    if decision.reviewer.id == ticket.requested_by.id {
        return Err(GateError::PolicyDenied {
            rule: "no-self-review".to_string(),
            reason: format!("{} cannot review their own request", decision.reviewer.id),
        });
    }
    if now >= ticket.deadline {
        return Ok(ReviewCheck::Expire);
    }
    Ok(ReviewCheck::Accept(decision.verdict))
}
