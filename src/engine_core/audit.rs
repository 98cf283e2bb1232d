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

//! Hash-chained audit ledger.
//!
//! Each entry commits to its predecessor:
//! `hash = sha256(prev_hash ∥ canonical_payload ∥ seq_be)`, hex encoded, with
//! a genesis `prev_hash` of 64 zeros. The canonical payload is compact JSON
//! with sorted keys over the invocation id, stage, severity and details, so
//! every stored field except `seq`, `prev_hash` and `hash` (which are checked
//! structurally) is covered by the digest.
//!
//! `AuditChain` is the single writer. Appends are serialized by one lock and
//! an entry only becomes visible after the store accepted it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::engine_core::constants::chain::GENESIS_HASH;
use crate::engine_core::errors::GateError;
use crate::engine_core::models::{AuditSeverity, AuditStage, InvocationId};
use crate::engine_core::traits::ChainStore;

/// One committed ledger entry, exactly as stored.
///
/// `payload` is the canonical JSON text and is hashed verbatim; the
/// `invocation_id` and `stage` columns duplicate what it contains so
/// consumers can filter without parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditEntry {
    pub seq: u64,
    pub invocation_id: String,
    pub stage: AuditStage,
    pub payload: String,
    pub prev_hash: String,
    pub hash: String,
}

/// Decoded form of an entry's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPayload {
    pub invocation_id: String,
    pub stage: AuditStage,
    pub severity: AuditSeverity,
    pub details: Value,
}

impl AuditEntry {
    pub fn compute_hash(&self) -> String {
        chain_hash(&self.prev_hash, &self.payload, self.seq)
    }

    pub fn decode(&self) -> Result<AuditPayload, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }

    pub fn severity(&self) -> Option<AuditSeverity> {
        self.decode().ok().map(|p| p.severity)
    }

    pub fn details(&self) -> Value {
        self.decode().map(|p| p.details).unwrap_or(Value::Null)
    }

    /// `details.state`, the invocation state this entry moved to.
    pub fn resulting_state(&self) -> Option<String> {
        self.details()
            .get("state")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn invocation(&self) -> Option<InvocationId> {
        self.invocation_id.parse().ok()
    }

    /// The plain columns must agree with the hashed payload.
    fn columns_match_payload(&self) -> bool {
        matches!(
            self.decode(),
            Ok(p) if p.invocation_id == self.invocation_id && p.stage == self.stage
        )
    }
}

/// Event handed to `append`; the chain assigns seq and hashes.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub invocation_id: InvocationId,
    pub stage: AuditStage,
    pub severity: AuditSeverity,
    pub details: Value,
}

impl AuditEvent {
    fn canonical_payload(&self) -> String {
        let payload = serde_json::json!({
            "invocation_id": self.invocation_id.to_string(),
            "stage": self.stage,
            "severity": self.severity,
            "details": self.details,
        });
        canonical_json(&payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReceipt {
    pub seq: u64,
    pub hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DivergenceKind {
    /// Entry cannot be decoded
    Unreadable,
    /// Stored seq does not match its position
    SequenceGap,
    /// prev_hash does not link to the preceding entry
    PrevHashMismatch,
    /// Recomputed hash differs from the stored one
    HashMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    pub seq: u64,
    pub kind: DivergenceKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Entries that verified before the first divergence (or in total)
    pub checked: u64,
    pub first_divergence: Option<Divergence>,
}

impl VerifyReport {
    pub fn is_intact(&self) -> bool {
        self.first_divergence.is_none()
    }
}

/// Compact JSON with object keys sorted lexicographically at every level.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

pub fn chain_hash(prev_hash: &str, canonical_payload: &str, seq: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(canonical_payload.as_bytes());
    hasher.update(seq.to_be_bytes());
    hex::encode(hasher.finalize())
}

fn resolve_range(range: &impl RangeBounds<u64>, len: u64) -> (u64, u64) {
    let start = match range.start_bound() {
        Bound::Included(s) => *s,
        Bound::Excluded(s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(e) => e.saturating_add(1),
        Bound::Excluded(e) => *e,
        Bound::Unbounded => len,
    };
    (start.min(len), end.min(len))
}

/// Verify stored lines over a seq range. Bounds beyond the head are clamped.
///
/// For a range starting after 0 the stored hash of the entry just before the
/// range anchors the linkage check.
pub fn verify_lines(lines: &[String], range: impl RangeBounds<u64>) -> VerifyReport {
    let (start, end) = resolve_range(&range, lines.len() as u64);
    let mut report = VerifyReport {
        checked: 0,
        first_divergence: None,
    };
    if start >= end {
        return report;
    }

    let mut expected_prev = if start == 0 {
        Some(GENESIS_HASH.to_string())
    } else {
        serde_json::from_str::<AuditEntry>(&lines[(start - 1) as usize])
            .ok()
            .map(|e| e.hash)
    };

    for seq in start..end {
        let diverge = |kind| Divergence { seq, kind };
        let entry = match serde_json::from_str::<AuditEntry>(&lines[seq as usize]) {
            Ok(entry) => entry,
            Err(_) => {
                report.first_divergence = Some(diverge(DivergenceKind::Unreadable));
                return report;
            }
        };
        if entry.seq != seq {
            report.first_divergence = Some(diverge(DivergenceKind::SequenceGap));
            return report;
        }
        if expected_prev.as_deref() != Some(entry.prev_hash.as_str()) {
            report.first_divergence = Some(diverge(DivergenceKind::PrevHashMismatch));
            return report;
        }
        if entry.compute_hash() != entry.hash || !entry.columns_match_payload() {
            report.first_divergence = Some(diverge(DivergenceKind::HashMismatch));
            return report;
        }
        expected_prev = Some(entry.hash);
        report.checked += 1;
    }
    report
}

struct ChainState {
    head: String,
    entries: Vec<AuditEntry>,
}

/// Single-writer ledger service.
pub struct AuditChain {
    store: Arc<dyn ChainStore>,
    state: Mutex<ChainState>,
}

impl AuditChain {
    /// Open over a store, resuming its sequence and head hash.
    /// A store that does not verify is refused.
    pub async fn open(store: Arc<dyn ChainStore>) -> Result<Self, GateError> {
        let lines = store.load().await?;
        let report = verify_lines(&lines, ..);
        if let Some(divergence) = report.first_divergence {
            error!(
                seq = divergence.seq,
                kind = ?divergence.kind,
                "Refusing to open a ledger that fails verification"
            );
            return Err(GateError::ChainIo(format!(
                "ledger fails verification at seq {} ({:?})",
                divergence.seq, divergence.kind
            )));
        }

        let mut entries = Vec::with_capacity(lines.len());
        for line in &lines {
            let entry: AuditEntry = serde_json::from_str(line)
                .map_err(|e| GateError::ChainIo(format!("undecodable ledger entry: {}", e)))?;
            entries.push(entry);
        }
        let head = entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        Ok(Self {
            store,
            state: Mutex::new(ChainState { head, entries }),
        })
    }

    /// Append one entry. On `ChainIo` nothing was committed and the head
    /// does not move.
    pub async fn append(&self, event: AuditEvent) -> Result<AuditReceipt, GateError> {
        let mut state = self.state.lock().await;
        let seq = state.entries.len() as u64;

        let mut entry = AuditEntry {
            seq,
            invocation_id: event.invocation_id.to_string(),
            stage: event.stage,
            payload: event.canonical_payload(),
            prev_hash: state.head.clone(),
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();

        let line = serde_json::to_string(&entry)
            .map_err(|e| GateError::ChainIo(format!("entry serialization failed: {}", e)))?;
        if let Err(e) = self.store.persist(&line).await {
            error!(seq, stage = %entry.stage, error = %e, "Audit append failed");
            return Err(e);
        }

        info!(
            target: "audit",
            seq,
            invocation_id = %entry.invocation_id,
            stage = %entry.stage,
            severity = ?event.severity,
            hash = %entry.hash,
            "AUDIT_COMMIT"
        );

        let receipt = AuditReceipt {
            seq,
            hash: entry.hash.clone(),
        };
        state.head = entry.hash.clone();
        state.entries.push(entry);
        Ok(receipt)
    }

    /// Recompute hashes over what the store holds now.
    pub async fn verify(&self, range: impl RangeBounds<u64>) -> Result<VerifyReport, GateError> {
        let lines = self.store.load().await?;
        Ok(verify_lines(&lines, range))
    }

    pub async fn entries(&self, range: impl RangeBounds<u64>) -> Vec<AuditEntry> {
        let state = self.state.lock().await;
        let (start, end) = resolve_range(&range, state.entries.len() as u64);
        state.entries[start as usize..end as usize].to_vec()
    }

    pub async fn entries_for(&self, invocation_id: InvocationId) -> Vec<AuditEntry> {
        let id = invocation_id.to_string();
        let state = self.state.lock().await;
        state
            .entries
            .iter()
            .filter(|e| e.invocation_id == id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> u64 {
        self.state.lock().await.entries.len() as u64
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn head(&self) -> String {
        self.state.lock().await.head.clone()
    }
}

/// Read-only view for audit and explainability consumers.
#[derive(Clone)]
pub struct AuditReader {
    chain: Arc<AuditChain>,
}

impl AuditReader {
    pub fn new(chain: Arc<AuditChain>) -> Self {
        Self { chain }
    }

    pub async fn entries(&self, range: impl RangeBounds<u64>) -> Vec<AuditEntry> {
        self.chain.entries(range).await
    }

    pub async fn entries_for(&self, invocation_id: InvocationId) -> Vec<AuditEntry> {
        self.chain.entries_for(invocation_id).await
    }

    pub async fn verify(&self, range: impl RangeBounds<u64>) -> Result<VerifyReport, GateError> {
        self.chain.verify(range).await
    }

    pub async fn len(&self) -> u64 {
        self.chain.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.chain.is_empty().await
    }

    pub async fn head(&self) -> String {
        self.chain.head().await
    }
}
