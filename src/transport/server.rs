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

//! Request loop: a reader feeding per-request tasks, and a single writer
//! task draining replies. Requests run concurrently; the gate serializes
//! what needs serializing.

use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};
use std::ops::Bound;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::engine_core::errors::{ErrorKind, GateError};
use crate::engine_core::gate_core::GateCore;
use crate::engine_core::models::ReviewerDecision;
use crate::transport::protocol::{read_frame, write_reply, Frame, GateMessage, GateReply, Operation};
use crate::utils::time;

const REPLY_QUEUE: usize = 64;

fn to_json<T: Serialize>(value: &T) -> Result<Value, GateError> {
    serde_json::to_value(value).map_err(|e| GateError::Io(e.into()))
}

/// Serve until the reader hits EOF, then wait for in-flight requests.
pub async fn serve<R, W>(gate: Arc<GateCore>, reader: R, writer: W) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<GateReply>(REPLY_QUEUE);

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(reply) = rx.recv().await {
            if let Err(e) = write_reply(&mut writer, &reply).await {
                error!("Reply write failed: {}", e);
                break;
            }
        }
    });

    let mut reader = BufReader::new(reader);
    let mut in_flight = JoinSet::new();
    info!(policy = %gate.policy_name(), "Serving on stdio");

    while let Some(frame) = read_frame(&mut reader).await? {
        match frame {
            Frame::Blank => continue,
            Frame::Malformed(reason) => {
                warn!(%reason, "Malformed request");
                let reply = GateReply::rejected(Value::Null, ErrorKind::SchemaError, reason);
                if tx.send(reply).await.is_err() {
                    break;
                }
            }
            Frame::Message(msg) => {
                let gate = gate.clone();
                let tx = tx.clone();
                in_flight.spawn(async move {
                    let reply = dispatch(&gate, msg).await;
                    let _ = tx.send(reply).await;
                });
            }
        }
    }

    while in_flight.join_next().await.is_some() {}
    drop(tx);
    writer_task.await?;
    info!("Input closed, shutting down");
    Ok(())
}

/// Run one request and shape its reply.
pub async fn dispatch(gate: &GateCore, msg: GateMessage) -> GateReply {
    let GateMessage { id, op } = msg;
    match handle(gate, op).await {
        Ok(result) => GateReply::success(id, result),
        Err(e) => {
            if e.is_blocking() {
                error!(error = %e, "Request blocked on the audit ledger");
            }
            GateReply::failure(id, &e)
        }
    }
}

async fn handle(gate: &GateCore, op: Operation) -> Result<Value, GateError> {
    match op {
        Operation::Call(request) => to_json(&gate.submit(request).await?),
        Operation::Review {
            ticket_id,
            reviewer,
            verdict,
            rationale,
        } => {
            let decision = ReviewerDecision {
                reviewer,
                verdict,
                rationale,
            };
            to_json(&gate.review(ticket_id, decision).await?)
        }
        Operation::Cancel {
            invocation_id,
            reason,
        } => to_json(&gate.cancel(invocation_id, &reason).await?),
        Operation::Resume { invocation_id } => to_json(&gate.resume(invocation_id).await?),
        Operation::Sweep => {
            let expired = gate.sweep_expired(time::now()).await?;
            Ok(json!({ "expired": expired }))
        }
        Operation::Verify { from, to } => {
            let start = from.map_or(Bound::Unbounded, Bound::Included);
            let end = to.map_or(Bound::Unbounded, Bound::Included);
            to_json(&gate.audit_reader().verify((start, end)).await?)
        }
        Operation::Entries { invocation_id } => {
            let reader = gate.audit_reader();
            let entries = match invocation_id {
                Some(id) => reader.entries_for(id).await,
                None => reader.entries(..).await,
            };
            to_json(&entries)
        }
        Operation::Pending => to_json(&gate.pending_tickets().await),
        Operation::Tools => to_json(&gate.tools()),
        Operation::Export => Ok(gate.export_records().await),
    }
}
