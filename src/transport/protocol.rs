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

//! Wire types and bounded line framing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::engine_core::constants::limits;
use crate::engine_core::errors::{ErrorKind, GateError};
use crate::engine_core::models::{Actor, InvocationId, TicketId, ToolCallRequest, Verdict};

/// One inbound line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateMessage {
    #[serde(default)]
    pub id: Value,
    #[serde(flatten)]
    pub op: Operation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Planner: gate one proposed call
    Call(ToolCallRequest),
    /// Reviewer: decide a ticket
    Review {
        ticket_id: TicketId,
        reviewer: Actor,
        verdict: Verdict,
        #[serde(default)]
        rationale: Option<String>,
    },
    Cancel {
        invocation_id: InvocationId,
        #[serde(default = "default_cancel_reason")]
        reason: String,
    },
    Resume {
        invocation_id: InvocationId,
    },
    /// Run the deadline sweep now
    Sweep,
    Verify {
        #[serde(default)]
        from: Option<u64>,
        #[serde(default)]
        to: Option<u64>,
    },
    /// Audit entries, optionally for one invocation
    Entries {
        #[serde(default)]
        invocation_id: Option<InvocationId>,
    },
    Pending,
    Tools,
    Export,
}

fn default_cancel_reason() -> String {
    "cancelled by caller".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyError {
    pub kind: ErrorKind,
    pub message: String,
}

/// One outbound line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateReply {
    pub id: Value,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplyError>,
}

impl GateReply {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, err: &GateError) -> Self {
        Self::rejected(id, err.kind(), err.user_message())
    }

    pub fn rejected(id: Value, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(ReplyError {
                kind,
                message: message.into(),
            }),
        }
    }
}

/// What the framer produced for one line.
#[derive(Debug)]
pub enum Frame {
    Message(GateMessage),
    Blank,
    /// Line was oversized, not UTF-8 or not a valid message
    Malformed(String),
}

/// Read the next line, bounded by `MAX_MESSAGE_SIZE_BYTES`. `Ok(None)` on EOF.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if buf.is_empty() {
                return Ok(None);
            }
            break;
        }
        let (chunk, done) = match available.iter().position(|b| *b == b'\n') {
            Some(i) => (&available[..=i], true),
            None => (available, false),
        };
        let used = chunk.len();
        if (buf.len() + used) as u64 > limits::MAX_MESSAGE_SIZE_BYTES + 1 {
            reader.consume(used);
            if !done {
                // Drain to the newline so the next frame starts clean
                discard_line(reader).await?;
            }
            return Ok(Some(Frame::Malformed(format!(
                "Message exceeded size limit of {} bytes",
                limits::MAX_MESSAGE_SIZE_BYTES
            ))));
        }
        buf.extend_from_slice(chunk);
        reader.consume(used);
        if done {
            break;
        }
    }

    let line = match String::from_utf8(buf) {
        Ok(line) => line,
        Err(_) => return Ok(Some(Frame::Malformed("Invalid UTF-8 in request".to_string()))),
    };
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Some(Frame::Blank));
    }
    debug!("Received: {}", trimmed);

    Ok(Some(match serde_json::from_str::<GateMessage>(trimmed) {
        Ok(msg) => Frame::Message(msg),
        Err(e) => Frame::Malformed(format!("Failed to parse request: {}", e)),
    }))
}

async fn discard_line<R>(reader: &mut R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|b| *b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(());
            }
            None => {
                let n = available.len();
                reader.consume(n);
            }
        }
    }
}

/// Write one reply line and flush.
pub async fn write_reply<W>(writer: &mut W, reply: &GateReply) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(reply).context("Failed to serialize reply")?;
    debug!("Sending: {}", json);
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
