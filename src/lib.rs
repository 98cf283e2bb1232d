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

//! toolgate: a gating and audit core for LLM-planned tool calls.
//!
//! Every proposed call passes schema validation, context-firewall screening
//! and policy evaluation, optionally waits for human approval, and only then
//! reaches its tool. Each step is recorded in a hash-chained ledger that can
//! be verified after the fact.

pub mod config;
pub mod engine;
pub mod engine_core;
pub mod runtime;
pub mod tools;
pub mod transport;
pub mod utils;
