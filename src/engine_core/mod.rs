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

//! Stateful core: the audit chain, the invocation state machine, approval
//! tickets, the executor and the gate that ties them together.

pub mod approval;
pub mod audit;
pub mod constants;
pub mod errors;
pub mod executor;
pub mod gate_core;
pub mod models;
pub mod state;
pub mod store;
pub mod taint;
pub mod traits;
pub mod types;
