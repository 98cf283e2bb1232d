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

//! Built-in tool implementations.

pub mod builtin;

use std::sync::Arc;

use crate::engine_core::executor::ToolRegistry;
use builtin::{
    CreateTodo, DraftEmail, GithubRepoSearch, ListTodos, SummarizeText, TodoBook, WebhookPost,
};

/// Registry holding every built-in tool. `webhook_allowlist` names the hosts
/// `webhook_post` may reach; an empty list refuses every host.
pub fn default_registry(webhook_allowlist: &[String]) -> ToolRegistry {
    let todos = Arc::new(TodoBook::default());
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SummarizeText));
    registry.register(Arc::new(CreateTodo::new(todos.clone())));
    registry.register(Arc::new(ListTodos::new(todos)));
    registry.register(Arc::new(DraftEmail));
    registry.register(Arc::new(GithubRepoSearch::new()));
    registry.register(Arc::new(WebhookPost::new(webhook_allowlist.to_vec())));
    registry
}
