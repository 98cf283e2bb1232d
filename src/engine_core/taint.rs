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

//! Externally sourced content markers.
//!
//! Retrieved evidence and `external` argument fields enter the gate as
//! `Tainted<String>`; only the context firewall produces a `Clean` value.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaintMetadata {
    /// Where the text came from, e.g. `evidence[2]` or `arg:body`
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct Tainted<T> {
    inner: T,
    metadata: TaintMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clean<T> {
    inner: T,
}

impl<T> Tainted<T> {
    pub fn new(inner: T, source: impl Into<String>) -> Self {
        Self {
            inner,
            metadata: TaintMetadata {
                source: source.into(),
            },
        }
    }

    pub fn metadata(&self) -> &TaintMetadata {
        &self.metadata
    }

    pub fn source(&self) -> &str {
        &self.metadata.source
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Dangerous! Only the firewall should unwrap tainted content.
    pub(crate) fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> Clean<T> {
    /// Only the context firewall calls this.
    pub(crate) fn new_unchecked(inner: T) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> std::ops::Deref for Clean<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
