// Copyright 2026 hibernate Project Authors
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

use std::{fmt::Debug, str::FromStr};

use hibernate_common::{
    error::{Error, ErrorKind},
    identity::Identity,
};
use serde::{Deserialize, Serialize};

/// Eviction policy over the resident servants of an evictor.
///
/// The policy tracks every resident servant, but only idle ones are candidates for eviction. The evictor calls the
/// policy with its state lock held.
///
/// ```plain
///          insert                 acquire
/// (none) ---------> active <-------------------- idle
///                          --------------------> idle ---- pop ----> (none)
///                                 release
/// ```
///
/// `remove` stops tracking a servant in any state.
pub trait Eviction: Send + Sync + 'static + Debug {
    /// Start tracking a servant that just became resident. New servants are active.
    fn insert(&mut self, identity: &Identity);

    /// The idle servant is lent to a dispatch and can't be evicted until released.
    fn acquire(&mut self, identity: &Identity);

    /// The servant is back from its last dispatch and can be evicted.
    fn release(&mut self, identity: &Identity);

    /// Pick the next idle servant to evict and stop tracking it.
    fn pop(&mut self) -> Option<Identity>;

    /// Stop tracking the servant.
    fn remove(&mut self, identity: &Identity);

    /// Count of idle servants.
    fn len(&self) -> usize;

    /// Check if there is no idle servant.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop tracking all servants.
    fn clear(&mut self);
}

/// Eviction policy config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionConfig {
    /// Evict the least recently released servant first.
    #[default]
    Lru,
    /// Evict the servant that became resident first, no matter how it is used afterwards.
    Fifo,
}

impl EvictionConfig {
    pub(crate) fn build(self) -> Box<dyn Eviction> {
        match self {
            EvictionConfig::Lru => Box::new(lru::Lru::default()),
            EvictionConfig::Fifo => Box::new(fifo::Fifo::default()),
        }
    }
}

impl FromStr for EvictionConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "fifo" => Ok(Self::Fifo),
            _ => Err(Error::new(ErrorKind::Parse, "unknown eviction policy").with_context("policy", s)),
        }
    }
}

/// Least recently used eviction.
pub mod lru;

/// First in first out eviction.
pub mod fifo;
