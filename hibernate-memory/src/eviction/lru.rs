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

use std::collections::{BTreeMap, HashMap};

use hibernate_common::{identity::Identity, strict_assert_eq};

use super::Eviction;

/// Lru eviction algorithm state.
///
/// Idle servants are ordered by the tick of their last release. Active servants are not tracked at all.
#[derive(Debug, Default)]
pub struct Lru {
    queue: BTreeMap<u64, Identity>,
    ticks: HashMap<Identity, u64>,
    tick: u64,
}

impl Lru {
    fn unlink(&mut self, identity: &Identity) {
        if let Some(tick) = self.ticks.remove(identity) {
            self.queue.remove(&tick);
        }
    }

    #[cfg(test)]
    fn dump(&self) -> Vec<Identity> {
        self.queue.values().cloned().collect()
    }
}

impl Eviction for Lru {
    fn insert(&mut self, _: &Identity) {}

    fn acquire(&mut self, identity: &Identity) {
        self.unlink(identity);
    }

    fn release(&mut self, identity: &Identity) {
        self.unlink(identity);
        self.tick += 1;
        self.queue.insert(self.tick, identity.clone());
        self.ticks.insert(identity.clone(), self.tick);
    }

    fn pop(&mut self) -> Option<Identity> {
        let (_, identity) = self.queue.pop_first()?;
        self.ticks.remove(&identity);
        Some(identity)
    }

    fn remove(&mut self, identity: &Identity) {
        self.unlink(identity);
    }

    fn len(&self) -> usize {
        strict_assert_eq!(self.queue.len(), self.ticks.len());
        self.queue.len()
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.ticks.clear();
    }
}
