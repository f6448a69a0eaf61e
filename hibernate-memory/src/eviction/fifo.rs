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

use hibernate_common::identity::Identity;

use super::Eviction;

/// Fifo eviction algorithm state.
///
/// Every resident servant keeps the tick of its admission until it leaves. Only idle servants are queued.
#[derive(Debug, Default)]
pub struct Fifo {
    queue: BTreeMap<u64, Identity>,
    admitted: HashMap<Identity, u64>,
    tick: u64,
}

impl Fifo {
    #[cfg(test)]
    fn dump(&self) -> Vec<Identity> {
        self.queue.values().cloned().collect()
    }
}

impl Eviction for Fifo {
    fn insert(&mut self, identity: &Identity) {
        self.tick += 1;
        if let Some(old) = self.admitted.insert(identity.clone(), self.tick) {
            self.queue.remove(&old);
        }
    }

    fn acquire(&mut self, identity: &Identity) {
        if let Some(tick) = self.admitted.get(identity) {
            self.queue.remove(tick);
        }
    }

    fn release(&mut self, identity: &Identity) {
        let tick = match self.admitted.get(identity) {
            Some(&tick) => tick,
            None => {
                self.insert(identity);
                self.tick
            }
        };
        self.queue.insert(tick, identity.clone());
    }

    fn pop(&mut self) -> Option<Identity> {
        let (_, identity) = self.queue.pop_first()?;
        self.admitted.remove(&identity);
        Some(identity)
    }

    fn remove(&mut self, identity: &Identity) {
        if let Some(tick) = self.admitted.remove(identity) {
            self.queue.remove(&tick);
        }
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.admitted.clear();
    }
}
