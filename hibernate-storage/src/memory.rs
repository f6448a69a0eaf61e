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

use std::collections::HashMap;

use bytes::Bytes;
use hibernate_common::{error::Result, identity::Identity};
use parking_lot::RwLock;

use crate::store::Store;

/// A store that keeps everything in memory.
///
/// Nothing survives the process. Useful for tests and for servants that only need the eviction protocol.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Identity, Bytes>>,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count of persisted records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check if nothing is persisted.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Store for MemoryStore {
    fn get(&self, identity: &Identity) -> Result<Option<Bytes>> {
        Ok(self.records.read().get(identity).cloned())
    }

    fn put(&self, identity: &Identity, bytes: Bytes) -> Result<()> {
        self.records.write().insert(identity.clone(), bytes);
        Ok(())
    }

    fn remove(&self, identity: &Identity) -> Result<bool> {
        Ok(self.records.write().remove(identity).is_some())
    }

    fn contains(&self, identity: &Identity) -> Result<bool> {
        Ok(self.records.read().contains_key(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        let alice = Identity::from("alice");

        assert_eq!(store.get(&alice).unwrap(), None);
        assert!(!store.contains(&alice).unwrap());

        store.put(&alice, Bytes::from_static(b"v1")).unwrap();
        store.put(&alice, Bytes::from_static(b"v2")).unwrap();
        assert_eq!(store.get(&alice).unwrap(), Some(Bytes::from_static(b"v2")));
        assert_eq!(store.len(), 1);

        assert!(store.remove(&alice).unwrap());
        assert!(!store.remove(&alice).unwrap());
        assert!(store.is_empty());
    }
}
