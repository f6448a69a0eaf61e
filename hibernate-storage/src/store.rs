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

use std::fmt::Debug;

use bytes::Bytes;
use hibernate_common::{error::Result, identity::Identity};

/// The durable mapping from object identity to serialized object state.
///
/// Every operation is atomic and durable for a single key. No cross-key transaction is required.
///
/// Operations on the same identity are serialized by the evictor, implementations only need to keep operations on
/// different identities independent.
pub trait Store: Send + Sync + 'static + Debug {
    /// Read the persisted bytes of the identity.
    ///
    /// Returns `Ok(None)` if nothing is persisted under the identity.
    fn get(&self, identity: &Identity) -> Result<Option<Bytes>>;

    /// Persist the bytes under the identity, replacing any previous bytes.
    ///
    /// The bytes are durable once `put` returns `Ok(())`.
    fn put(&self, identity: &Identity, bytes: Bytes) -> Result<()>;

    /// Remove the persisted bytes of the identity.
    ///
    /// Returns `Ok(true)` if there was something to remove.
    fn remove(&self, identity: &Identity) -> Result<bool>;

    /// Check if anything is persisted under the identity.
    fn contains(&self, identity: &Identity) -> Result<bool> {
        self.get(identity).map(|bytes| bytes.is_some())
    }
}
