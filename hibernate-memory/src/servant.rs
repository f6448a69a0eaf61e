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

use std::{fmt::Debug, sync::Arc};

use hibernate_common::{error::Result, identity::Identity};
use parking_lot::Mutex;

/// A servant lent to a dispatch.
///
/// The evictor owns the servant. A dispatch may only hold the handle between `locate` and `finished`.
pub type Handle<S> = Arc<Mutex<S>>;

/// Closed set of object kinds a factory knows how to build.
///
/// The tag is persisted next to the object state and selects the kind when the object is loaded again.
pub trait Kind: Copy + Eq + Debug + Send + Sync + 'static {
    /// The persisted tag of the kind.
    fn tag(&self) -> &'static str;

    /// The kind of a persisted tag, `None` for unknown tags.
    fn from_tag(tag: &str) -> Option<Self>;
}

/// A servant whose state can be persisted.
pub trait Persistent: Send + 'static {
    /// The kinds of objects the servant type covers.
    type Kind: Kind;

    /// The kind of this servant.
    fn kind(&self) -> Self::Kind;

    /// Serialize the state of the servant.
    fn save(&self) -> Result<Vec<u8>>;
}

/// The kind type of the servants of a factory.
pub type KindOf<F> = <<F as Factory>::Servant as Persistent>::Kind;

/// Builds servants, either from persisted state or from scratch.
pub trait Factory: Send + Sync + 'static {
    /// The servant type.
    type Servant: Persistent;

    /// Reconstruct a servant of `kind` from its persisted state.
    fn create(&self, identity: &Identity, kind: KindOf<Self>, state: &[u8]) -> Result<Self::Servant>;

    /// Build a brand-new servant of `kind` that has never been persisted.
    fn newly_created(&self, identity: &Identity, kind: KindOf<Self>) -> Result<Self::Servant>;
}

/// Hook called on every servant right after the factory builds it, before any dispatch sees it.
pub trait Initializer<S>: Send + Sync + 'static {
    /// Initialize the servant.
    fn initialize(&self, identity: &Identity, servant: &mut S);
}

impl<S, F> Initializer<S> for F
where
    F: Fn(&Identity, &mut S) + Send + Sync + 'static,
{
    fn initialize(&self, identity: &Identity, servant: &mut S) {
        self(identity, servant)
    }
}
