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

//! Utilities for testing.

use hibernate_common::{
    code::Code,
    error::{Error, Result},
    event::{Event, EventListener},
    identity::Identity,
};
use hibernate_storage::{PersistedRecord, Store};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::servant::{Factory, Kind, Persistent};

/// The only kind of [`Counter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    /// A counter.
    Counter,
}

impl Kind for CounterKind {
    fn tag(&self) -> &'static str {
        "::Counter"
    }

    fn from_tag(tag: &str) -> Option<Self> {
        (tag == "::Counter").then_some(CounterKind::Counter)
    }
}

/// A servant holding a number.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Counter {
    /// The number.
    pub value: u64,
    /// Set by initializers in tests, never persisted.
    #[serde(skip)]
    pub initialized: bool,
}

impl Persistent for Counter {
    type Kind = CounterKind;

    fn kind(&self) -> CounterKind {
        CounterKind::Counter
    }

    fn save(&self) -> Result<Vec<u8>> {
        self.encode_to_vec()
    }
}

/// Factory of [`Counter`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterFactory;

impl Factory for CounterFactory {
    type Servant = Counter;

    fn create(&self, _: &Identity, _: CounterKind, state: &[u8]) -> Result<Counter> {
        Counter::decode_from_slice(state)
    }

    fn newly_created(&self, _: &Identity, _: CounterKind) -> Result<Counter> {
        Ok(Counter::default())
    }
}

/// Persist a counter with `value` directly into the store.
pub fn seed(store: &dyn Store, identity: &Identity, value: u64) {
    let record = PersistedRecord {
        identity: identity.clone(),
        tag: CounterKind::Counter.tag().to_string(),
        state: Counter { value, initialized: false }.encode_to_vec().unwrap(),
    };
    store.put(identity, record.to_bytes().unwrap()).unwrap();
}

/// An event listener that records all events.
#[derive(Debug, Default)]
pub struct RecordingListener {
    left: Mutex<Vec<(Event, Identity)>>,
    failures: Mutex<Vec<Identity>>,
}

impl RecordingListener {
    /// Servants that left the evictor, with the reason, in order.
    pub fn left(&self) -> Vec<(Event, Identity)> {
        self.left.lock().clone()
    }

    /// Servants whose write-back failed, in order.
    pub fn failures(&self) -> Vec<Identity> {
        self.failures.lock().clone()
    }
}

impl EventListener for RecordingListener {
    fn on_leave(&self, reason: Event, identity: &Identity) {
        self.left.lock().push((reason, identity.clone()));
    }

    fn on_write_back_failure(&self, identity: &Identity, _: &Error) {
        self.failures.lock().push(identity.clone());
    }
}
