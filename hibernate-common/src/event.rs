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

use crate::{error::Error, identity::Identity};

/// Event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The servant is evicted to keep the evictor within its capacity.
    Evict,
    /// The object is removed explicitly.
    Remove,
    /// The servant is released by the shutdown drain.
    Drain,
}

/// Trait for the customized event listener.
///
/// Listeners are called outside of the evictor lock, but on the thread that triggers the event. Keep them cheap.
pub trait EventListener: Send + Sync + 'static {
    /// Called when a servant leaves the evictor with the reason.
    #[expect(unused_variables)]
    fn on_leave(&self, reason: Event, identity: &Identity) {}

    /// Called when writing back a dirty servant fails.
    ///
    /// The servant stays resident and dirty. The write-back is retried on the next eviction pressure, flush or
    /// shutdown.
    #[expect(unused_variables)]
    fn on_write_back_failure(&self, identity: &Identity, error: &Error) {}
}
