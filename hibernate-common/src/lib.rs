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

//! Shared components for hibernate.

/// Allow to enable debug assertions in release profile with feature "strict_assertion".
pub mod assert;
/// The trait for the persisted state of servants.
pub mod code;
/// Error type and result type for hibernate.
pub mod error;
/// The event listener of the evictor.
pub mod event;
/// Identity of persistent objects.
pub mod identity;
/// Metrics.
pub mod metrics;
/// Dedicated-thread task scheduler.
pub mod timer;
