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

//! hibernate - Transparent object persistence for Rust.
//!
//! hibernate keeps remote objects alive in the illusion of permanent residency. An [`Evictor`] holds a bounded
//! working set of live servants in memory, loads the others from a [`Store`] on demand, and writes dirty servants
//! back before they leave memory. A dedicated-thread [`Timer`] drives the periodic flush.
//!
//! [`Context`] wires a store, a timer and the metrics into evictors.

pub use hibernate_common as common;
pub use hibernate_memory as memory;
pub use hibernate_storage as storage;

mod context;
mod prelude;

pub use prelude::*;
