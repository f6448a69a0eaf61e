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

pub use crate::{
    builder::{EvictorBuilder, EvictorConfig},
    eviction::{fifo::Fifo, lru::Lru, Eviction, EvictionConfig},
    evictor::{Evictor, EvictorStats},
    flush::FlushTask,
    locator::{Current, DispatchFault, OperationMode, RequestLocator, ServantLocator},
    servant::{Factory, Handle, Initializer, Kind, KindOf, Persistent},
};
