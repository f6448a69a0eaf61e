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

use std::sync::Arc;

use crate::{
    common::{
        error::Result,
        metrics::{registry::noop::NoopMetricsRegistry, RegistryOps},
        timer::Timer,
    },
    memory::{Evictor, EvictorBuilder, EvictorConfig, Factory},
    storage::Store,
};

/// The components shared by the evictors of one process.
///
/// Build it once at startup and pass it around. All evictors built from the same context share the store, the timer
/// that runs their periodic flush, and the metrics registry.
#[derive(Debug)]
pub struct Context {
    store: Arc<dyn Store>,
    timer: Arc<Timer>,
    registry: Arc<dyn RegistryOps>,
}

impl Context {
    /// Create a context over the store and start its timer.
    pub fn new(store: Arc<dyn Store>) -> Result<Self> {
        let timer = Arc::new(Timer::new()?);
        Ok(Self {
            store,
            timer,
            registry: Arc::new(NoopMetricsRegistry),
        })
    }

    /// Set the metrics registry of the evictors built afterwards.
    ///
    /// Default: [`NoopMetricsRegistry`].
    pub fn with_metrics_registry(mut self, registry: Arc<dyn RegistryOps>) -> Self {
        self.registry = registry;
        self
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The shared timer.
    pub fn timer(&self) -> &Arc<Timer> {
        &self.timer
    }

    /// An evictor builder wired to the timer and the metrics registry, for callers that need to set a listener or an
    /// initializer.
    pub fn evictor_builder<S>(&self, config: EvictorConfig) -> EvictorBuilder<S>
    where
        S: Send + 'static,
    {
        EvictorBuilder::from_config(config)
            .with_timer(self.timer.clone())
            .with_metrics_registry(self.registry.as_ref())
    }

    /// Build an evictor over the shared store.
    pub fn evictor<F>(&self, config: EvictorConfig, factory: F) -> Result<Evictor<F>>
    where
        F: Factory,
    {
        self.evictor_builder(config).build(self.store.clone(), factory)
    }

    /// Stop the timer. Evictors must be shut down before, their periodic flush stops here.
    pub fn shutdown(&self) {
        self.timer.destroy();
        tracing::info!("[context]: shutdown");
    }
}
