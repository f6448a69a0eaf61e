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

use std::{fmt::Debug, sync::Arc, time::Duration};

use hibernate_common::{
    error::{Error, ErrorKind, Result},
    event::EventListener,
    metrics::{Metrics, RegistryOps},
    timer::{Timer, TimerTask},
};
use hibernate_storage::Store;
use serde::{Deserialize, Serialize};

use crate::{
    eviction::EvictionConfig,
    evictor::{Evictor, EvictorParts},
    flush::FlushTask,
    servant::{Factory, Initializer},
};

/// Serializable evictor config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvictorConfig {
    /// Name of the evictor, used as the metrics label.
    pub name: String,
    /// Bound of the idle servants.
    pub capacity: usize,
    /// Eviction policy.
    pub eviction: EvictionConfig,
    /// Interval of the periodic flush. No periodic flush if not set.
    pub flush_interval: Option<Duration>,
}

impl Default for EvictorConfig {
    fn default() -> Self {
        Self {
            name: "evictor".to_string(),
            capacity: 1024,
            eviction: EvictionConfig::default(),
            flush_interval: None,
        }
    }
}

/// Evictor builder.
pub struct EvictorBuilder<S> {
    name: String,
    capacity: usize,
    eviction: EvictionConfig,
    flush_interval: Option<Duration>,

    timer: Option<Arc<Timer>>,
    listener: Option<Arc<dyn EventListener>>,
    initializer: Option<Arc<dyn Initializer<S>>>,
    metrics: Option<Arc<Metrics>>,
}

impl<S> Debug for EvictorBuilder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvictorBuilder")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("eviction", &self.eviction)
            .field("flush_interval", &self.flush_interval)
            .field("timer", &self.timer)
            .finish()
    }
}

impl<S> EvictorBuilder<S>
where
    S: Send + 'static,
{
    /// Evictor builder with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self::from_config(EvictorConfig {
            capacity,
            ..Default::default()
        })
    }

    /// Evictor builder from a serialized config.
    pub fn from_config(config: EvictorConfig) -> Self {
        Self {
            name: config.name,
            capacity: config.capacity,
            eviction: config.eviction,
            flush_interval: config.flush_interval,
            timer: None,
            listener: None,
            initializer: None,
            metrics: None,
        }
    }

    /// Set the name of the evictor.
    ///
    /// Default: `evictor`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the eviction policy.
    ///
    /// Default: [`EvictionConfig::Lru`].
    pub fn with_eviction_config(mut self, eviction: EvictionConfig) -> Self {
        self.eviction = eviction;
        self
    }

    /// Set the interval of the periodic flush.
    ///
    /// The periodic flush runs on the timer set by [`EvictorBuilder::with_timer`]. It is ignored without a timer.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    /// Set the timer that runs the periodic flush.
    pub fn with_timer(mut self, timer: Arc<Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Set the event listener.
    pub fn with_event_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Set the hook run on every servant before it is lent to a dispatch.
    pub fn with_initializer(mut self, initializer: impl Initializer<S>) -> Self {
        self.initializer = Some(Arc::new(initializer));
        self
    }

    /// Set the metrics of the evictor, shared with other components.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register the metrics of the evictor to the registry, labelled with the evictor name.
    ///
    /// The name must be set before.
    pub fn with_metrics_registry<R>(mut self, registry: &R) -> Self
    where
        R: RegistryOps + ?Sized,
    {
        self.metrics = Some(Arc::new(Metrics::new(self.name.clone(), registry)));
        self
    }

    /// Build the evictor over the store and the factory.
    ///
    /// Fails with [`ErrorKind::Config`] for a capacity of 0.
    pub fn build<F>(self, store: Arc<dyn Store>, factory: F) -> Result<Evictor<F>>
    where
        F: Factory<Servant = S>,
    {
        if self.capacity == 0 {
            return Err(Error::new(ErrorKind::Config, "capacity must be positive").with_context("name", &self.name));
        }
        if self.flush_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(
                Error::new(ErrorKind::Config, "flush interval must be positive").with_context("name", &self.name),
            );
        }

        let metrics = self.metrics.unwrap_or_else(|| Arc::new(Metrics::noop()));
        let evictor = Evictor::from_parts(EvictorParts {
            name: self.name,
            capacity: self.capacity,
            eviction: self.eviction.build(),
            store,
            factory,
            initializer: self.initializer,
            listener: self.listener,
            metrics,
        });

        if let (Some(timer), Some(interval)) = (self.timer, self.flush_interval) {
            let task: Arc<dyn TimerTask> = Arc::new(FlushTask::new(&evictor));
            timer.schedule_repeated(task.clone(), interval)?;
            evictor.set_flusher(timer, task);
            tracing::debug!(name = evictor.name(), ?interval, "[evictor]: periodic flush scheduled");
        }

        Ok(evictor)
    }
}
