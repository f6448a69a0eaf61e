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

use std::borrow::Cow;

use super::{registry::noop::NoopMetricsRegistry, BoxedCounter, BoxedGauge, BoxedHistogram, RegistryOps};

/// Metrics of one evictor.
#[derive(Debug)]
#[expect(missing_docs)]
pub struct Metrics {
    pub evictor_hit: BoxedCounter,
    pub evictor_miss: BoxedCounter,
    pub evictor_load_failure: BoxedCounter,
    pub evictor_create: BoxedCounter,
    pub evictor_evict: BoxedCounter,
    pub evictor_write_back: BoxedCounter,
    pub evictor_write_back_failure: BoxedCounter,
    pub evictor_remove: BoxedCounter,
    pub evictor_flush: BoxedCounter,

    pub evictor_usage: BoxedGauge,

    pub evictor_load_duration: BoxedHistogram,
    pub evictor_write_back_duration: BoxedHistogram,
}

impl Metrics {
    /// Create a new metric with the given name.
    pub fn new<R>(name: impl Into<Cow<'static, str>>, registry: &R) -> Self
    where
        R: RegistryOps + ?Sized,
    {
        let name: Cow<'static, str> = name.into();

        let op_total = registry.register_counter_vec(
            "hibernate_evictor_op_total",
            "hibernate evictor operations",
            &["name", "op"],
        );
        let usage = registry.register_gauge_vec(
            "hibernate_evictor_usage",
            "hibernate evictor resident servants, active ones included",
            &["name"],
        );
        let op_duration = registry.register_histogram_vec(
            "hibernate_evictor_op_duration",
            "hibernate evictor store operation durations",
            &["name", "op"],
        );

        let op = |op: &'static str| op_total.counter(&[name.clone(), op.into()]);
        let duration = |op: &'static str| op_duration.histogram(&[name.clone(), op.into()]);

        Self {
            evictor_hit: op("hit"),
            evictor_miss: op("miss"),
            evictor_load_failure: op("load_failure"),
            evictor_create: op("create"),
            evictor_evict: op("evict"),
            evictor_write_back: op("write_back"),
            evictor_write_back_failure: op("write_back_failure"),
            evictor_remove: op("remove"),
            evictor_flush: op("flush"),

            evictor_usage: usage.gauge(&[name.clone()]),

            evictor_load_duration: duration("load"),
            evictor_write_back_duration: duration("write_back"),
        }
    }

    /// Create metrics that record nothing.
    pub fn noop() -> Self {
        Self::new("noop", &NoopMetricsRegistry)
    }
}
