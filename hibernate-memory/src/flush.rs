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

use std::sync::Weak;

use hibernate_common::{error::ErrorKind, timer::TimerTask};

use crate::{
    evictor::{Evictor, Inner},
    servant::Factory,
};

/// Periodic flush of an evictor, run on the timer.
///
/// Only keeps a weak reference, so a scheduled flush never keeps a dropped evictor alive.
pub struct FlushTask<F>
where
    F: Factory,
{
    evictor: Weak<Inner<F>>,
}

impl<F> FlushTask<F>
where
    F: Factory,
{
    pub(crate) fn new(evictor: &Evictor<F>) -> Self {
        Self {
            evictor: evictor.downgrade(),
        }
    }
}

impl<F> TimerTask for FlushTask<F>
where
    F: Factory,
{
    fn run(&self) {
        let Some(evictor) = Evictor::upgrade(&self.evictor) else {
            return;
        };
        match evictor.flush() {
            Ok(written) => tracing::trace!(name = evictor.name(), written, "[flusher]: periodic flush done"),
            Err(e) if e.kind() == ErrorKind::Closed => {
                tracing::debug!(name = evictor.name(), "[flusher]: evictor is shutting down, skip")
            }
            Err(e) => tracing::warn!(name = evictor.name(), ?e, "[flusher]: periodic flush failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use hibernate_common::{identity::Identity, timer::Timer};
    use hibernate_storage::{MemoryStore, Store};

    use crate::{
        builder::EvictorBuilder,
        test_utils::{seed, CounterFactory},
    };

    #[test_log::test]
    fn test_periodic_flush() {
        let timer = Arc::new(Timer::new().unwrap());
        let store = Arc::new(MemoryStore::new());
        let identity = Identity::from("a");
        seed(store.as_ref(), &identity, 0);

        let evictor = EvictorBuilder::new(4)
            .with_timer(timer.clone())
            .with_flush_interval(Duration::from_millis(20))
            .build(store.clone(), CounterFactory)
            .unwrap();

        let before = store.get(&identity).unwrap();
        let servant = evictor.locate(&identity).unwrap();
        servant.lock().value = 9;
        drop(servant);
        evictor.finished(&identity, true).unwrap();

        let mut flushed = false;
        for _ in 0..100 {
            std::thread::sleep(Duration::from_millis(10));
            if evictor.stats().dirty == 0 {
                flushed = true;
                break;
            }
        }
        assert!(flushed);
        assert_ne!(store.get(&identity).unwrap(), before);
        assert!(evictor.contains(&identity));

        evictor.shutdown().unwrap();
        timer.destroy();
    }

    #[test_log::test]
    fn test_dropped_evictor_cancels_its_flush() {
        let timer = Arc::new(Timer::new().unwrap());
        let evictor = EvictorBuilder::new(4)
            .with_timer(timer.clone())
            .with_flush_interval(Duration::from_millis(5))
            .build(Arc::new(MemoryStore::new()), CounterFactory)
            .unwrap();
        let task = evictor.flush_task().unwrap();
        std::thread::sleep(Duration::from_millis(30));

        drop(evictor);
        // Let a run that upgraded the evictor right before the drop finish.
        std::thread::sleep(Duration::from_millis(30));
        assert!(!timer.cancel(&task).unwrap());

        // The dead task is gone for good, not just between two runs.
        std::thread::sleep(Duration::from_millis(30));
        assert!(!timer.cancel(&task).unwrap());
        timer.destroy();
    }

    #[test_log::test]
    fn test_shutdown_cancels_flush() {
        let timer = Arc::new(Timer::new().unwrap());
        let evictor = EvictorBuilder::new(4)
            .with_timer(timer.clone())
            .with_flush_interval(Duration::from_millis(5))
            .build(Arc::new(MemoryStore::new()), CounterFactory)
            .unwrap();
        let task = evictor.flush_task().unwrap();

        evictor.shutdown().unwrap();
        assert!(evictor.flush_task().is_none());
        assert!(!timer.cancel(&task).unwrap());
        drop(evictor);
        timer.destroy();
    }
}
