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

use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, Weak},
    time::Instant,
};

use hibernate_common::{
    error::{Error, ErrorKind, Result},
    event::{Event, EventListener},
    identity::Identity,
    metrics::Metrics,
    strict_assert,
    timer::{Timer, TimerTask},
};
use hibernate_storage::{PersistedRecord, Store};
use itertools::Itertools;
use parking_lot::{Condvar, Mutex};

use crate::{
    eviction::Eviction,
    servant::{Factory, Handle, Initializer, Kind, KindOf, Persistent},
};

/// Shared allocation of a resident servant.
///
/// `io` serializes the store writes of the servant. It is set once the servant has left the evictor for good, so a
/// write-back that loses a race never lands after the servant is evicted or removed.
struct Slot<S> {
    servant: Handle<S>,
    io: Mutex<bool>,
}

struct Resident<S> {
    slot: Arc<Slot<S>>,
    /// Count of dispatches holding the servant.
    active: usize,
    /// Picked as an eviction victim, the write-back is in progress.
    evicting: bool,
    dirty: bool,
    /// Bumped on every mutation, so a flush only clears the dirty state it has persisted.
    version: u64,
    /// Removed from the store while active, dropped without write-back when released.
    doomed: bool,
    /// Created and never written, the first release persists it.
    unpersisted: bool,
    /// The initial write of a created servant is in progress.
    persisting: bool,
}

impl<S> Resident<S> {
    fn is_idle(&self) -> bool {
        self.active == 0 && !self.evicting && !self.persisting
    }
}

enum Entry<S> {
    /// The servant is being loaded or created.
    Pending,
    Resident(Resident<S>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Running,
    Draining,
    Closed,
}

enum Release<S> {
    Done(Vec<Victim<S>>),
    /// Last release of a created servant. It turns idle once its initial state is written.
    Persist(Arc<Slot<S>>, u64),
}

struct Victim<S> {
    identity: Identity,
    slot: Arc<Slot<S>>,
    dirty: bool,
}

enum Lookup<S> {
    Hit(Handle<S>),
    Busy,
    Vacant,
}

enum Peek<S> {
    Vacant,
    /// Pending, evicting or doomed.
    Busy,
    Resident(Arc<Slot<S>>),
}

struct State<S> {
    entries: HashMap<Identity, Entry<S>>,
    eviction: Box<dyn Eviction>,
    capacity: usize,
    /// Count of entries that are pending, active or idle. Evicting entries are excluded.
    usage: usize,
    status: Status,
}

impl<S> State<S> {
    fn lookup(&mut self, identity: &Identity) -> Lookup<S> {
        match self.entries.get_mut(identity) {
            None => Lookup::Vacant,
            Some(Entry::Pending) => Lookup::Busy,
            Some(Entry::Resident(resident)) if !resident.is_idle() => Lookup::Busy,
            Some(Entry::Resident(resident)) => {
                resident.active = 1;
                let servant = resident.slot.servant.clone();
                self.eviction.acquire(identity);
                Lookup::Hit(servant)
            }
        }
    }

    fn peek(&self, identity: &Identity) -> Peek<S> {
        match self.entries.get(identity) {
            None => Peek::Vacant,
            Some(Entry::Resident(resident)) if !resident.evicting && !resident.doomed => {
                Peek::Resident(resident.slot.clone())
            }
            Some(_) => Peek::Busy,
        }
    }

    fn reserve(&mut self, identity: &Identity) {
        strict_assert!(!self.entries.contains_key(identity));
        self.entries.insert(identity.clone(), Entry::Pending);
        self.usage += 1;
    }

    fn abandon(&mut self, identity: &Identity) {
        if let Some(Entry::Pending) = self.entries.get(identity) {
            self.entries.remove(identity);
            self.usage -= 1;
        }
    }

    fn admit(&mut self, identity: &Identity, slot: Arc<Slot<S>>, dirty: bool) -> Vec<Victim<S>> {
        let resident = Resident {
            slot,
            active: 1,
            evicting: false,
            dirty,
            version: 0,
            doomed: false,
            unpersisted: dirty,
            persisting: false,
        };
        self.entries.insert(identity.clone(), Entry::Resident(resident));
        self.eviction.insert(identity);
        self.evict_overflow()
    }

    /// Pick idle victims in policy order until the usage fits the capacity.
    fn evict_overflow(&mut self) -> Vec<Victim<S>> {
        let mut victims = vec![];
        while self.usage > self.capacity {
            let Some(identity) = self.eviction.pop() else {
                break;
            };
            let Some(Entry::Resident(resident)) = self.entries.get_mut(&identity) else {
                strict_assert!(false, "eviction victim {identity} is not resident");
                continue;
            };
            strict_assert!(resident.is_idle());
            resident.evicting = true;
            self.usage -= 1;
            tracing::trace!(%identity, dirty = resident.dirty, "[evictor]: victim picked");
            victims.push(Victim {
                slot: resident.slot.clone(),
                dirty: resident.dirty,
                identity,
            });
        }
        victims
    }

    /// Put back a victim whose write-back failed, as the most recently used idle entry.
    fn restore(&mut self, identity: &Identity) {
        if let Some(Entry::Resident(resident)) = self.entries.get_mut(identity) {
            strict_assert!(resident.evicting);
            resident.evicting = false;
            self.usage += 1;
            self.eviction.insert(identity);
            self.eviction.release(identity);
        }
    }

    fn release(&mut self, identity: &Identity, mutated: bool) -> Result<Release<S>> {
        let resident = match self.entries.get_mut(identity) {
            Some(Entry::Resident(resident)) if resident.active > 0 => resident,
            _ => return Err(Error::new(ErrorKind::NotActive, "").with_context("identity", identity)),
        };

        resident.active -= 1;
        if mutated && !resident.doomed {
            resident.dirty = true;
            resident.version += 1;
        }
        if resident.active > 0 {
            return Ok(Release::Done(vec![]));
        }

        if resident.doomed {
            self.entries.remove(identity);
            self.eviction.remove(identity);
            self.usage -= 1;
            tracing::trace!(%identity, "[evictor]: removed servant dropped");
            return Ok(Release::Done(vec![]));
        }

        if resident.unpersisted {
            resident.unpersisted = false;
            resident.persisting = true;
            return Ok(Release::Persist(resident.slot.clone(), resident.version));
        }

        self.eviction.release(identity);
        Ok(Release::Done(self.evict_overflow()))
    }

    /// Turn a created servant idle after its initial write. It stays dirty if the write failed.
    fn persisted(&mut self, identity: &Identity, slot: &Arc<Slot<S>>, version: u64, written: bool) -> Vec<Victim<S>> {
        let Some(Entry::Resident(resident)) = self.entries.get_mut(identity) else {
            // Removed meanwhile.
            return vec![];
        };
        if !Arc::ptr_eq(&resident.slot, slot) || !resident.persisting {
            return vec![];
        }
        resident.persisting = false;
        if written && resident.version == version {
            resident.dirty = false;
        }
        self.eviction.release(identity);
        self.evict_overflow()
    }

    /// Forget a servant that is removed from the store.
    fn discard(&mut self, identity: &Identity, slot: &Arc<Slot<S>>) {
        let Some(Entry::Resident(resident)) = self.entries.get_mut(identity) else {
            return;
        };
        if !Arc::ptr_eq(&resident.slot, slot) || resident.evicting {
            // The eviction in progress finds the slot retired and drops it.
            return;
        }
        if resident.active > 0 {
            resident.doomed = true;
            resident.dirty = false;
            return;
        }
        self.entries.remove(identity);
        self.eviction.remove(identity);
        self.usage -= 1;
    }

    fn mark_clean(&mut self, identity: &Identity, slot: &Arc<Slot<S>>, version: u64) {
        if let Some(Entry::Resident(resident)) = self.entries.get_mut(identity) {
            if Arc::ptr_eq(&resident.slot, slot) && resident.version == version {
                resident.dirty = false;
            }
        }
    }

    fn is_drained(&self) -> bool {
        self.entries.values().all(|entry| match entry {
            Entry::Pending => false,
            Entry::Resident(resident) => resident.is_idle(),
        })
    }

    fn stats(&self) -> EvictorStats {
        let mut stats = EvictorStats {
            capacity: self.capacity,
            idle: self.eviction.len(),
            ..Default::default()
        };
        for entry in self.entries.values() {
            if let Entry::Resident(resident) = entry {
                stats.resident += 1;
                if resident.active > 0 {
                    stats.active += 1;
                }
                if resident.dirty {
                    stats.dirty += 1;
                }
            }
        }
        stats
    }
}

/// A snapshot of the evictor bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictorStats {
    /// Servants in memory, including the ones being evicted.
    pub resident: usize,
    /// Servants held by at least one dispatch.
    pub active: usize,
    /// Servants that can be evicted.
    pub idle: usize,
    /// Servants with state not yet written back.
    pub dirty: usize,
    /// Bound of the idle servants.
    pub capacity: usize,
}

pub(crate) struct Inner<F>
where
    F: Factory,
{
    pub(crate) name: String,

    state: Mutex<State<F::Servant>>,
    changed: Condvar,
    flush_lock: Mutex<()>,

    store: Arc<dyn Store>,
    factory: F,
    initializer: Option<Arc<dyn Initializer<F::Servant>>>,
    listener: Option<Arc<dyn EventListener>>,
    metrics: Arc<Metrics>,

    flusher: Mutex<Option<(Arc<Timer>, Arc<dyn TimerTask>)>>,
}

impl<F> Drop for Inner<F>
where
    F: Factory,
{
    fn drop(&mut self) {
        // An evictor dropped without shutdown must not leave its flush behind on a shared timer.
        if let Some((timer, task)) = self.flusher.get_mut().take() {
            match timer.cancel(&task) {
                Ok(_) => tracing::debug!(name = %self.name, "[evictor]: periodic flush cancelled on drop"),
                Err(e) if e.kind() == ErrorKind::Closed => {}
                Err(e) => tracing::warn!(name = %self.name, ?e, "[evictor]: cancel periodic flush on drop failed"),
            }
        }
    }
}

/// Evictor config that the builder resolves before building the evictor.
pub(crate) struct EvictorParts<F>
where
    F: Factory,
{
    pub name: String,
    pub capacity: usize,
    pub eviction: Box<dyn Eviction>,
    pub store: Arc<dyn Store>,
    pub factory: F,
    pub initializer: Option<Arc<dyn Initializer<F::Servant>>>,
    pub listener: Option<Arc<dyn EventListener>>,
    pub metrics: Arc<Metrics>,
}

/// A bounded registry of live servants backed by a persistent store.
///
/// The evictor gives every persisted object the illusion of permanent residency while keeping at most `capacity`
/// idle servants in memory.
///
/// - [`Evictor::locate`] lends the servant of an identity to one dispatch, loading it from the store on miss. A
///   second `locate` of the same identity blocks until the first holder calls [`Evictor::finished`].
/// - [`Evictor::finished`] takes the servant back. It becomes idle, and the least recently used idle servants are
///   evicted while the evictor is over capacity.
/// - A dirty servant is written back before it leaves memory. If the store rejects the write, the servant stays
///   resident and dirty, and the failure goes to the event listener.
///
/// Active servants are never evicted, so the count of active servants is not bounded by the capacity.
pub struct Evictor<F>
where
    F: Factory,
{
    inner: Arc<Inner<F>>,
}

impl<F> Clone for Evictor<F>
where
    F: Factory,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F> Debug for Evictor<F>
where
    F: Factory,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Evictor")
            .field("name", &self.inner.name)
            .field("capacity", &state.capacity)
            .field("usage", &state.usage)
            .field("status", &state.status)
            .field("eviction", &state.eviction)
            .field("store", &self.inner.store)
            .finish()
    }
}

impl<F> Evictor<F>
where
    F: Factory,
{
    pub(crate) fn from_parts(parts: EvictorParts<F>) -> Self {
        let state = State {
            entries: HashMap::new(),
            eviction: parts.eviction,
            capacity: parts.capacity,
            usage: 0,
            status: Status::Running,
        };
        let inner = Inner {
            name: parts.name,
            state: Mutex::new(state),
            changed: Condvar::new(),
            flush_lock: Mutex::new(()),
            store: parts.store,
            factory: parts.factory,
            initializer: parts.initializer,
            listener: parts.listener,
            metrics: parts.metrics,
            flusher: Mutex::new(None),
        };
        Self { inner: Arc::new(inner) }
    }

    pub(crate) fn downgrade(&self) -> Weak<Inner<F>> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(inner: &Weak<Inner<F>>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    pub(crate) fn set_flusher(&self, timer: Arc<Timer>, task: Arc<dyn TimerTask>) {
        *self.inner.flusher.lock() = Some((timer, task));
    }

    #[cfg(test)]
    pub(crate) fn flush_task(&self) -> Option<Arc<dyn TimerTask>> {
        self.inner.flusher.lock().as_ref().map(|(_, task)| task.clone())
    }

    /// Name of the evictor.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The persistent store behind the evictor.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    /// Lend the servant of `identity` to a dispatch.
    ///
    /// Blocks while another dispatch holds the servant, or while the servant is being loaded or evicted by another
    /// thread. On miss, the servant is reconstructed from the store through the factory.
    ///
    /// Fails with [`ErrorKind::NotFound`] if the object is neither resident nor persisted, with [`ErrorKind::Store`]
    /// if the persisted state can't be read, and with [`ErrorKind::Closed`] once shutdown has begun.
    pub fn locate(&self, identity: &Identity) -> Result<Handle<F::Servant>> {
        let mut state = self.inner.state.lock();
        loop {
            if state.status != Status::Running {
                return Err(Error::closed().with_context("identity", identity));
            }
            match state.lookup(identity) {
                Lookup::Hit(servant) => {
                    drop(state);
                    self.inner.metrics.evictor_hit.increase(1);
                    tracing::trace!(%identity, "[evictor]: hit");
                    return Ok(servant);
                }
                Lookup::Busy => self.inner.changed.wait(&mut state),
                Lookup::Vacant => break,
            }
        }
        state.reserve(identity);
        self.sync_usage(&state);
        drop(state);

        self.inner.metrics.evictor_miss.increase(1);

        match self.load(identity) {
            Ok(servant) => Ok(self.admit(identity, servant, false)),
            Err(e) => {
                self.abandon(identity);
                if e.kind() != ErrorKind::NotFound {
                    self.inner.metrics.evictor_load_failure.increase(1);
                    tracing::warn!(%identity, ?e, "[evictor]: load failed");
                }
                Err(e)
            }
        }
    }

    /// Take back the servant of `identity` from a dispatch.
    ///
    /// `mutated` marks the servant dirty. When the last holder returns it, the servant becomes idle and eviction runs
    /// if the evictor is over capacity. A failed write-back of a victim doesn't fail this call, it is reported to the
    /// event listener.
    ///
    /// Fails with [`ErrorKind::NotActive`] if no dispatch holds the servant, and with [`ErrorKind::Closed`] after
    /// shutdown has completed.
    pub fn finished(&self, identity: &Identity, mutated: bool) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.status == Status::Closed {
            return Err(Error::closed().with_context("identity", identity));
        }
        let released = state.release(identity, mutated)?;
        self.sync_usage(&state);
        drop(state);
        self.inner.changed.notify_all();

        let victims = match released {
            Release::Done(victims) => victims,
            Release::Persist(slot, version) => self.persist_created(identity, &slot, version),
        };
        self.retire(victims);
        Ok(())
    }

    /// Create a brand-new object of `kind` and lend its servant to the caller.
    ///
    /// The servant is admitted active and dirty. The [`Evictor::finished`] call that releases it writes its initial
    /// state to the store before it becomes idle. If that write fails, the servant stays resident and dirty.
    ///
    /// Fails with [`ErrorKind::AlreadyExists`] if the object is resident or persisted.
    pub fn create(&self, identity: Identity, kind: KindOf<F>) -> Result<Handle<F::Servant>> {
        let mut state = self.inner.state.lock();
        loop {
            if state.status != Status::Running {
                return Err(Error::closed().with_context("identity", &identity));
            }
            match state.peek(&identity) {
                Peek::Vacant => break,
                Peek::Busy => self.inner.changed.wait(&mut state),
                Peek::Resident(_) => return Err(already_exists(&identity)),
            }
        }
        state.reserve(&identity);
        self.sync_usage(&state);
        drop(state);

        match self.build(&identity, kind) {
            Ok(servant) => {
                self.inner.metrics.evictor_create.increase(1);
                tracing::debug!(%identity, tag = kind.tag(), "[evictor]: servant created");
                Ok(self.admit(&identity, servant, true))
            }
            Err(e) => {
                self.abandon(&identity);
                Err(e)
            }
        }
    }

    /// Delete the object of `identity` from the store and from memory.
    ///
    /// A servant held by a dispatch, including the caller's own, is dropped without write-back when it is released.
    /// If the store fails to remove the record, the resident servant is kept unchanged.
    ///
    /// Fails with [`ErrorKind::NotFound`] if the object is neither resident nor persisted.
    pub fn remove(&self, identity: &Identity) -> Result<()> {
        let mut state = self.inner.state.lock();
        loop {
            if state.status != Status::Running {
                return Err(Error::closed().with_context("identity", identity));
            }

            let slot = match state.peek(identity) {
                Peek::Vacant => {
                    state.reserve(identity);
                    drop(state);
                    let res = self.inner.store.remove(identity);
                    self.abandon(identity);
                    return match res {
                        Ok(true) => {
                            self.inner.metrics.evictor_remove.increase(1);
                            tracing::debug!(%identity, "[evictor]: record removed");
                            Ok(())
                        }
                        Ok(false) => Err(Error::not_found(identity)),
                        Err(e) => Err(Error::store(e).with_context("identity", identity)),
                    };
                }
                Peek::Busy => {
                    self.inner.changed.wait(&mut state);
                    continue;
                }
                Peek::Resident(slot) => slot,
            };
            drop(state);

            let mut retired = slot.io.lock();
            if *retired {
                drop(retired);
                state = self.inner.state.lock();
                continue;
            }
            self.inner
                .store
                .remove(identity)
                .map_err(|e| Error::store(e).with_context("identity", identity))?;
            *retired = true;

            let mut state = self.inner.state.lock();
            state.discard(identity, &slot);
            self.sync_usage(&state);
            drop(state);
            drop(retired);
            self.inner.changed.notify_all();

            self.inner.metrics.evictor_remove.increase(1);
            if let Some(listener) = self.inner.listener.as_ref() {
                listener.on_leave(Event::Remove, identity);
            }
            tracing::debug!(%identity, "[evictor]: servant removed");
            return Ok(());
        }
    }

    /// Write back every dirty idle servant without evicting it. Returns the count of servants written.
    ///
    /// Servants locked by a dispatch at the time are skipped, they are dirty again soon anyway. Concurrent flushes
    /// are serialized.
    ///
    /// Fails with [`ErrorKind::Store`] listing the identities whose write-back failed. They stay dirty.
    pub fn flush(&self) -> Result<usize> {
        let _guard = self.inner.flush_lock.lock();

        let batch = {
            let state = self.inner.state.lock();
            if state.status != Status::Running {
                return Err(Error::closed());
            }
            state
                .entries
                .iter()
                .filter_map(|(identity, entry)| match entry {
                    Entry::Resident(resident) if resident.dirty && resident.is_idle() && !resident.doomed => {
                        Some((identity.clone(), resident.slot.clone(), resident.version))
                    }
                    _ => None,
                })
                .collect_vec()
        };

        let mut written = 0;
        let mut failures = vec![];
        for (identity, slot, version) in batch {
            let retired = slot.io.lock();
            if *retired {
                continue;
            }
            let Some(servant) = slot.servant.try_lock() else {
                continue;
            };
            let res = self.write_back(&identity, &servant);
            drop(servant);

            match res {
                Ok(()) => {
                    self.inner.state.lock().mark_clean(&identity, &slot, version);
                    written += 1;
                }
                Err(e) => {
                    self.report_write_back_failure(&identity, &e);
                    failures.push((identity, e));
                }
            }
            drop(retired);
        }

        self.inner.metrics.evictor_flush.increase(1);
        tracing::debug!(name = %self.inner.name, written, failed = failures.len(), "[evictor]: flushed");
        aggregate(failures, "flush")?;
        Ok(written)
    }

    /// Change the capacity and evict down to it right away.
    ///
    /// Fails with [`ErrorKind::Config`] for a capacity of 0.
    pub fn resize(&self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(Error::new(ErrorKind::Config, "capacity must be positive"));
        }
        let mut state = self.inner.state.lock();
        if state.status != Status::Running {
            return Err(Error::closed());
        }
        state.capacity = capacity;
        let victims = state.evict_overflow();
        self.sync_usage(&state);
        drop(state);

        tracing::debug!(name = %self.inner.name, capacity, "[evictor]: resized");
        self.retire(victims);
        Ok(())
    }

    /// Bound of the idle servants.
    pub fn capacity(&self) -> usize {
        self.inner.state.lock().capacity
    }

    /// Check if the servant of `identity` is in memory.
    pub fn contains(&self, identity: &Identity) -> bool {
        matches!(self.inner.state.lock().entries.get(identity), Some(Entry::Resident(_)))
    }

    /// Take a snapshot of the evictor bookkeeping.
    pub fn stats(&self) -> EvictorStats {
        self.inner.state.lock().stats()
    }

    /// Drain the evictor.
    ///
    /// New `locate` calls are rejected at once. Then shutdown waits until every servant is returned, writes back the
    /// dirty ones and clears the evictor. The periodic flush is cancelled.
    ///
    /// Must not be called from inside a dispatch, it would wait for itself.
    ///
    /// Fails with [`ErrorKind::Store`] listing the identities whose final write-back failed, and with
    /// [`ErrorKind::Closed`] if shutdown has already begun.
    pub fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.status != Status::Running {
                return Err(Error::closed());
            }
            state.status = Status::Draining;
        }
        self.inner.changed.notify_all();
        tracing::info!(name = %self.inner.name, "[evictor]: draining");

        if let Some((timer, task)) = self.inner.flusher.lock().take() {
            if let Err(e) = timer.cancel(&task) {
                if e.kind() != ErrorKind::Closed {
                    return Err(e);
                }
            }
        }

        let _guard = self.inner.flush_lock.lock();
        let entries = {
            let mut state = self.inner.state.lock();
            while !state.is_drained() {
                self.inner.changed.wait(&mut state);
            }
            state.status = Status::Closed;
            state.eviction.clear();
            state.usage = 0;
            self.sync_usage(&state);
            std::mem::take(&mut state.entries)
        };
        self.inner.changed.notify_all();

        let mut failures = vec![];
        for (identity, entry) in entries {
            let Entry::Resident(resident) = entry else {
                continue;
            };
            let retired = resident.slot.io.lock();
            if *retired {
                continue;
            }
            if resident.dirty {
                let servant = resident.slot.servant.lock();
                if let Err(e) = self.write_back(&identity, &servant) {
                    self.report_write_back_failure(&identity, &e);
                    failures.push((identity, e));
                    continue;
                }
            }
            drop(retired);
            if let Some(listener) = self.inner.listener.as_ref() {
                listener.on_leave(Event::Drain, &identity);
            }
        }

        tracing::info!(name = %self.inner.name, failed = failures.len(), "[evictor]: drained");
        aggregate(failures, "shutdown")
    }

    fn load(&self, identity: &Identity) -> Result<F::Servant> {
        let now = Instant::now();

        let bytes = match self.inner.store.get(identity) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Err(Error::not_found(identity)),
            Err(e) => return Err(Error::store(e).with_context("identity", identity)),
        };
        let record =
            PersistedRecord::from_bytes(&bytes).map_err(|e| Error::store(e).with_context("identity", identity))?;
        if record.identity != *identity {
            return Err(Error::new(ErrorKind::Store, "identity mismatch")
                .with_context("identity", identity)
                .with_context("persisted", &record.identity));
        }
        let kind = KindOf::<F>::from_tag(&record.tag).ok_or_else(|| {
            Error::new(ErrorKind::Store, "unknown kind tag")
                .with_context("identity", identity)
                .with_context("tag", &record.tag)
        })?;

        let mut servant = self
            .inner
            .factory
            .create(identity, kind, &record.state)
            .map_err(|e| Error::store(e).with_context("identity", identity))?;
        if let Some(initializer) = self.inner.initializer.as_ref() {
            initializer.initialize(identity, &mut servant);
        }

        self.inner.metrics.evictor_load_duration.record(now.elapsed().as_secs_f64());
        tracing::debug!(%identity, tag = %record.tag, "[evictor]: servant loaded");
        Ok(servant)
    }

    fn build(&self, identity: &Identity, kind: KindOf<F>) -> Result<F::Servant> {
        match self.inner.store.contains(identity) {
            Ok(true) => return Err(already_exists(identity)),
            Ok(false) => {}
            Err(e) => return Err(Error::store(e).with_context("identity", identity)),
        }
        let mut servant = self.inner.factory.newly_created(identity, kind)?;
        if let Some(initializer) = self.inner.initializer.as_ref() {
            initializer.initialize(identity, &mut servant);
        }
        Ok(servant)
    }

    fn admit(&self, identity: &Identity, servant: F::Servant, dirty: bool) -> Handle<F::Servant> {
        let slot = Arc::new(Slot {
            servant: Arc::new(Mutex::new(servant)),
            io: Mutex::new(false),
        });
        let handle = slot.servant.clone();

        let mut state = self.inner.state.lock();
        let victims = state.admit(identity, slot, dirty);
        self.sync_usage(&state);
        drop(state);
        self.inner.changed.notify_all();

        self.retire(victims);
        handle
    }

    fn persist_created(
        &self,
        identity: &Identity,
        slot: &Arc<Slot<F::Servant>>,
        version: u64,
    ) -> Vec<Victim<F::Servant>> {
        let retired = slot.io.lock();
        let res = match *retired {
            true => Ok(()),
            false => self.write_back(identity, &slot.servant.lock()),
        };
        match &res {
            Ok(()) => tracing::debug!(%identity, "[evictor]: created servant persisted"),
            Err(e) => self.report_write_back_failure(identity, e),
        }

        let mut state = self.inner.state.lock();
        let victims = state.persisted(identity, slot, version, res.is_ok());
        self.sync_usage(&state);
        drop(state);
        drop(retired);
        self.inner.changed.notify_all();
        victims
    }

    fn abandon(&self, identity: &Identity) {
        let mut state = self.inner.state.lock();
        state.abandon(identity);
        self.sync_usage(&state);
        drop(state);
        self.inner.changed.notify_all();
    }

    /// Write back the dirty victims and drop them from memory.
    ///
    /// Called without the state lock. A victim whose write-back fails is restored as the most recently used idle
    /// servant and is not retried in this round.
    fn retire(&self, victims: Vec<Victim<F::Servant>>) {
        for victim in victims {
            let Victim { identity, slot, dirty } = victim;

            let mut retired = slot.io.lock();
            if *retired {
                // Removed from the store while being picked.
                self.inner.state.lock().entries.remove(&identity);
                drop(retired);
                self.inner.changed.notify_all();
                continue;
            }

            let res = match dirty {
                true => self.write_back(&identity, &slot.servant.lock()),
                false => Ok(()),
            };

            match res {
                Ok(()) => {
                    *retired = true;
                    self.inner.state.lock().entries.remove(&identity);
                    drop(retired);
                    self.inner.changed.notify_all();

                    self.inner.metrics.evictor_evict.increase(1);
                    if let Some(listener) = self.inner.listener.as_ref() {
                        listener.on_leave(Event::Evict, &identity);
                    }
                    tracing::debug!(%identity, dirty, "[evictor]: servant evicted");
                }
                Err(e) => {
                    drop(retired);
                    let mut state = self.inner.state.lock();
                    state.restore(&identity);
                    self.sync_usage(&state);
                    drop(state);
                    self.inner.changed.notify_all();

                    self.report_write_back_failure(&identity, &e);
                }
            }
        }
    }

    fn write_back(&self, identity: &Identity, servant: &F::Servant) -> Result<()> {
        let now = Instant::now();

        let res = servant
            .save()
            .and_then(|state| {
                PersistedRecord {
                    identity: identity.clone(),
                    tag: servant.kind().tag().to_string(),
                    state,
                }
                .to_bytes()
            })
            .and_then(|bytes| self.inner.store.put(identity, bytes));
        if let Err(e) = res {
            return Err(Error::store(e).with_context("identity", identity));
        }

        self.inner.metrics.evictor_write_back.increase(1);
        self.inner
            .metrics
            .evictor_write_back_duration
            .record(now.elapsed().as_secs_f64());
        tracing::trace!(%identity, "[evictor]: written back");
        Ok(())
    }

    fn report_write_back_failure(&self, identity: &Identity, error: &Error) {
        tracing::error!(%identity, ?error, "[evictor]: write-back failed, the servant stays resident and dirty");
        self.inner.metrics.evictor_write_back_failure.increase(1);
        if let Some(listener) = self.inner.listener.as_ref() {
            listener.on_write_back_failure(identity, error);
        }
    }

    fn sync_usage(&self, state: &State<F::Servant>) {
        self.inner.metrics.evictor_usage.absolute(state.usage as u64);
    }
}

fn already_exists(identity: &Identity) -> Error {
    Error::new(ErrorKind::AlreadyExists, "").with_context("identity", identity)
}

fn aggregate(failures: Vec<(Identity, Error)>, op: &'static str) -> Result<()> {
    let Some((_, first)) = failures.first() else {
        return Ok(());
    };
    let first = first.clone();
    let identities = failures.iter().map(|(identity, _)| identity).join(", ");
    Err(Error::new(ErrorKind::Store, format!("{} write-backs failed", failures.len()))
        .with_context("op", op)
        .with_context("identities", identities)
        .with_source(first))
}
