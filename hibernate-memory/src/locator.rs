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

//! The dispatch-path hook between a request dispatcher and the evictor.
//!
//! A dispatcher calls [`ServantLocator::locate`] before delivering a request to a servant, and
//! [`ServantLocator::finished`] after the call returns, with a success or a fault.

use hibernate_common::{
    error::{Error, ErrorKind, Result},
    identity::Identity,
};

use crate::{
    evictor::Evictor,
    servant::{Factory, Handle},
};

/// How an operation treats the state of its target object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OperationMode {
    /// The operation may mutate the object.
    #[default]
    Normal,
    /// The operation may mutate the object, and is safe to retry.
    Idempotent,
    /// The operation never mutates the object.
    ReadOnly,
}

impl OperationMode {
    /// Whether a call in this mode is taken as having mutated its target.
    pub fn mutates(&self) -> bool {
        !matches!(self, OperationMode::ReadOnly)
    }
}

/// The request being dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Current {
    /// Identity of the target object.
    pub identity: Identity,
    /// Name of the operation.
    pub operation: String,
    /// Mode of the operation.
    pub mode: OperationMode,
}

impl Current {
    /// A request of `operation` addressed to `identity`.
    pub fn new(identity: impl Into<Identity>, operation: impl Into<String>, mode: OperationMode) -> Self {
        Self {
            identity: identity.into(),
            operation: operation.into(),
            mode,
        }
    }
}

/// Application-level fault returned to the caller of a request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchFault {
    /// The target object doesn't exist, or its persisted state can't be read.
    #[error("object not exist: {identity}{}", .diagnostic.as_ref().map(|d| format!(" ({d})")).unwrap_or_default())]
    ObjectNotExist {
        /// Identity of the target object.
        identity: Identity,
        /// Why the persisted state can't be read, if it exists at all.
        diagnostic: Option<String>,
    },
    /// The evictor is shutting down.
    #[error("shutting down")]
    ShuttingDown,
    /// The servant is released without being located first.
    #[error("object not active: {0}")]
    NotActive(Identity),
    /// The request can't be served for another reason.
    #[error("object unavailable: {identity}, source: {source}")]
    Unavailable {
        /// Identity of the target object.
        identity: Identity,
        /// The underlying error.
        source: Error,
    },
}

impl DispatchFault {
    /// Map an evictor error of the request on `identity` to a fault.
    pub fn from_error(identity: &Identity, error: Error) -> Self {
        match error.kind() {
            ErrorKind::NotFound => DispatchFault::ObjectNotExist {
                identity: identity.clone(),
                diagnostic: None,
            },
            ErrorKind::Store => DispatchFault::ObjectNotExist {
                identity: identity.clone(),
                diagnostic: Some(error.to_string()),
            },
            ErrorKind::Closed => DispatchFault::ShuttingDown,
            ErrorKind::NotActive => DispatchFault::NotActive(identity.clone()),
            _ => DispatchFault::Unavailable {
                identity: identity.clone(),
                source: error,
            },
        }
    }
}

/// The two-phase contract between a request dispatcher and the servants it dispatches to.
pub trait ServantLocator: Send + Sync + 'static {
    /// The servant type.
    type Servant;

    /// Resolve the target of the request. A fault short-circuits the dispatch.
    fn locate(&self, current: &Current) -> std::result::Result<Handle<Self::Servant>, DispatchFault>;

    /// Release the target after the request, with the servant returned by `locate`.
    fn finished(&self, current: &Current, servant: Handle<Self::Servant>) -> std::result::Result<(), DispatchFault>;

    /// Stop locating servants, waiting for the ones in flight.
    fn deactivate(&self) -> Result<()>;
}

/// Servant locator over an [`Evictor`].
///
/// Holds no state of its own. A request that is not read-only marks its target dirty.
pub struct RequestLocator<F>
where
    F: Factory,
{
    evictor: Evictor<F>,
}

impl<F> std::fmt::Debug for RequestLocator<F>
where
    F: Factory,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLocator").field("evictor", &self.evictor).finish()
    }
}

impl<F> Clone for RequestLocator<F>
where
    F: Factory,
{
    fn clone(&self) -> Self {
        Self {
            evictor: self.evictor.clone(),
        }
    }
}

impl<F> RequestLocator<F>
where
    F: Factory,
{
    /// Servant locator over the evictor.
    pub fn new(evictor: Evictor<F>) -> Self {
        Self { evictor }
    }

    /// The evictor behind the locator.
    pub fn evictor(&self) -> &Evictor<F> {
        &self.evictor
    }

    /// Dispatch a request: locate the target, run `f` on it, and release it.
    ///
    /// The target is released even if `f` panics.
    pub fn dispatch<R>(
        &self,
        current: &Current,
        f: impl FnOnce(&mut F::Servant) -> R,
    ) -> std::result::Result<R, DispatchFault> {
        let servant = self.locate(current)?;
        let guard = FinishGuard {
            locator: self,
            current,
            servant: Some(servant.clone()),
        };
        let res = f(&mut servant.lock());
        drop(servant);
        guard.finish()?;
        Ok(res)
    }
}

struct FinishGuard<'a, F>
where
    F: Factory,
{
    locator: &'a RequestLocator<F>,
    current: &'a Current,
    servant: Option<Handle<F::Servant>>,
}

impl<F> FinishGuard<'_, F>
where
    F: Factory,
{
    fn finish(mut self) -> std::result::Result<(), DispatchFault> {
        match self.servant.take() {
            Some(servant) => self.locator.finished(self.current, servant),
            None => Ok(()),
        }
    }
}

impl<F> Drop for FinishGuard<'_, F>
where
    F: Factory,
{
    fn drop(&mut self) {
        if let Some(servant) = self.servant.take() {
            if let Err(e) = self.locator.finished(self.current, servant) {
                tracing::warn!(identity = %self.current.identity, ?e, "[locator]: release after panic failed");
            }
        }
    }
}

impl<F> ServantLocator for RequestLocator<F>
where
    F: Factory,
{
    type Servant = F::Servant;

    fn locate(&self, current: &Current) -> std::result::Result<Handle<Self::Servant>, DispatchFault> {
        self.evictor
            .locate(&current.identity)
            .map_err(|e| DispatchFault::from_error(&current.identity, e))
    }

    fn finished(&self, current: &Current, servant: Handle<Self::Servant>) -> std::result::Result<(), DispatchFault> {
        drop(servant);
        self.evictor
            .finished(&current.identity, current.mode.mutates())
            .map_err(|e| DispatchFault::from_error(&current.identity, e))
    }

    fn deactivate(&self) -> Result<()> {
        self.evictor.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hibernate_storage::{test_utils::FaultyStore, MemoryStore};

    use super::*;
    use crate::{
        builder::EvictorBuilder,
        test_utils::{seed, CounterFactory},
    };

    fn locator(store: Arc<dyn hibernate_storage::Store>) -> RequestLocator<CounterFactory> {
        RequestLocator::new(EvictorBuilder::new(4).build(store, CounterFactory).unwrap())
    }

    #[test_log::test]
    fn test_dispatch_marks_dirty() {
        let store = Arc::new(MemoryStore::new());
        seed(store.as_ref(), &Identity::from("a"), 1);
        let locator = locator(store);

        let read = Current::new("a", "get", OperationMode::ReadOnly);
        assert_eq!(locator.dispatch(&read, |c| c.value).unwrap(), 1);
        assert_eq!(locator.evictor().stats().dirty, 0);

        let write = Current::new("a", "add", OperationMode::Normal);
        locator.dispatch(&write, |c| c.value += 1).unwrap();
        assert_eq!(locator.evictor().stats().dirty, 1);
        assert_eq!(locator.dispatch(&read, |c| c.value).unwrap(), 2);
    }

    #[test_log::test]
    fn test_fault_mapping() {
        let store = Arc::new(FaultyStore::new());
        let locator = locator(store.clone());

        let current = Current::new("missing", "get", OperationMode::ReadOnly);
        assert!(matches!(
            locator.dispatch(&current, |_| ()),
            Err(DispatchFault::ObjectNotExist { diagnostic: None, .. })
        ));

        store.fail_get(true);
        assert!(matches!(
            locator.dispatch(&current, |_| ()),
            Err(DispatchFault::ObjectNotExist { diagnostic: Some(_), .. })
        ));
        store.fail_get(false);

        seed(store.inner(), &Identity::from("a"), 0);
        let current = Current::new("a", "get", OperationMode::ReadOnly);
        let servant = locator.locate(&current).unwrap();
        locator.finished(&current, servant.clone()).unwrap();
        assert!(matches!(
            locator.finished(&current, servant),
            Err(DispatchFault::NotActive(_))
        ));

        locator.deactivate().unwrap();
        assert!(matches!(locator.dispatch(&current, |_| ()), Err(DispatchFault::ShuttingDown)));
    }

    #[test_log::test]
    fn test_dispatch_releases_on_panic() {
        let store = Arc::new(MemoryStore::new());
        seed(store.as_ref(), &Identity::from("a"), 0);
        let locator = locator(store);

        let current = Current::new("a", "boom", OperationMode::Normal);
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            locator.dispatch(&current, |_| panic!("boom")).unwrap();
        }));
        assert!(res.is_err());

        let stats = locator.evictor().stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.idle, 1);
        assert_eq!(locator.dispatch(&current, |c| c.value).unwrap(), 0);
    }
}
