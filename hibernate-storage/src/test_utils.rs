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

//! Utilities for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use hibernate_common::{
    error::{Error, Result},
    identity::Identity,
};

use crate::{memory::MemoryStore, store::Store};

/// An in-memory store whose operations can be switched to fail.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryStore,

    fail_get: AtomicBool,
    fail_put: AtomicBool,
    fail_remove: AtomicBool,

    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl FaultyStore {
    /// Create a store that doesn't fail until told to.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `get` fail or succeed.
    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    /// Make `put` fail or succeed.
    pub fn fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    /// Make `remove` fail or succeed.
    pub fn fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    /// Count of `get` calls, failed ones included.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Count of `put` calls, failed ones included.
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// The store behind the faults.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn injected(op: &'static str, identity: &Identity) -> Error {
        Error::io_error(std::io::Error::other("injected failure"))
            .with_context("op", op)
            .with_context("identity", identity)
    }
}

impl Store for FaultyStore {
    fn get(&self, identity: &Identity) -> Result<Option<Bytes>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Self::injected("get", identity));
        }
        self.inner.get(identity)
    }

    fn put(&self, identity: &Identity, bytes: Bytes) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(Self::injected("put", identity));
        }
        self.inner.put(identity, bytes)
    }

    fn remove(&self, identity: &Identity) -> Result<bool> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(Self::injected("remove", identity));
        }
        self.inner.remove(identity)
    }
}
