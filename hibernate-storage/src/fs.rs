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
    fmt::Write as _,
    fs::create_dir_all,
    io::{ErrorKind as IoErrorKind, Write},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use hibernate_common::{
    error::{Error, Result},
    identity::Identity,
};
use tempfile::NamedTempFile;

use crate::{serde::RecordHeader, store::Store};

/// Builder for a filesystem store that keeps one file per identity in a directory.
#[derive(Debug)]
pub struct FsStoreBuilder {
    dir: PathBuf,
    sync: bool,
}

impl FsStoreBuilder {
    /// Use the given directory for the store. The directory is created on build if it doesn't exist.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().into(),
            sync: true,
        }
    }

    /// Set whether writes are synced to the disk before `put` and `remove` return.
    ///
    /// Writes are always atomic per identity. Without sync, an acknowledged write may be lost on power failure.
    ///
    /// Default: `true`.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Build the filesystem store.
    pub fn build(self) -> Result<FsStore> {
        create_dir_all(&self.dir).map_err(|e| Error::io_error(e).with_context("dir", self.dir.display()))?;
        tracing::debug!(dir = %self.dir.display(), sync = self.sync, "[fs store]: opened");
        Ok(FsStore {
            dir: self.dir,
            sync: self.sync,
        })
    }
}

/// A store that keeps each record in its own file.
///
/// A record file is named after the hex encoding of the identity and carries a header with a magic, the payload
/// length and the payload checksum. The hex of a long identity is split into nested directories, so that no path
/// component exceeds the file name limit of common filesystems. A `put` writes a temporary file in the same directory and atomically renames it
/// over the record file, so a reader sees either the old or the new record.
#[derive(Debug)]
pub struct FsStore {
    dir: PathBuf,
    sync: bool,
}

impl FsStore {
    const SUFFIX: &'static str = "rec";
    /// Hex chars per path component, below the usual 255 bytes name limit with the suffix.
    const COMPONENT: usize = 200;

    /// The directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The path of the record file of the identity.
    pub fn path(&self, identity: &Identity) -> PathBuf {
        let mut hex = String::with_capacity(identity.as_bytes().len() * 2);
        for byte in identity.as_bytes() {
            let _ = write!(hex, "{byte:02x}");
        }

        let mut path = self.dir.clone();
        let mut rest = hex.as_str();
        while rest.len() > Self::COMPONENT {
            let (component, tail) = rest.split_at(Self::COMPONENT);
            path.push(component);
            rest = tail;
        }
        path.push(format!("{rest}.{}", Self::SUFFIX));
        path
    }

    fn sync_dir(&self, dir: &Path) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            if self.sync {
                std::fs::File::open(dir)?.sync_all()?;
            }
        }
        #[cfg(not(unix))]
        let _ = dir;
        Ok(())
    }
}

impl Store for FsStore {
    fn get(&self, identity: &Identity) -> Result<Option<Bytes>> {
        let path = self.path(identity);
        let buf = match std::fs::read(&path) {
            Ok(buf) => buf,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io_error(e).with_context("path", path.display())),
        };
        let payload = RecordHeader::verify(&buf)
            .map_err(|e| e.with_context("identity", identity).with_context("path", path.display()))?;
        let payload = Bytes::copy_from_slice(payload);
        Ok(Some(payload))
    }

    fn put(&self, identity: &Identity, bytes: Bytes) -> Result<()> {
        let path = self.path(identity);
        let io = |e: std::io::Error| Error::io_error(e).with_context("path", path.display());
        let parent = path.parent().unwrap_or(self.dir.as_path());
        if parent != self.dir.as_path() {
            create_dir_all(parent).map_err(io)?;
        }

        let mut buf = Vec::with_capacity(RecordHeader::SIZE + bytes.len());
        RecordHeader::new(&bytes).write(&mut buf);
        buf.extend_from_slice(&bytes);

        let mut file = NamedTempFile::new_in(parent).map_err(io)?;
        file.write_all(&buf).map_err(io)?;
        if self.sync {
            file.as_file().sync_all().map_err(io)?;
        }
        file.persist(&path).map_err(|e| io(e.error))?;
        self.sync_dir(parent).map_err(io)?;

        tracing::trace!(%identity, len = bytes.len(), "[fs store]: record written");
        Ok(())
    }

    fn remove(&self, identity: &Identity) -> Result<bool> {
        let path = self.path(identity);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(Error::io_error(e).with_context("path", path.display())),
        }
        self.sync_dir(path.parent().unwrap_or(self.dir.as_path()))
            .map_err(|e| Error::io_error(e).with_context("path", path.display()))?;
        Ok(true)
    }

    fn contains(&self, identity: &Identity) -> Result<bool> {
        self.path(identity)
            .try_exists()
            .map_err(|e| Error::io_error(e).with_context("identity", identity))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hibernate_common::error::ErrorKind;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    use super::*;

    #[test_log::test]
    fn test_fs_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStoreBuilder::new(dir.path().join("records")).build().unwrap();
        let alice = Identity::from("alice");

        assert_eq!(store.get(&alice).unwrap(), None);
        assert!(!store.contains(&alice).unwrap());
        assert!(!store.remove(&alice).unwrap());

        store.put(&alice, Bytes::from_static(b"v1")).unwrap();
        store.put(&alice, Bytes::from_static(b"v2")).unwrap();
        assert!(store.contains(&alice).unwrap());
        assert_eq!(store.get(&alice).unwrap(), Some(Bytes::from_static(b"v2")));

        assert!(store.remove(&alice).unwrap());
        assert_eq!(store.get(&alice).unwrap(), None);

        // No temporary file is left behind.
        assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 0);
    }

    #[test_log::test]
    fn test_fs_store_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let ids = ["contact/1", "contact/2", "phonebook", "", "名前"].map(Identity::from);

        {
            let store = FsStoreBuilder::new(dir.path()).build().unwrap();
            for id in ids.iter() {
                store.put(id, Bytes::from(format!("state of {id}"))).unwrap();
            }
        }

        let store = FsStoreBuilder::new(dir.path()).with_sync(false).build().unwrap();
        for id in ids.iter() {
            assert_eq!(store.get(id).unwrap(), Some(Bytes::from(format!("state of {id}"))));
            assert!(store.path(id).starts_with(dir.path()));
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), ids.len());
    }

    #[test_log::test]
    fn test_fs_store_long_identity() {
        let dir = tempfile::tempdir().unwrap();
        let long = Identity::new("x".repeat(200));
        let longer = Identity::new("y".repeat(1000));

        {
            let store = FsStoreBuilder::new(dir.path()).build().unwrap();
            assert_eq!(store.get(&long).unwrap(), None);
            assert!(!store.contains(&long).unwrap());
            store.put(&long, Bytes::from_static(b"long")).unwrap();
            store.put(&longer, Bytes::from_static(b"longer")).unwrap();
        }

        let store = FsStoreBuilder::new(dir.path()).build().unwrap();
        for id in [&long, &longer] {
            let path = store.path(id);
            assert!(path.starts_with(dir.path()));
            assert!(path.components().all(|c| c.as_os_str().len() < 255));
        }
        assert_eq!(store.get(&long).unwrap(), Some(Bytes::from_static(b"long")));
        assert_eq!(store.get(&longer).unwrap(), Some(Bytes::from_static(b"longer")));

        assert!(store.remove(&longer).unwrap());
        assert_eq!(store.get(&longer).unwrap(), None);
        assert!(!store.remove(&longer).unwrap());
        assert!(store.contains(&long).unwrap());
    }

    #[test_log::test]
    fn test_fs_store_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStoreBuilder::new(dir.path()).build().unwrap();
        let bob = Identity::from("bob");

        store.put(&bob, Bytes::from_static(b"some state")).unwrap();

        let path = store.path(&bob);
        let mut raw = std::fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        std::fs::write(&path, &raw).unwrap();
        let err = store.get(&bob).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
        assert!(err.context().iter().any(|(k, v)| *k == "identity" && v == "bob"));

        std::fs::write(&path, b"garbage that is long enough to hold a header").unwrap();
        assert_eq!(store.get(&bob).unwrap_err().kind(), ErrorKind::MagicMismatch);

        // A fresh put repairs the record.
        store.put(&bob, Bytes::from_static(b"repaired")).unwrap();
        assert_eq!(store.get(&bob).unwrap(), Some(Bytes::from_static(b"repaired")));
    }

    #[test_log::test]
    fn test_fs_store_concurrent_identities() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 50;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsStoreBuilder::new(dir.path()).with_sync(false).build().unwrap());

        let handles = (0..THREADS)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let mut rng = SmallRng::seed_from_u64(t as u64);
                    let id = Identity::new(format!("thread-{t}"));
                    let mut last = vec![];
                    for _ in 0..ROUNDS {
                        let len = rng.random_range(0..256);
                        last = (0..len).map(|_| rng.random()).collect::<Vec<u8>>();
                        store.put(&id, Bytes::from(last.clone())).unwrap();
                    }
                    (id, last)
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            let (id, last) = handle.join().unwrap();
            assert_eq!(store.get(&id).unwrap(), Some(Bytes::from(last)));
        }
    }
}
