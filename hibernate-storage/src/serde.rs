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

use std::hash::Hasher;

use hibernate_common::error::{Error, ErrorKind, Result};
use twox_hash::XxHash64;

/// Checksum of persisted payloads.
#[derive(Debug)]
pub struct Checksummer;

impl Checksummer {
    /// xxHash64 of the buffer with seed 0.
    pub fn checksum64(buf: &[u8]) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(buf);
        hasher.finish()
    }
}

/// Header of a record file.
///
/// ```plain
/// | magic (4B) | payload length (8B, LE) | payload checksum (8B, LE) | payload ... |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub len: u64,
    pub checksum: u64,
}

impl RecordHeader {
    pub const MAGIC: [u8; 4] = *b"HBNT";
    pub const SIZE: usize = 4 + 8 + 8;

    pub fn new(payload: &[u8]) -> Self {
        Self {
            len: payload.len() as u64,
            checksum: Checksummer::checksum64(payload),
        }
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&Self::MAGIC);
        buf.extend_from_slice(&self.len.to_le_bytes());
        buf.extend_from_slice(&self.checksum.to_le_bytes());
    }

    /// Parse the header and verify the payload that follows it.
    pub fn verify(buf: &[u8]) -> Result<&[u8]> {
        if buf.len() < Self::SIZE {
            return Err(Error::new(ErrorKind::Parse, "record shorter than its header").with_context("len", buf.len()));
        }
        let (header, payload) = buf.split_at(Self::SIZE);

        if header[..4] != Self::MAGIC {
            return Err(Error::new(ErrorKind::MagicMismatch, "not a record file")
                .with_context("expected", format!("{:?}", Self::MAGIC))
                .with_context("get", format!("{:?}", &header[..4])));
        }

        let mut word = [0u8; 8];
        word.copy_from_slice(&header[4..12]);
        let len = u64::from_le_bytes(word);
        word.copy_from_slice(&header[12..20]);
        let checksum = u64::from_le_bytes(word);

        if len != payload.len() as u64 {
            return Err(Error::new(ErrorKind::Parse, "record length mismatch")
                .with_context("expected", len)
                .with_context("get", payload.len()));
        }

        let get = Checksummer::checksum64(payload);
        if get != checksum {
            return Err(Error::new(ErrorKind::ChecksumMismatch, "record payload corrupted")
                .with_context("expected", checksum)
                .with_context("get", get));
        }

        Ok(payload)
    }
}
