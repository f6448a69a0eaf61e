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

use bytes::Bytes;
use hibernate_common::{code::Code, error::Result, identity::Identity};
use serde::{Deserialize, Serialize};

/// The envelope persisted for one object: its identity, the tag of its kind, and its serialized state.
///
/// The tag selects how the state is turned back into a servant, see `Kind` in `hibernate-memory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Identity of the persisted object.
    pub identity: Identity,
    /// Tag of the object kind.
    pub tag: String,
    /// Serialized object state.
    #[serde(with = "serde_bytes")]
    pub state: Vec<u8>,
}

impl PersistedRecord {
    /// Encode the record into the bytes handed to a store.
    pub fn to_bytes(&self) -> Result<Bytes> {
        self.encode_to_vec().map(Bytes::from)
    }

    /// Decode a record from the bytes read from a store.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        Self::decode_from_slice(buf)
    }
}

#[cfg(test)]
mod tests {
    use hibernate_common::error::ErrorKind;

    use super::*;

    #[test]
    fn test_record_envelope() {
        let record = PersistedRecord {
            identity: Identity::from("alice"),
            tag: "::Contact".to_string(),
            state: vec![1, 2, 3],
        };
        let bytes = record.to_bytes().unwrap();
        assert_eq!(PersistedRecord::from_bytes(&bytes).unwrap(), record);

        assert_eq!(
            PersistedRecord::from_bytes(&bytes[..bytes.len() - 2]).unwrap_err().kind(),
            ErrorKind::Io
        );
    }
}
