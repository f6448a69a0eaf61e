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

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// Encode/decode trait for anything that is written to the persistent store.
///
/// Types that implement `serde::Serialize` and `serde::de::DeserializeOwned` get an implementation backed by
/// `bincode` for free.
pub trait Code {
    /// Encode the object into a writer.
    fn encode(&self, writer: &mut impl std::io::Write) -> Result<()>;

    /// Decode the object from a reader.
    fn decode(reader: &mut impl std::io::Read) -> Result<Self>
    where
        Self: Sized;

    /// Estimated serialized size of the object.
    ///
    /// The estimated serialized size is used by selector between different kinds of buffers.
    fn estimated_size(&self) -> usize;

    /// Encode the object into a freshly allocated buffer.
    fn encode_to_vec(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.estimated_size());
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Decode the object from a byte slice.
    fn decode_from_slice(mut buf: &[u8]) -> Result<Self>
    where
        Self: Sized,
    {
        Self::decode(&mut buf)
    }
}

impl<T> Code for T
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, writer: &mut impl std::io::Write) -> Result<()> {
        bincode::serialize_into(writer, self).map_err(Into::into)
    }

    fn decode(reader: &mut impl std::io::Read) -> Result<Self> {
        bincode::deserialize_from(reader).map_err(Into::into)
    }

    fn estimated_size(&self) -> usize {
        bincode::serialized_size(self).unwrap_or_default() as usize
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::error::ErrorKind;

    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct Contact {
        name: String,
        phone: Option<String>,
    }

    #[test]
    fn test_serde_blanket_impl() {
        let contact = Contact {
            name: "alice".to_string(),
            phone: Some("555-0100".to_string()),
        };
        let buf = contact.encode_to_vec().unwrap();
        assert_eq!(buf.len(), contact.estimated_size());
        assert_eq!(Contact::decode_from_slice(&buf).unwrap(), contact);
    }

    #[test]
    fn test_truncated_input() {
        let contact = Contact {
            name: "bob".to_string(),
            phone: None,
        };
        let buf = contact.encode_to_vec().unwrap();
        let err = Contact::decode_from_slice(&buf[..buf.len() / 2]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
