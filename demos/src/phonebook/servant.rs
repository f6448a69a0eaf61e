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

use hibernate::{Code, Factory, Identity, Kind, Persistent, Result};
use serde::{Deserialize, Serialize};

/// Kinds of the phonebook objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneKind {
    PhoneBook,
    Contact,
}

impl Kind for PhoneKind {
    fn tag(&self) -> &'static str {
        match self {
            PhoneKind::PhoneBook => "::PhoneBook",
            PhoneKind::Contact => "::Contact",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "::PhoneBook" => Some(PhoneKind::PhoneBook),
            "::Contact" => Some(PhoneKind::Contact),
            _ => None,
        }
    }
}

/// The root object, listing every contact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhoneBook {
    pub contacts: Vec<Identity>,
    /// Sequence of the contact identities.
    pub next: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub address: String,
    pub phone: String,
}

#[derive(Debug)]
pub enum Servant {
    PhoneBook(PhoneBook),
    Contact(Contact),
}

impl Persistent for Servant {
    type Kind = PhoneKind;

    fn kind(&self) -> PhoneKind {
        match self {
            Servant::PhoneBook(_) => PhoneKind::PhoneBook,
            Servant::Contact(_) => PhoneKind::Contact,
        }
    }

    fn save(&self) -> Result<Vec<u8>> {
        match self {
            Servant::PhoneBook(phonebook) => phonebook.encode_to_vec(),
            Servant::Contact(contact) => contact.encode_to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PhoneFactory;

impl Factory for PhoneFactory {
    type Servant = Servant;

    fn create(&self, _: &Identity, kind: PhoneKind, state: &[u8]) -> Result<Servant> {
        let servant = match kind {
            PhoneKind::PhoneBook => Servant::PhoneBook(PhoneBook::decode_from_slice(state)?),
            PhoneKind::Contact => Servant::Contact(Contact::decode_from_slice(state)?),
        };
        Ok(servant)
    }

    fn newly_created(&self, _: &Identity, kind: PhoneKind) -> Result<Servant> {
        let servant = match kind {
            PhoneKind::PhoneBook => Servant::PhoneBook(PhoneBook::default()),
            PhoneKind::Contact => Servant::Contact(Contact::default()),
        };
        Ok(servant)
    }
}

/// Log every servant that becomes live.
pub fn activated(identity: &Identity, servant: &mut Servant) {
    tracing::info!(%identity, kind = ?servant.kind(), "[phonebook]: servant activated");
}
