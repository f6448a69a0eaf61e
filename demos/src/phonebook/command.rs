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

use std::fmt::Write;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hibernate::{Current, ErrorKind, Identity, OperationMode, RequestLocator, ServantLocator};

use crate::servant::{Contact, PhoneBook, PhoneFactory, PhoneKind, Servant};

/// A line typed into the phonebook shell.
#[derive(Debug, Parser)]
#[command(multicall = true)]
pub struct Line {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a contact and print its identity.
    Create { name: String },
    /// Update a field of a contact.
    Set {
        id: String,
        #[arg(value_enum)]
        field: Field,
        #[arg(trailing_var_arg = true, num_args = 1..)]
        value: Vec<String>,
    },
    /// Print a contact.
    Show { id: String },
    /// Print the contacts with the given name.
    Find { name: String },
    /// Print all contacts.
    List,
    /// Delete a contact.
    Delete { id: String },
    /// Write every dirty servant back to the store.
    Flush,
    /// Print the evictor statistics.
    Stats,
    /// Leave the shell.
    #[command(alias = "exit")]
    Quit,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Field {
    Name,
    Address,
    Phone,
}

/// Runs shell commands against the phonebook objects.
#[derive(Debug, Clone)]
pub struct Shell {
    locator: RequestLocator<PhoneFactory>,
}

impl Shell {
    pub const ROOT: &'static str = "phonebook";

    pub fn new(locator: RequestLocator<PhoneFactory>) -> Self {
        Self { locator }
    }

    /// Create the root phonebook on the very first start.
    pub fn ensure_root(&self) -> Result<()> {
        let evictor = self.locator.evictor();
        let root = Identity::from(Self::ROOT);
        match evictor.create(root.clone(), PhoneKind::PhoneBook) {
            Ok(servant) => {
                drop(servant);
                evictor.finished(&root, true)?;
                tracing::info!("[phonebook]: root created");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn execute(&self, command: Command) -> Result<String> {
        match command {
            Command::Create { name } => self.create(name),
            Command::Set { id, field, value } => {
                let value = value.join(" ");
                self.contact(&Identity::from(id), OperationMode::Normal, "set", |contact| match field {
                    Field::Name => contact.name = value,
                    Field::Address => contact.address = value,
                    Field::Phone => contact.phone = value,
                })?;
                Ok("ok".to_string())
            }
            Command::Show { id } => {
                let id = Identity::from(id);
                let contact = self.contact(&id, OperationMode::ReadOnly, "show", |contact| contact.clone())?;
                Ok(describe(&id, &contact))
            }
            Command::Find { name } => self.find(|contact| contact.name == name),
            Command::List => self.find(|_| true),
            Command::Delete { id } => self.delete(Identity::from(id)),
            Command::Flush => {
                let flushed = self.locator.evictor().flush()?;
                Ok(format!("{flushed} servant(s) written back"))
            }
            Command::Stats => Ok(format!("{:?}", self.locator.evictor().stats())),
            Command::Quit => Ok(String::new()),
        }
    }

    fn create(&self, name: String) -> Result<String> {
        let evictor = self.locator.evictor();
        let seq = self.phonebook(OperationMode::Normal, "next", |phonebook| {
            phonebook.next += 1;
            phonebook.next
        })?;
        let id = Identity::new(format!("contact-{seq}"));

        let servant = evictor.create(id.clone(), PhoneKind::Contact)?;
        if let Servant::Contact(contact) = &mut *servant.lock() {
            contact.name = name;
        }
        drop(servant);
        evictor.finished(&id, true)?;

        self.phonebook(OperationMode::Normal, "add", |phonebook| phonebook.contacts.push(id.clone()))?;
        Ok(id.to_string())
    }

    fn delete(&self, id: Identity) -> Result<String> {
        self.locator.evictor().remove(&id)?;
        self.phonebook(OperationMode::Normal, "remove", |phonebook| {
            phonebook.contacts.retain(|contact| contact != &id)
        })?;
        Ok(format!("{id} deleted"))
    }

    fn find(&self, pred: impl Fn(&Contact) -> bool) -> Result<String> {
        let ids = self.phonebook(OperationMode::ReadOnly, "contacts", |phonebook| phonebook.contacts.clone())?;
        let mut out = String::new();
        for id in ids {
            let contact = self.contact(&id, OperationMode::ReadOnly, "show", |contact| contact.clone())?;
            if pred(&contact) {
                writeln!(out, "{}", describe(&id, &contact))?;
            }
        }
        Ok(out.trim_end().to_string())
    }

    fn phonebook<R>(&self, mode: OperationMode, op: &str, f: impl FnOnce(&mut PhoneBook) -> R) -> Result<R> {
        let current = Current::new(Self::ROOT, op, mode);
        self.locator.dispatch(&current, |servant| match servant {
            Servant::PhoneBook(phonebook) => Ok(f(phonebook)),
            Servant::Contact(_) => Err(anyhow!("{} is not a phonebook", Self::ROOT)),
        })?
    }

    fn contact<R>(&self, id: &Identity, mode: OperationMode, op: &str, f: impl FnOnce(&mut Contact) -> R) -> Result<R> {
        let current = Current::new(id.clone(), op, mode);
        self.locator.dispatch(&current, |servant| match servant {
            Servant::Contact(contact) => Ok(f(contact)),
            Servant::PhoneBook(_) => Err(anyhow!("{id} is not a contact")),
        })?
    }

    /// Write everything back and refuse further requests.
    pub fn deactivate(&self) -> Result<()> {
        self.locator.deactivate()?;
        Ok(())
    }
}

fn describe(id: &Identity, contact: &Contact) -> String {
    format!(
        "{id}: name = {:?}, address = {:?}, phone = {:?}",
        contact.name, contact.address, contact.phone
    )
}
