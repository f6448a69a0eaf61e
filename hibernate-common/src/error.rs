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
    backtrace::Backtrace,
    fmt::{Debug, Display},
    sync::Arc,
};

use itertools::Itertools;

use crate::identity::Identity;

/// ErrorKind is all kinds of Error of hibernate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// I/O error.
    Io,
    /// Config error.
    Config,
    /// Parse error.
    Parse,
    /// Checksum mismatch.
    ChecksumMismatch,
    /// Magic mismatch.
    MagicMismatch,
    /// The object is neither resident nor persisted.
    NotFound,
    /// The object is already resident or persisted.
    AlreadyExists,
    /// The object is not held by any dispatch.
    NotActive,
    /// The persistent store failed to serve a read or a write.
    Store,
    /// The task is already pending on the timer.
    ScheduleConflict,
    /// Shutdown has begun, or the component is destroyed.
    Closed,
}

impl ErrorKind {
    /// Human readable name of the kind.
    pub fn into_static(self) -> &'static str {
        match self {
            ErrorKind::Io => "I/O error",
            ErrorKind::Config => "Config error",
            ErrorKind::Parse => "Parse error",
            ErrorKind::ChecksumMismatch => "Checksum mismatch",
            ErrorKind::MagicMismatch => "Magic mismatch",
            ErrorKind::NotFound => "Object not found",
            ErrorKind::AlreadyExists => "Object already exists",
            ErrorKind::NotActive => "Object not active",
            ErrorKind::Store => "Store failure",
            ErrorKind::ScheduleConflict => "Schedule conflict",
            ErrorKind::Closed => "Shutdown in progress",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.into_static())
    }
}

/// Error is the error struct returned by all hibernate functions.
///
/// ## Display
///
/// - Via `Display`, the error is printed in a single line:
///
/// ```shell
/// Store failure, context: { identity: alice } => write-back failed, source: disk full
/// ```
///
/// - Via `Debug`, the error is printed in multi lines with the context, the source and the backtrace (if captured).
///
/// - Via `{:#?}`, the error is printed as a conventional struct-style debug representation.
pub struct Error {
    kind: ErrorKind,
    message: String,

    context: Vec<(&'static str, String)>,

    source: Option<Arc<anyhow::Error>>,
    backtrace: Option<Arc<Backtrace>>,
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            return f
                .debug_struct("Error")
                .field("kind", &self.kind)
                .field("message", &self.message)
                .field("context", &self.context)
                .field("source", &self.source)
                .field("backtrace", &self.backtrace)
                .finish();
        }

        match self.message.is_empty() {
            true => writeln!(f, "{}", self.kind)?,
            false => writeln!(f, "{} => {}", self.kind, self.message)?,
        }
        if !self.context.is_empty() {
            writeln!(f, "\nContext:")?;
            for (key, value) in &self.context {
                writeln!(f, "    {key}: {value}")?;
            }
        }
        if let Some(source) = &self.source {
            writeln!(f, "\nSource:\n    {source:#}")?;
        }
        if let Some(backtrace) = &self.backtrace {
            writeln!(f, "\nBacktrace:\n{backtrace}")?;
        }
        Ok(())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.kind, f)?;
        if !self.context.is_empty() {
            let pairs = self.context.iter().format_with(", ", |(k, v), f| f(&format_args!("{k}: {v}")));
            write!(f, ", context: {{ {pairs} }}")?;
        }
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref().as_ref())
    }
}

/// Cloning an [`Error`] clones its message and context, the source and the backtrace are shared.
impl Clone for Error {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            context: self.context.clone(),
            source: self.source.clone(),
            backtrace: self.backtrace.clone(),
        }
    }
}

impl Error {
    /// Create a new error.
    ///
    /// If the error needs to carry a source error, please use `with_source` method.
    ///
    /// ```rust
    /// # use hibernate_common::error::{Error, ErrorKind};
    /// let io_error = std::io::Error::other("disk full");
    /// Error::new(ErrorKind::Store, "write-back failed").with_source(io_error);
    /// ```
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            source: None,
            backtrace: Some(Arc::new(Backtrace::capture())),
        }
    }

    /// Add more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Set source for error.
    ///
    /// # Notes
    ///
    /// If the source has been set, we will raise a panic here in debug builds.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");
        self.source = Some(Arc::new(source.into()));
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error context.
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Get the error backtrace.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }

    /// Get the error source.
    pub fn source(&self) -> Option<&anyhow::Error> {
        self.source.as_deref()
    }

    /// Downcast the reference of the source error to a specific error type reference.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source.as_deref().and_then(|e| e.downcast_ref::<E>())
    }
}

/// Result type for hibernate.
pub type Result<T> = std::result::Result<T, Error>;

/// Helper methods for Error.
impl Error {
    /// Helper for creating an [`ErrorKind::Io`] error from [`std::io::Error`].
    pub fn io_error(source: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, "").with_source(source)
    }

    /// Helper for creating an error from [`bincode::Error`].
    pub fn bincode_error(source: bincode::Error) -> Self {
        match *source {
            bincode::ErrorKind::Io(e) => Self::io_error(e),
            _ => Error::new(ErrorKind::Parse, "coding error").with_source(source),
        }
    }

    /// Helper for creating an [`ErrorKind::NotFound`] error for the identity.
    pub fn not_found(identity: &Identity) -> Self {
        Error::new(ErrorKind::NotFound, "").with_context("identity", identity)
    }

    /// Helper for creating an [`ErrorKind::Closed`] error.
    pub fn closed() -> Self {
        Error::new(ErrorKind::Closed, "")
    }

    /// Helper for wrapping a failure of the persistent store into an [`ErrorKind::Store`] error.
    ///
    /// Errors that are already [`ErrorKind::Store`] errors are returned as they are.
    pub fn store(source: Error) -> Self {
        if source.kind() == ErrorKind::Store {
            return source;
        }
        Error::new(ErrorKind::Store, source.kind().into_static()).with_source(source)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::io_error(e)
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Self::bincode_error(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<Error>();
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct DiskFull(u64);

    impl std::fmt::Display for DiskFull {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "disk full, {} bytes requested", self.0)
        }
    }

    impl std::error::Error for DiskFull {}

    #[test]
    fn test_error_display() {
        let err = Error::new(ErrorKind::Store, "write-back failed")
            .with_source(DiskFull(4096))
            .with_context("identity", "alice")
            .with_context("attempt", 2);

        assert_eq!(
            "Store failure, context: { identity: alice, attempt: 2 } => write-back failed, source: disk full, 4096 bytes requested",
            err.to_string()
        );
    }

    #[test]
    fn test_error_downcast() {
        let inner = DiskFull(42);
        let err = Error::new(ErrorKind::Store, "").with_source(inner.clone());

        let downcasted = err.downcast_ref::<DiskFull>().unwrap();
        assert_eq!(downcasted, &inner);
    }

    #[test]
    fn test_kind_names() {
        let kinds = [
            ErrorKind::Io,
            ErrorKind::Config,
            ErrorKind::Parse,
            ErrorKind::ChecksumMismatch,
            ErrorKind::MagicMismatch,
            ErrorKind::NotFound,
            ErrorKind::AlreadyExists,
            ErrorKind::NotActive,
            ErrorKind::Store,
            ErrorKind::ScheduleConflict,
            ErrorKind::Closed,
        ];
        let names = kinds.iter().map(|kind| kind.into_static()).collect::<std::collections::HashSet<_>>();
        assert_eq!(names.len(), kinds.len());
        assert_eq!(Error::closed().kind(), ErrorKind::Closed);
    }

    #[test]
    fn test_store_wrapping() {
        let io = Error::io_error(std::io::Error::other("boom"));
        let wrapped = Error::store(io);
        assert_eq!(wrapped.kind(), ErrorKind::Store);
        assert_eq!(wrapped.message(), "I/O error");

        let again = Error::store(wrapped.clone());
        assert_eq!(again.kind(), ErrorKind::Store);
        assert_eq!(again.to_string(), wrapped.to_string());
    }

    #[test]
    fn test_not_found_context() {
        let err = Error::not_found(&Identity::from("bob"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.context(), &[("identity", "bob".to_string())]);
        assert_eq!(err.to_string(), "Object not found, context: { identity: bob }");
    }
}
