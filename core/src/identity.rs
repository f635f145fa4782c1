//! Identifiers carried by commands and events.
//!
//! - [`AggregateId`]: the domain identifier of an aggregate instance, parsed
//!   back from its stored string form when the log is replayed
//! - [`CommandId`], [`EventId`], [`SequenceId`]: UUID-backed correlation ids
//! - [`PrincipalId`]: who (user, service) issued a command

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use thiserror::Error;

/// Failed to parse a stored aggregate identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot parse aggregate id {raw:?}: {reason}")]
pub struct ParseIdError {
    /// The raw string read from the log.
    pub raw: String,
    /// Why the parser rejected it.
    pub reason: String,
}

/// Domain identifier of an aggregate instance.
///
/// The event log stores identifiers as strings. When events are read back,
/// `parse_id` turns them into the aggregate's own identifier type. Any type
/// that round-trips through `Display`/`FromStr` gets this for free.
pub trait AggregateId:
    Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Parse an identifier from its stored string form.
    ///
    /// # Errors
    ///
    /// Returns [`ParseIdError`] when `raw` is not a valid identifier.
    fn parse_id(raw: &str) -> Result<Self, ParseIdError>;
}

impl<T> AggregateId for T
where
    T: FromStr + Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static,
    T::Err: fmt::Display,
{
    fn parse_id(raw: &str) -> Result<Self, ParseIdError> {
        raw.parse().map_err(|e: T::Err| ParseIdError {
            raw: raw.to_string(),
            reason: e.to_string(),
        })
    }
}

crate::uuid_identifier! {
    /// Unique identifier of one command invocation.
    pub struct CommandId;
}

crate::uuid_identifier! {
    /// Unique identifier of one committed event.
    pub struct EventId;
}

crate::uuid_identifier! {
    /// Groups every event produced, transitively, by one top-level command.
    pub struct SequenceId;
}

/// Identity of whoever issued a command.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Create a principal identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Principal used for commands the engine issues on its own behalf.
    #[must_use]
    pub fn system() -> Self {
        Self("system".to_string())
    }

    /// Get the principal as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
