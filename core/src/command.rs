//! Commands and the outcome of handling them.
//!
//! A [`CommandEnvelope`] is created once per send and passed by reference
//! through hydration, handling and commit. Handling yields a
//! [`CommandExecutionResult`].

use crate::identity::{CommandId, PrincipalId, SequenceId};
use crate::stream::{TenantId, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Source tag used when a command does not say where it came from.
pub const DEFAULT_SOURCE: &str = "eventloom";

/// Immutable record wrapping one inbound command.
///
/// # Example
///
/// ```
/// use eventloom_core::command::CommandEnvelope;
/// use eventloom_core::identity::PrincipalId;
/// use eventloom_core::stream::TenantId;
///
/// let command = CommandEnvelope::new(42_u64, "close")
///     .with_tenant(TenantId::new("acme"))
///     .with_principal(PrincipalId::new("ada"))
///     .with_source("api");
///
/// // Follow-up commands stay in the same sequence.
/// let follow_up = command.caused(7_u64, "notify");
/// assert_eq!(follow_up.sequence_id(), command.sequence_id());
/// assert_eq!(follow_up.parent_command_id(), Some(command.command_id()));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope<Id, C> {
    aggregate_id: Id,
    tenant_id: TenantId,
    command_id: CommandId,
    parent_command_id: Option<CommandId>,
    sequence_id: SequenceId,
    principal_id: PrincipalId,
    source: String,
    payload: C,
    timestamp: DateTime<Utc>,
}

impl<Id, C> CommandEnvelope<Id, C> {
    /// Wrap a top-level command.
    ///
    /// Starts a new sequence, runs as the system principal in the default
    /// tenant, and is timestamped now.
    #[must_use]
    pub fn new(aggregate_id: Id, payload: C) -> Self {
        Self {
            aggregate_id,
            tenant_id: TenantId::empty(),
            command_id: CommandId::generate(),
            parent_command_id: None,
            sequence_id: SequenceId::generate(),
            principal_id: PrincipalId::system(),
            source: DEFAULT_SOURCE.to_string(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Wrap a command caused by this one.
    ///
    /// The child inherits tenant, principal, source and sequence, and records
    /// this command as its parent.
    #[must_use]
    pub fn caused<Id2, C2>(&self, aggregate_id: Id2, payload: C2) -> CommandEnvelope<Id2, C2> {
        CommandEnvelope {
            aggregate_id,
            tenant_id: self.tenant_id.clone(),
            command_id: CommandId::generate(),
            parent_command_id: Some(self.command_id),
            sequence_id: self.sequence_id,
            principal_id: self.principal_id.clone(),
            source: self.source.clone(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Set the tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    /// Set the principal.
    #[must_use]
    pub fn with_principal(mut self, principal_id: PrincipalId) -> Self {
        self.principal_id = principal_id;
        self
    }

    /// Set the source tag.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Join an existing sequence.
    #[must_use]
    pub fn with_sequence(mut self, sequence_id: SequenceId) -> Self {
        self.sequence_id = sequence_id;
        self
    }

    /// Override the timestamp (useful with a test clock).
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Target aggregate.
    pub const fn aggregate_id(&self) -> &Id {
        &self.aggregate_id
    }

    /// Tenant the command runs in.
    pub const fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Unique id of this invocation.
    pub const fn command_id(&self) -> CommandId {
        self.command_id
    }

    /// Command that caused this one, if any.
    pub const fn parent_command_id(&self) -> Option<CommandId> {
        self.parent_command_id
    }

    /// Sequence this command belongs to.
    pub const fn sequence_id(&self) -> SequenceId {
        self.sequence_id
    }

    /// Who issued the command.
    pub const fn principal_id(&self) -> &PrincipalId {
        &self.principal_id
    }

    /// Where the command came from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The command payload.
    pub const fn payload(&self) -> &C {
        &self.payload
    }

    /// When the command was created.
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A business rule refused the command.
///
/// Returned from command handlers. Nothing is appended for a rejected command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("command rejected: {reason}")]
pub struct CommandRejected {
    reason: String,
}

impl CommandRejected {
    /// Reject with a reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Why the command was rejected.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Outcome of handling one command.
///
/// `has_changes` implies `accepted`; the constructors are the only way to
/// build a value, so the invariant always holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandExecutionResult {
    accepted: bool,
    has_changes: bool,
    error: Option<String>,
    resulting_version: Version,
}

impl CommandExecutionResult {
    /// Accepted; changed the aggregate iff `has_changes`.
    ///
    /// Idempotent no-op commands produce `accepted = true, has_changes = false`.
    #[must_use]
    pub const fn ok_if_changes(has_changes: bool, resulting_version: Version) -> Self {
        Self {
            accepted: true,
            has_changes,
            error: None,
            resulting_version,
        }
    }

    /// Rejected by a business rule.
    #[must_use]
    pub fn rejected(reason: impl Into<String>, resulting_version: Version) -> Self {
        Self {
            accepted: false,
            has_changes: false,
            error: Some(reason.into()),
            resulting_version,
        }
    }

    /// Whether the command was accepted.
    #[must_use]
    pub const fn accepted(&self) -> bool {
        self.accepted
    }

    /// Whether at least one event was produced.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.has_changes
    }

    /// Rejection reason, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Stream version after the command.
    #[must_use]
    pub const fn resulting_version(&self) -> Version {
        self.resulting_version
    }

    /// Replace the resulting version once the append has been acknowledged.
    #[must_use]
    pub fn at_version(mut self, version: Version) -> Self {
        self.resulting_version = version;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;

    #[test]
    fn top_level_commands_start_new_sequences() {
        let a = CommandEnvelope::new(1_u64, ());
        let b = CommandEnvelope::new(1_u64, ());
        assert_ne!(a.sequence_id(), b.sequence_id());
        assert_ne!(a.command_id(), b.command_id());
        assert_eq!(a.parent_command_id(), None);
        assert!(a.tenant_id().is_empty());
        assert_eq!(a.source(), DEFAULT_SOURCE);
    }

    #[test]
    fn caused_commands_inherit_context() {
        let parent = CommandEnvelope::new(1_u64, "open")
            .with_tenant(TenantId::new("acme"))
            .with_principal(PrincipalId::new("ada"));
        let child = parent.caused("other".to_string(), 5_i32);

        assert_eq!(child.sequence_id(), parent.sequence_id());
        assert_eq!(child.parent_command_id(), Some(parent.command_id()));
        assert_eq!(child.tenant_id(), parent.tenant_id());
        assert_eq!(child.principal_id().as_str(), "ada");
        assert_ne!(child.command_id(), parent.command_id());
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if serialization fails
    fn command_payloads_go_through_the_codec() {
        let command = CommandEnvelope::new(9_u64, vec!["a".to_string()]);
        let bytes = Codec::Bincode.encode(&command).expect("encode");
        let back: CommandEnvelope<u64, Vec<String>> =
            Codec::Bincode.decode(&bytes).expect("decode");
        assert_eq!(back, command);
    }

    mod result_tests {
        use super::*;

        #[test]
        fn no_op_is_accepted_without_changes() {
            let result = CommandExecutionResult::ok_if_changes(false, Version::new(3));
            assert!(result.accepted());
            assert!(!result.has_changes());
            assert_eq!(result.error(), None);
        }

        #[test]
        fn rejection_never_has_changes() {
            let result = CommandExecutionResult::rejected("insufficient funds", Version::new(3));
            assert!(!result.accepted());
            assert!(!result.has_changes());
            assert_eq!(result.error(), Some("insufficient funds"));
        }

        #[test]
        fn at_version_keeps_flags() {
            let result = CommandExecutionResult::ok_if_changes(true, Version::new(3))
                .at_version(Version::new(5));
            assert!(result.has_changes());
            assert_eq!(result.resulting_version(), Version::new(5));
        }
    }
}
