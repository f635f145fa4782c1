//! Aggregates: consistency boundaries that turn commands into events.
//!
//! An [`AggregateRoot`] describes one aggregate type: its identifier, state,
//! events, the [`StateMutator`] that explains those events, and the command
//! handler. An [`Aggregate`] is one transient instance of it:
//!
//! 1. created in [`AggregateStatus::Hydrating`]
//! 2. seeded from a snapshot and fed the stream's remaining events
//! 3. marked ready, which freezes `expected_version`
//! 4. handed one command, which may [`Aggregate::apply`] new events
//! 5. committed by the engine and discarded
//!
//! Command handling never performs I/O.

use crate::command::{CommandEnvelope, CommandExecutionResult, CommandRejected};
use crate::event::{EnvelopeStamp, Event, EventEnvelope};
use crate::identity::AggregateId;
use crate::mutator::{MutatorError, StateMutator};
use crate::stream::{StreamId, TenantId, Version};
use crate::type_registry::TypeTag;
use serde::Serialize;
use serde::de::DeserializeOwned;
use smallvec::SmallVec;
use std::fmt;
use thiserror::Error;

/// Errors raised by aggregate instances.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// A command was applied before hydration finished, or hydration was
    /// attempted after it finished.
    #[error("aggregate {stream_id} is {status:?}")]
    NotReady {
        /// Stream of the aggregate.
        stream_id: StreamId,
        /// Status at the time of the call.
        status: AggregateStatus,
    },

    /// An event could not be explained by the mutator.
    #[error(transparent)]
    Mutator(#[from] MutatorError),

    /// Hydration received an event out of version order.
    #[error("aggregate {stream_id} at {current} cannot replay version {found}")]
    OutOfOrder {
        /// Stream of the aggregate.
        stream_id: StreamId,
        /// Version the aggregate was at.
        current: Version,
        /// Version of the offending event.
        found: Version,
    },

    /// The aggregate type does not declare a usable mutator binding.
    #[error("invalid type binding for aggregate {aggregate_type}: {reason}")]
    InvalidAggregateTypeBinding {
        /// Declared aggregate type name.
        aggregate_type: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Failure of a command handler.
///
/// A rejection is an expected business outcome; an aggregate error means the
/// handler hit a corrupt or misconfigured aggregate and must propagate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    /// A business rule refused the command.
    #[error(transparent)]
    Rejected(#[from] CommandRejected),

    /// Applying an event failed.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Lifecycle of an aggregate instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AggregateStatus {
    /// Replaying history; commands are not accepted.
    Hydrating,
    /// History replayed; commands may apply events.
    Ready,
}

/// One aggregate type.
///
/// # Example
///
/// ```ignore
/// impl AggregateRoot for BankAccount {
///     type Id = AccountId;
///     type State = AccountState;
///     type Event = AccountEvent;
///     type Command = AccountCommand;
///
///     const AGGREGATE_TYPE: &'static str = "account";
///     const TYPE_TAG: TypeTag = TypeTag::new(2);
///
///     fn mutator() -> StateMutator<AccountState, AccountEvent> {
///         StateMutator::new(AccountState::default())
///             .register("Deposited.v1", AccountState::on_deposited)
///             .register("Withdrawn.v1", AccountState::on_withdrawn)
///     }
///
///     fn handle(
///         account: &mut Aggregate<Self>,
///         command: &CommandEnvelope<AccountId, AccountCommand>,
///     ) -> Result<(), HandleError> {
///         match command.payload() {
///             AccountCommand::Withdraw { amount } if account.state().balance < *amount => Ok(()),
///             AccountCommand::Deposit { amount } if *amount == 0 => {
///                 Err(CommandRejected::new("deposit must be positive").into())
///             }
///             AccountCommand::Withdraw { amount } => {
///                 account.apply(command, AccountEvent::Withdrawn { amount: *amount })?;
///                 Ok(())
///             }
///             // ...
///         }
///     }
/// }
/// ```
pub trait AggregateRoot: Sized + Send + Sync + 'static {
    /// Domain identifier.
    type Id: AggregateId;

    /// Materialized state.
    type State: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Events this aggregate emits.
    type Event: Event + Clone + fmt::Debug + Serialize + DeserializeOwned;

    /// Commands this aggregate accepts.
    type Command: Send + Sync + 'static;

    /// Stable aggregate type name; also the stream-id prefix.
    const AGGREGATE_TYPE: &'static str;

    /// Stable compact tag stored with every event.
    const TYPE_TAG: TypeTag;

    /// Build the mutator that explains this aggregate's events.
    fn mutator() -> StateMutator<Self::State, Self::Event>;

    /// Stream holding the events of aggregate `id`.
    fn stream_id(id: &Self::Id) -> StreamId {
        StreamId::for_aggregate(Self::AGGREGATE_TYPE, id)
    }

    /// Handle one command.
    ///
    /// Call [`Aggregate::apply`] for every event the business rules permit.
    /// Applying nothing and returning `Ok(())` is an accepted no-op.
    ///
    /// # Errors
    ///
    /// Return [`HandleError::Rejected`] to refuse the command; nothing is
    /// appended. Errors from [`Aggregate::apply`] propagate with `?`.
    fn handle(
        aggregate: &mut Aggregate<Self>,
        command: &CommandEnvelope<Self::Id, Self::Command>,
    ) -> Result<(), HandleError>;
}

/// Build and validate the mutator of aggregate type `A`.
///
/// # Errors
///
/// Returns [`AggregateError::InvalidAggregateTypeBinding`] if the aggregate
/// type has no name or its mutator registers no transitions.
pub fn bound_mutator<A: AggregateRoot>() -> Result<StateMutator<A::State, A::Event>, AggregateError> {
    if A::AGGREGATE_TYPE.is_empty() {
        return Err(AggregateError::InvalidAggregateTypeBinding {
            aggregate_type: A::AGGREGATE_TYPE,
            reason: "aggregate type name is empty",
        });
    }
    let mutator = A::mutator();
    if mutator.is_empty() {
        return Err(AggregateError::InvalidAggregateTypeBinding {
            aggregate_type: A::AGGREGATE_TYPE,
            reason: "mutator registers no transitions",
        });
    }
    Ok(mutator)
}

/// Uncommitted events of one command; most commands emit only a few.
pub type Uncommitted<A> =
    SmallVec<[EventEnvelope<<A as AggregateRoot>::Id, <A as AggregateRoot>::Event>; 4]>;

/// One transient aggregate instance.
pub struct Aggregate<A: AggregateRoot> {
    id: A::Id,
    stream_id: StreamId,
    tenant_id: TenantId,
    status: AggregateStatus,
    mutator: StateMutator<A::State, A::Event>,
    expected_version: Version,
    current_version: Version,
    uncommitted: Uncommitted<A>,
}

impl<A: AggregateRoot> Aggregate<A> {
    /// Create an instance in [`AggregateStatus::Hydrating`] at
    /// [`Version::NOT_CREATED`].
    #[must_use]
    pub fn hydrating(tenant_id: TenantId, id: A::Id, mutator: StateMutator<A::State, A::Event>) -> Self {
        Self {
            stream_id: A::stream_id(&id),
            id,
            tenant_id,
            status: AggregateStatus::Hydrating,
            mutator,
            expected_version: Version::NOT_CREATED,
            current_version: Version::NOT_CREATED,
            uncommitted: SmallVec::new(),
        }
    }

    fn ensure(&self, status: AggregateStatus) -> Result<(), AggregateError> {
        if self.status == status {
            Ok(())
        } else {
            Err(AggregateError::NotReady {
                stream_id: self.stream_id.clone(),
                status: self.status,
            })
        }
    }

    /// Seed state from a snapshot taken at `version`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::NotReady`] once hydration has finished.
    pub fn restore(&mut self, state: A::State, version: Version) -> Result<(), AggregateError> {
        self.ensure(AggregateStatus::Hydrating)?;
        self.mutator.seed(state);
        self.current_version = version;
        Ok(())
    }

    /// Replay one committed event.
    ///
    /// # Errors
    ///
    /// - [`AggregateError::NotReady`]: hydration has finished
    /// - [`AggregateError::OutOfOrder`]: the event is not after the current version
    /// - [`AggregateError::Mutator`]: the event type is unhandled
    pub fn replay(&mut self, envelope: &EventEnvelope<A::Id, A::Event>) -> Result<(), AggregateError> {
        self.ensure(AggregateStatus::Hydrating)?;
        if envelope.version() <= self.current_version {
            return Err(AggregateError::OutOfOrder {
                stream_id: self.stream_id.clone(),
                current: self.current_version,
                found: envelope.version(),
            });
        }
        self.mutator.transition(envelope)?;
        self.current_version = envelope.version();
        Ok(())
    }

    /// Finish hydration. The current version becomes the expected version
    /// for the next append.
    pub fn mark_ready(&mut self) {
        self.expected_version = self.current_version;
        self.status = AggregateStatus::Ready;
    }

    /// Apply a new event produced by `command`.
    ///
    /// The event is stamped with the command's metadata at
    /// `current_version + 1`, fed to the mutator and buffered.
    ///
    /// # Errors
    ///
    /// - [`AggregateError::NotReady`]: the aggregate is still hydrating
    /// - [`AggregateError::Mutator`]: the event type is unhandled; nothing is buffered
    pub fn apply(
        &mut self,
        command: &CommandEnvelope<A::Id, A::Command>,
        event: A::Event,
    ) -> Result<(), AggregateError> {
        self.ensure(AggregateStatus::Ready)?;
        let version = self.current_version.next();
        let stamp = EnvelopeStamp {
            stream_id: self.stream_id.clone(),
            tenant_id: self.tenant_id.clone(),
            command_id: command.command_id(),
            sequence_id: command.sequence_id(),
            principal_id: command.principal_id().clone(),
            timestamp: command.timestamp(),
        };
        let envelope = EventEnvelope::stamped(self.id.clone(), stamp, event, version);
        self.mutator.transition(&envelope)?;
        self.uncommitted.push(envelope);
        self.current_version = version;
        Ok(())
    }

    /// Run the aggregate's command handler.
    ///
    /// A rejection discards any events the handler applied before refusing.
    /// The instance must not be reused afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::NotReady`] if hydration has not finished,
    /// or the [`AggregateError`] the handler propagated.
    pub fn execute(
        &mut self,
        command: &CommandEnvelope<A::Id, A::Command>,
    ) -> Result<CommandExecutionResult, AggregateError> {
        self.ensure(AggregateStatus::Ready)?;
        match A::handle(self, command) {
            Ok(()) => Ok(CommandExecutionResult::ok_if_changes(
                self.has_changes(),
                self.current_version,
            )),
            Err(HandleError::Rejected(rejected)) => {
                self.uncommitted.clear();
                self.current_version = self.expected_version;
                Ok(CommandExecutionResult::rejected(
                    rejected.reason(),
                    self.expected_version,
                ))
            },
            Err(HandleError::Aggregate(error)) => Err(error),
        }
    }

    /// Aggregate identifier.
    pub const fn id(&self) -> &A::Id {
        &self.id
    }

    /// Stream of this aggregate.
    pub const fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Tenant of this aggregate.
    pub const fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Lifecycle status.
    pub const fn status(&self) -> AggregateStatus {
        self.status
    }

    /// Current state.
    pub const fn state(&self) -> &A::State {
        self.mutator.current()
    }

    /// Version observed when hydration finished.
    pub const fn expected_version(&self) -> Version {
        self.expected_version
    }

    /// Version including uncommitted events.
    pub const fn current_version(&self) -> Version {
        self.current_version
    }

    /// Events applied since hydration.
    pub fn uncommitted_events(&self) -> &[EventEnvelope<A::Id, A::Event>] {
        &self.uncommitted
    }

    /// Whether the current command applied any event.
    pub fn has_changes(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    /// Consume the instance and return its state.
    pub fn into_state(self) -> A::State {
        self.mutator.into_state()
    }

    /// Drain the uncommitted buffer.
    pub fn take_uncommitted(&mut self) -> Uncommitted<A> {
        std::mem::take(&mut self.uncommitted)
    }
}

impl<A: AggregateRoot> fmt::Debug for Aggregate<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregate")
            .field("stream_id", &self.stream_id)
            .field("tenant_id", &self.tenant_id)
            .field("status", &self.status)
            .field("expected_version", &self.expected_version)
            .field("current_version", &self.current_version)
            .field("uncommitted", &self.uncommitted.len())
            .field("state", self.state())
            .finish()
    }
}
