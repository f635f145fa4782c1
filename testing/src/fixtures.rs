//! Fixture aggregates shared by the workspace's tests and demos.
//!
//! - [`Sequence`]: an append-only list of numbers, stream ids `seq-<n>`
//! - [`BankAccount`]: open, deposit, withdraw and close, with no-op and
//!   rejection rules

use eventloom_core::aggregate::{Aggregate, AggregateRoot, HandleError};
use eventloom_core::command::{CommandEnvelope, CommandRejected};
use eventloom_core::event::Event;
use eventloom_core::mutator::StateMutator;
use eventloom_core::type_registry::TypeTag;
use serde::{Deserialize, Serialize};

/// Numbers appended to a sequence, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceState {
    /// Every item added since the last clear.
    pub items: Vec<u32>,
    /// Sum of every item ever added, clears included.
    pub lifetime_total: u64,
}

/// Events of a [`Sequence`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceEvent {
    /// One item was appended.
    ItemAdded(u32),
    /// Every item was dropped.
    Cleared,
}

impl Event for SequenceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::ItemAdded(_) => "ItemAdded.v1",
            Self::Cleared => "Cleared.v1",
        }
    }
}

/// Commands of a [`Sequence`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SequenceCommand {
    /// Append each value as its own event.
    Add(Vec<u32>),
    /// Drop every item; a no-op on an empty sequence.
    Clear,
}

/// Append-only sequence of numbers.
#[derive(Debug)]
pub struct Sequence;

impl SequenceState {
    fn on_item_added(event: &SequenceEvent, mut state: Self) -> Self {
        if let SequenceEvent::ItemAdded(value) = event {
            state.items.push(*value);
            state.lifetime_total += u64::from(*value);
        }
        state
    }

    fn on_cleared(_: &SequenceEvent, mut state: Self) -> Self {
        state.items.clear();
        state
    }
}

impl AggregateRoot for Sequence {
    type Id = u64;
    type State = SequenceState;
    type Event = SequenceEvent;
    type Command = SequenceCommand;

    const AGGREGATE_TYPE: &'static str = "seq";
    const TYPE_TAG: TypeTag = TypeTag::new(1);

    fn mutator() -> StateMutator<SequenceState, SequenceEvent> {
        StateMutator::new(SequenceState::default())
            .register("ItemAdded.v1", SequenceState::on_item_added)
            .register("Cleared.v1", SequenceState::on_cleared)
    }

    fn handle(
        sequence: &mut Aggregate<Self>,
        command: &CommandEnvelope<u64, SequenceCommand>,
    ) -> Result<(), HandleError> {
        match command.payload() {
            SequenceCommand::Add(values) => {
                for value in values {
                    sequence.apply(command, SequenceEvent::ItemAdded(*value))?;
                }
            },
            SequenceCommand::Clear => {
                if !sequence.state().items.is_empty() {
                    sequence.apply(command, SequenceEvent::Cleared)?;
                }
            },
        }
        Ok(())
    }
}

eventloom_core::uuid_identifier! {
    /// Identifier of a bank account.
    pub struct AccountId;
}

/// Balance and lifecycle of a bank account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Account holder, once opened.
    pub owner: Option<String>,
    /// Current balance in cents.
    pub balance: u64,
    /// Whether the account was closed.
    pub closed: bool,
}

impl AccountState {
    /// Whether the account accepts money movements.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.owner.is_some() && !self.closed
    }

    fn on_opened(event: &AccountEvent, mut state: Self) -> Self {
        if let AccountEvent::Opened { owner } = event {
            state.owner = Some(owner.clone());
        }
        state
    }

    fn on_deposited(event: &AccountEvent, mut state: Self) -> Self {
        if let AccountEvent::Deposited { amount } = event {
            state.balance += amount;
        }
        state
    }

    fn on_withdrawn(event: &AccountEvent, mut state: Self) -> Self {
        if let AccountEvent::Withdrawn { amount } = event {
            state.balance -= amount;
        }
        state
    }

    fn on_closed(_: &AccountEvent, mut state: Self) -> Self {
        state.closed = true;
        state
    }
}

/// Events of a [`BankAccount`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEvent {
    /// The account was opened.
    Opened {
        /// Account holder.
        owner: String,
    },
    /// Money was deposited.
    Deposited {
        /// Amount in cents.
        amount: u64,
    },
    /// Money was withdrawn.
    Withdrawn {
        /// Amount in cents.
        amount: u64,
    },
    /// The account was closed.
    Closed,
}

impl Event for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Opened { .. } => "AccountOpened.v1",
            Self::Deposited { .. } => "FundsDeposited.v1",
            Self::Withdrawn { .. } => "FundsWithdrawn.v1",
            Self::Closed => "AccountClosed.v1",
        }
    }
}

/// Commands of a [`BankAccount`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountCommand {
    /// Open the account; a no-op if already open.
    Open {
        /// Account holder.
        owner: String,
    },
    /// Deposit a positive amount.
    Deposit {
        /// Amount in cents.
        amount: u64,
    },
    /// Withdraw; a no-op when funds are insufficient.
    Withdraw {
        /// Amount in cents.
        amount: u64,
    },
    /// Close the account; a no-op if already closed.
    Close,
}

/// Bank account aggregate.
#[derive(Debug)]
pub struct BankAccount;

impl AggregateRoot for BankAccount {
    type Id = AccountId;
    type State = AccountState;
    type Event = AccountEvent;
    type Command = AccountCommand;

    const AGGREGATE_TYPE: &'static str = "account";
    const TYPE_TAG: TypeTag = TypeTag::new(2);

    fn mutator() -> StateMutator<AccountState, AccountEvent> {
        StateMutator::new(AccountState::default())
            .register("AccountOpened.v1", AccountState::on_opened)
            .register("FundsDeposited.v1", AccountState::on_deposited)
            .register("FundsWithdrawn.v1", AccountState::on_withdrawn)
            .register("AccountClosed.v1", AccountState::on_closed)
    }

    fn handle(
        account: &mut Aggregate<Self>,
        command: &CommandEnvelope<AccountId, AccountCommand>,
    ) -> Result<(), HandleError> {
        let state = account.state();
        match command.payload() {
            AccountCommand::Open { owner } => {
                if state.owner.is_none() {
                    account.apply(command, AccountEvent::Opened { owner: owner.clone() })?;
                }
            },
            AccountCommand::Deposit { amount } => {
                if *amount == 0 {
                    return Err(CommandRejected::new("deposit must be positive").into());
                }
                if !state.is_active() {
                    return Err(CommandRejected::new("account is not active").into());
                }
                account.apply(command, AccountEvent::Deposited { amount: *amount })?;
            },
            AccountCommand::Withdraw { amount } => {
                if !state.is_active() {
                    return Err(CommandRejected::new("account is not active").into());
                }
                if *amount > 0 && *amount <= state.balance {
                    account.apply(command, AccountEvent::Withdrawn { amount: *amount })?;
                }
            },
            AccountCommand::Close => {
                if state.owner.is_some() && !state.closed {
                    account.apply(command, AccountEvent::Closed)?;
                }
            },
        }
        Ok(())
    }
}
