//! The error taxonomy of the simulator: tagged values, never string-only.

use std::fmt;

use crate::component::Id;

/// An error raised by user handler code that is unrelated to scheduling.
///
/// Wraps an arbitrary `std::error::Error` produced inside a handler registered through
/// [`HandlerTable`](crate::HandlerTable) or [`SimulationObject::handle_batch`](crate::SimulationObject::handle_batch);
/// the run aborts and this value is attached to the resulting
/// [`TerminationReason`](crate::simulation::TerminationReason).
pub struct UserHandlerError(pub Box<dyn std::error::Error>);

impl fmt::Debug for UserHandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for UserHandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for UserHandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// Every fatal error the core can raise, tagged rather than string-only.
///
/// Scheduling-time variants ([`Self::UnknownReceiver`], [`Self::UndeclaredSentVariant`],
/// [`Self::NegativeDelay`], [`Self::PastScheduling`]) are returned synchronously from
/// [`SimulationContext::send_event`](crate::SimulationContext::send_event) /
/// `send_event_at` and abort the enclosing handler when propagated with `?`. Dispatch-time
/// variants ([`Self::NoHandlerForVariant`], [`Self::UserHandlerError`]) abort the run and are
/// attached to the returned [`RunSummary`](crate::simulation::RunSummary).
#[derive(thiserror::Error, Debug)]
pub enum SimulationError {
    /// A name was registered more than once.
    #[error("an object named `{0}` is already registered")]
    DuplicateObjectName(String),

    /// `remove_object` (or an internal lookup) referenced a name that is not registered.
    #[error("no object named `{0}` is registered")]
    UnknownObject(String),

    /// `send_event`/`send_event_at` addressed an object id with no registered name.
    #[error("event addressed to unknown receiver id {0}")]
    UnknownReceiver(Id),

    /// The sender's declared send-list does not contain the variant being emitted.
    #[error("`{sender}` emitted undeclared message variant `{variant}`")]
    UndeclaredSentVariant {
        /// Name of the object that attempted to send the message.
        sender: String,
        /// Runtime name of the offending message variant.
        variant: &'static str,
    },

    /// The receiver has no entry for the incoming variant in its handler table, and does not
    /// declare a batch handler either.
    #[error("`{receiver}` has no handler for message variant `{variant}`")]
    NoHandlerForVariant {
        /// Name of the object the event was addressed to.
        receiver: String,
        /// Runtime name of the undeliverable message variant.
        variant: &'static str,
    },

    /// `send_event` was called with a negative delay.
    #[error("negative delay: {0}")]
    NegativeDelay(f64),

    /// `send_event_at` targeted a time strictly before the current simulation time.
    #[error("cannot schedule at time {receive_time}: current time is {now}")]
    PastScheduling {
        /// Current simulation time at the moment of the call.
        now: f64,
        /// The (rejected) requested receive time.
        receive_time: f64,
    },

    /// `run` was called before `initialize`.
    #[error("run() was called before initialize()")]
    NotInitialized,

    /// `run` was called while a run was already in progress (reentrant call).
    #[error("run() was called while a run is already in progress")]
    AlreadyRunning,

    /// A handler raised an application-level error unrelated to scheduling.
    #[error(transparent)]
    UserHandlerError(#[from] UserHandlerError),
}
