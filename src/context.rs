//! Accessing the simulator from inside a [`SimulationObject`](crate::SimulationObject).

use std::cell::RefCell;
use std::rc::Rc;

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::prelude::Distribution;

use crate::component::Id;
use crate::error::SimulationError;
use crate::event::{EventId, EventMessage};
use crate::state::SimulationState;

/// A facade for scheduling events and reading simulation state from inside a component.
///
/// Each registered object is given its own context (via
/// [`Simulator::create_context`](crate::Simulator::create_context)), but all contexts share
/// the same underlying [`SimulationState`] by reference, so the current time one context
/// reports is always the current time every other context reports.
#[derive(Clone)]
pub struct SimulationContext {
    id: Id,
    name: String,
    state: Rc<RefCell<SimulationState>>,
}

impl SimulationContext {
    pub(crate) fn new(id: Id, name: &str, state: Rc<RefCell<SimulationState>>) -> Self {
        Self {
            id,
            name: name.to_owned(),
            state,
        }
    }

    /// Returns the identifier of the object associated with this context.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Returns the name of the object associated with this context.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.state.borrow().time()
    }

    /// Schedules `message` for delivery to `receiver` after `delay` simulation-time units.
    ///
    /// `delay` must be non-negative; `delay == 0.0` is allowed and schedules a
    /// simultaneous event. Fails with [`SimulationError::UndeclaredSentVariant`] if this
    /// object's [`sent_message_variants`](crate::SimulationObject::sent_message_variants)
    /// does not include the runtime type of `message`, or with
    /// [`SimulationError::UnknownReceiver`] if `receiver` is not a registered object.
    pub fn send_event<T>(&self, delay: f64, receiver: Id, message: T) -> Result<EventId, SimulationError>
    where
        T: EventMessage,
    {
        if delay < 0.0 {
            return Err(SimulationError::NegativeDelay(delay));
        }
        self.send_event_at(self.time() + delay, receiver, message)
    }

    /// Schedules `message` for delivery to `receiver` at the absolute simulation time
    /// `receive_time`.
    ///
    /// Fails with [`SimulationError::PastScheduling`] if `receive_time` is strictly before
    /// the current simulation time.
    pub fn send_event_at<T>(&self, receive_time: f64, receiver: Id, message: T) -> Result<EventId, SimulationError>
    where
        T: EventMessage,
    {
        self.state
            .borrow_mut()
            .schedule(self.id, receiver, receive_time, Box::new(message))
    }

    /// Returns the name of a registered object by its identifier.
    ///
    /// Panics if no object with that identifier has ever been registered — this indicates a
    /// stale [`Id`] held past a `reset()`, which is a programming error in the model, not a
    /// recoverable scheduling failure.
    pub fn lookup_name(&self, id: Id) -> String {
        self.state
            .borrow()
            .lookup_name(id)
            .unwrap_or_else(|| panic!("no object registered with id {id}"))
            .to_owned()
    }

    /// Returns a random float in the range `[0, 1)` from the simulation-wide generator.
    pub fn rand(&self) -> f64 {
        self.state.borrow_mut().rand()
    }

    /// Returns a random value in `range` from the simulation-wide generator.
    pub fn gen_range<T, R>(&self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.state.borrow_mut().gen_range(range)
    }

    /// Returns a random value from `dist` using the simulation-wide generator.
    pub fn sample_from_distribution<T, Dist: Distribution<T>>(&self, dist: &Dist) -> T {
        self.state.borrow_mut().sample_from_distribution(dist)
    }

    /// Returns a random alphanumeric string of length `len` from the simulation-wide generator.
    pub fn random_string(&self, len: usize) -> String {
        self.state.borrow_mut().random_string(len)
    }
}
