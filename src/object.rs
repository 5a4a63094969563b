//! The `SimulationObject` base contract: a handler table keyed by message-variant type, plus
//! the registration and lifecycle callbacks every model object implements.

use std::any::TypeId;
use std::collections::HashMap;

use downcast_rs::{impl_downcast, Downcast};

use crate::component::Id;
use crate::context::SimulationContext;
use crate::error::SimulationError;
use crate::event::{EventMessage, ReceivedEvent};

/// The envelope around a typed payload handed to a variant-specific handler registered in a
/// [`HandlerTable`]: everything [`ReceivedEvent`] carries except the (already downcast) message.
pub struct ReceivedEventMeta {
    /// Identifier of the sending object.
    pub sender: Id,
    /// Name of the sending object, resolved at dispatch time for convenience.
    pub sender_name: String,
    /// Time at which the sender scheduled this event.
    pub creation_time: f64,
    /// Time at which this event fires (equal to the simulator's current time during dispatch).
    pub receive_time: f64,
}

type ErasedHandler = Box<dyn Fn(&mut dyn SimulationObject, ReceivedEvent, &SimulationContext) -> Result<(), SimulationError>>;

/// Maps each message-payload type an object can receive to the closure that handles it.
///
/// Built once per concrete type by [`SimulationObject::register_handlers`], an associated
/// function rather than a method — it runs before any instance exists, so a variant missing a
/// handler is a property of the type, not of a particular object. A payload type absent from
/// the table has no entry to find at dispatch time; there is no separate declared-variant list
/// that a handler match arm can silently drift out of sync with.
pub struct HandlerTable {
    handlers: HashMap<TypeId, ErasedHandler>,
}

impl HandlerTable {
    /// Starts an empty table.
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// Registers `f` as the handler for payloads of type `M` delivered to objects of type `T`.
    ///
    /// `f` receives the object downcast to `T`, the message downcast to `M`, the event's
    /// envelope, and the dispatching context.
    pub fn on<T, M, F>(mut self, f: F) -> Self
    where
        T: SimulationObject,
        M: EventMessage,
        F: Fn(&mut T, M, &ReceivedEventMeta, &SimulationContext) -> Result<(), SimulationError> + 'static,
    {
        let type_id = TypeId::of::<M>();
        self.handlers.insert(
            type_id,
            Box::new(move |obj, event, ctx| {
                let ReceivedEvent {
                    sender,
                    sender_name,
                    creation_time,
                    receive_time,
                    message,
                } = event;
                let message = *message
                    .downcast::<M>()
                    .unwrap_or_else(|_| panic!("HandlerTable entry for {} received a mismatched payload", std::any::type_name::<M>()));
                let concrete = obj
                    .downcast_mut::<T>()
                    .unwrap_or_else(|| panic!("HandlerTable entry for {} dispatched to the wrong object type", std::any::type_name::<T>()));
                let meta = ReceivedEventMeta {
                    sender,
                    sender_name,
                    creation_time,
                    receive_time,
                };
                f(concrete, message, &meta, ctx)
            }),
        );
        self
    }

    /// Looks up and invokes the handler registered for `event`'s payload type, if any.
    pub(crate) fn dispatch(
        &self,
        type_id: TypeId,
        obj: &mut dyn SimulationObject,
        event: ReceivedEvent,
        ctx: &SimulationContext,
    ) -> Option<Result<(), SimulationError>> {
        self.handlers.get(&type_id).map(|handler| handler(obj, event, ctx))
    }

    /// Whether a handler is registered for `type_id`.
    pub(crate) fn contains(&self, type_id: &TypeId) -> bool {
        self.handlers.contains_key(type_id)
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A long-lived entity that owns model state, receives events, and can schedule new ones.
///
/// A concrete type implements this trait once per component *kind*; each registered instance
/// is given a unique name and an optional `priority_key` at registration time
/// ([`Simulator::add_object`](crate::Simulator::add_object)). [`sent_message_variants`](Self::sent_message_variants)
/// is the closed set a sender's `send_event` calls are checked against; the symmetric
/// receive-side set is whatever [`register_handlers`](Self::register_handlers) populates,
/// checked by the dispatcher before a handler ever runs.
pub trait SimulationObject: Downcast {
    /// Unique name of this object, matching the name it was registered under.
    fn name(&self) -> &str;

    /// Tiebreaker used ahead of `name` when multiple receivers share an event's `receive_time`
    /// (lower sorts first). Defaults to 0.
    fn priority_key(&self) -> i64 {
        0
    }

    /// The closed set of message variant names this object is declared to emit.
    ///
    /// Checked against every outgoing `send_event`/`send_event_at` call made through this
    /// object's context.
    fn sent_message_variants(&self) -> &'static [&'static str] {
        &[]
    }

    /// Populates `table` with one entry per message-payload type this object can receive,
    /// via repeated calls to [`HandlerTable::on`]. Called once, against the type rather than
    /// an instance, when the object is added to a [`Simulator`](crate::Simulator).
    ///
    /// Objects that only use [`has_batch_handler`](Self::has_batch_handler) can leave this at
    /// its empty default, since [`handle_batch`](Self::handle_batch) bypasses the table
    /// entirely.
    fn register_handlers(_table: HandlerTable) -> HandlerTable
    where
        Self: Sized,
    {
        HandlerTable::new()
    }

    /// Whether simultaneous events addressed to this object should be delivered as one batch
    /// via [`handle_batch`](Self::handle_batch) rather than looked up per event in the handler
    /// table built by [`register_handlers`](Self::register_handlers).
    fn has_batch_handler(&self) -> bool {
        false
    }

    /// Delivers a batch of simultaneous events to this object in one call.
    ///
    /// Only invoked when [`has_batch_handler`](Self::has_batch_handler) returns `true`; bypasses
    /// the handler table, since a batch handler's whole purpose is to see every simultaneous
    /// event together regardless of variant. Any error returned aborts the run; see
    /// [`SimulationError`]. The default panics — it is unreachable unless
    /// [`has_batch_handler`](Self::has_batch_handler) is overridden to return `true` without also
    /// overriding this method.
    fn handle_batch(&mut self, _events: Vec<ReceivedEvent>, _ctx: &SimulationContext) -> Result<(), SimulationError> {
        unreachable!("{} declares has_batch_handler() but does not override handle_batch", self.name())
    }

    /// Called exactly once by the simulator after all objects are registered, before the
    /// first event fires. Typical use: schedule initial events, initialize per-object state.
    fn pre_run_init(&mut self, _ctx: &SimulationContext) -> Result<(), SimulationError> {
        Ok(())
    }

    /// Called once after the run loop halts, regardless of why it halted.
    fn post_run_teardown(&mut self, _ctx: &SimulationContext) {}
}

impl_downcast!(SimulationObject);
