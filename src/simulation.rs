//! Simulator configuration and execution: registration, the run loop, stepped execution, and
//! frontier dispatch.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use log::{debug, trace};
use serde_json::json;

use crate::component::Id;
use crate::context::SimulationContext;
use crate::error::SimulationError;
use crate::event::{message_variant, Event, ReceivedEvent};
use crate::logging::get_colored;
use crate::object::{HandlerTable, SimulationObject};
use crate::state::SimulationState;

/// Why a [`Simulator::run`] call stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationReason {
    /// The next pending event's time exceeded the `max_time` passed to `run`.
    MaxTimeReached,
    /// The configured stop condition, or a call to [`Simulator::request_stop`], returned true
    /// before the next frontier was drained.
    StopCondition,
    /// The event heap became empty.
    NoEvents,
    /// A fatal error aborted the run; see [`SimulationError`] for the taxonomy.
    Error(String),
}

/// Identifies the event a dispatch-time error occurred while delivering.
#[derive(Debug, Clone)]
pub struct EventSummary {
    /// Name of the object that scheduled the offending event.
    pub sender: String,
    /// Name of the object the offending event was addressed to.
    pub receiver: String,
    /// Runtime name of the offending event's message variant.
    pub variant: &'static str,
    /// The event's `receive_time`.
    pub receive_time: f64,
}

/// The record returned by [`Simulator::run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Number of handler invocations, counting one batch-handler call as the size of its batch.
    pub num_events: u64,
    /// Wall-clock time `run` was called.
    pub start_wall_time: SystemTime,
    /// Wall-clock time `run` returned.
    pub end_wall_time: SystemTime,
    /// `end_wall_time - start_wall_time`.
    pub duration: Duration,
    /// The simulation time of the last event dispatched (or the time the run started at, if
    /// none were dispatched).
    pub final_sim_time: f64,
    /// Why the run stopped.
    pub termination_reason: TerminationReason,
    /// The event being delivered when a fatal dispatch error occurred, if any.
    pub offending_event: Option<EventSummary>,
    /// Per-object dispatch counts, present only if [`Simulator::enable_profiling`] was called.
    pub per_object_event_counts: Option<HashMap<Id, u64>>,
}

/// Owns the global event list, the registered objects, and the run loop.
pub struct Simulator {
    state: Rc<RefCell<SimulationState>>,
    objects: Vec<Option<Rc<RefCell<dyn SimulationObject>>>>,
    handler_tables: Vec<Option<HandlerTable>>,
    dispatched_count: u64,
    initialized: bool,
    running: bool,
    request_stop: Cell<bool>,
    stop_condition: Option<Box<dyn FnMut() -> bool>>,
    offending_event: Option<EventSummary>,
}

impl Simulator {
    /// Creates a new simulator with the given random seed (used only by the ambient RNG
    /// exposed through [`SimulationContext`]; it has no bearing on event ordering).
    pub fn new(seed: u64) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimulationState::new(seed))),
            objects: Vec::new(),
            handler_tables: Vec::new(),
            dispatched_count: 0,
            initialized: false,
            running: false,
            request_stop: Cell::new(false),
            stop_condition: None,
            offending_event: None,
        }
    }

    fn ensure_capacity(&mut self, id: Id) {
        if self.objects.len() <= id as usize {
            self.objects.resize_with(id as usize + 1, || None);
            self.handler_tables.resize_with(id as usize + 1, || None);
        }
    }

    /// Creates a context for a component named `name`, to be embedded in it before it is
    /// wrapped and passed to [`add_object`](Self::add_object).
    pub fn create_context<S: AsRef<str>>(&mut self, name: S) -> SimulationContext {
        let id = self.state.borrow_mut().register(name.as_ref());
        self.ensure_capacity(id);
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] created context: {}",
            self.current_time(),
            get_colored("DEBUG", colored::Color::Blue),
            json!({"name": name.as_ref(), "id": id})
        );
        SimulationContext::new(id, name.as_ref(), self.state.clone())
    }

    /// Registers `handler`'s declared priority, send-list and handler table, and adds it to
    /// the simulator.
    ///
    /// The handler table is built once from `T::register_handlers`, against the type rather
    /// than this particular instance. If a context was already created for this name, the
    /// same [`Id`] is reused. Fails with [`SimulationError::DuplicateObjectName`] if a handler
    /// is already registered under this name.
    pub fn add_object<T>(&mut self, handler: Rc<RefCell<T>>) -> Result<Id, SimulationError>
    where
        T: SimulationObject + 'static,
    {
        let (name, priority, sent_variants) = {
            let obj = handler.borrow();
            (obj.name().to_owned(), obj.priority_key(), obj.sent_message_variants())
        };
        {
            let state = self.state.borrow();
            if let Some(existing) = state.lookup_id(&name) {
                if self.objects.get(existing as usize).and_then(Option::as_ref).is_some() {
                    return Err(SimulationError::DuplicateObjectName(name));
                }
            }
        }
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.register(&name);
            state.set_priority(id, priority);
            state.set_sent_variants(id, sent_variants);
            id
        };
        self.ensure_capacity(id);
        self.objects[id as usize] = Some(handler as Rc<RefCell<dyn SimulationObject>>);
        self.handler_tables[id as usize] = Some(T::register_handlers(HandlerTable::new()));
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] added object: {}",
            self.current_time(),
            get_colored("DEBUG", colored::Color::Blue),
            json!({"name": name, "id": id, "priority_key": priority})
        );
        Ok(id)
    }

    /// Calls [`add_object`](Self::add_object) for each handler in `objects`, in order.
    pub fn add_objects<T, I>(&mut self, objects: I) -> Result<Vec<Id>, SimulationError>
    where
        T: SimulationObject + 'static,
        I: IntoIterator<Item = Rc<RefCell<T>>>,
    {
        objects.into_iter().map(|obj| self.add_object(obj)).collect()
    }

    /// Unregisters the object named `name`. Its [`Id`] is not reused; events still pending for
    /// it at dispatch time fail with [`SimulationError::UnknownReceiver`], the same error
    /// raised for an `Id` that was never registered.
    pub fn remove_object<S: AsRef<str>>(&mut self, name: S) -> Result<(), SimulationError> {
        let name = name.as_ref();
        let id = self
            .state
            .borrow()
            .lookup_id(name)
            .ok_or_else(|| SimulationError::UnknownObject(name.to_owned()))?;
        if self.objects.get(id as usize).and_then(Option::as_ref).is_none() {
            return Err(SimulationError::UnknownObject(name.to_owned()));
        }
        self.objects[id as usize] = None;
        self.handler_tables[id as usize] = None;
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] removed object: {}",
            self.current_time(),
            get_colored("DEBUG", colored::Color::Blue),
            json!({"name": name, "id": id})
        );
        Ok(())
    }

    /// Returns the current simulation time.
    pub fn current_time(&self) -> f64 {
        self.state.borrow().time()
    }

    /// Returns the number of events created so far (including any later cancelled or
    /// undispatched at reset), for diagnostics.
    pub fn event_count(&self) -> u64 {
        self.state.borrow().event_count()
    }

    /// Installs a predicate consulted before every frontier is drained; see
    /// [`TerminationReason::StopCondition`].
    pub fn set_stop_condition<F>(&mut self, predicate: F)
    where
        F: FnMut() -> bool + 'static,
    {
        self.stop_condition = Some(Box::new(predicate));
    }

    /// Sets the cooperative cancellation flag, checked at the same points as the stop
    /// condition. Takes effect starting at the next frontier boundary.
    pub fn request_stop(&self) {
        self.request_stop.set(true);
    }

    /// Enables per-object dispatch counts in the next [`RunSummary`].
    pub fn enable_profiling(&mut self) {
        self.state.borrow_mut().enable_profiling();
    }

    /// Calls `pre_run_init` on every registered object, in registration order.
    ///
    /// Idempotent: a second call before [`reset`](Self::reset) is a no-op. Must be called
    /// before [`run`](Self::run).
    pub fn initialize(&mut self) -> Result<(), SimulationError> {
        if self.initialized {
            return Ok(());
        }
        for id in 0..self.objects.len() as Id {
            let Some(obj_rc) = self.objects[id as usize].clone() else {
                continue;
            };
            let name = self
                .state
                .borrow()
                .lookup_name(id)
                .expect("registered object must have a name")
                .to_owned();
            let ctx = SimulationContext::new(id, &name, self.state.clone());
            obj_rc.borrow_mut().pre_run_init(&ctx)?;
        }
        self.initialized = true;
        Ok(())
    }

    /// Runs the simulation until the heap empties, the next event exceeds `max_time`, or the
    /// stop condition (or [`request_stop`](Self::request_stop)) fires — whichever comes first.
    ///
    /// The stop condition is evaluated *before* advancing `current_time` to the next event, so
    /// on a clean stop the final simulation time is the last time actually dispatched.
    pub fn run(&mut self, max_time: f64) -> RunSummary {
        let start_wall_time = SystemTime::now();
        if !self.initialized {
            return self.abort(SimulationError::NotInitialized, start_wall_time);
        }
        if self.running {
            return self.abort(SimulationError::AlreadyRunning, start_wall_time);
        }
        self.running = true;
        self.request_stop.set(false);
        self.offending_event = None;

        let termination = loop {
            let next_time = self.state.borrow().heap().peek_time();
            let Some(t) = next_time else {
                break TerminationReason::NoEvents;
            };
            if t > max_time {
                break TerminationReason::MaxTimeReached;
            }
            if self.request_stop.get() {
                break TerminationReason::StopCondition;
            }
            if let Some(predicate) = self.stop_condition.as_mut() {
                if predicate() {
                    break TerminationReason::StopCondition;
                }
            }
            if let Err(err) = self.advance_one_frontier() {
                break TerminationReason::Error(err.to_string());
            }
        };

        self.running = false;
        for id in 0..self.objects.len() as Id {
            if let Some(obj_rc) = self.objects[id as usize].clone() {
                let name = self.state.borrow().lookup_name(id).unwrap_or_default().to_owned();
                let ctx = SimulationContext::new(id, &name, self.state.clone());
                obj_rc.borrow_mut().post_run_teardown(&ctx);
            }
        }

        let end_wall_time = SystemTime::now();
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] run finished: {}",
            self.current_time(),
            get_colored("DEBUG", colored::Color::Blue),
            json!({"termination_reason": format!("{termination:?}"), "num_events": self.dispatched_count})
        );
        RunSummary {
            num_events: self.dispatched_count,
            start_wall_time,
            end_wall_time,
            duration: end_wall_time.duration_since(start_wall_time).unwrap_or_default(),
            final_sim_time: self.current_time(),
            termination_reason: termination,
            offending_event: self.offending_event.take(),
            per_object_event_counts: self.state.borrow().profiling_counts().cloned(),
        }
    }

    /// Advances to the next pending frontier and dispatches it, ignoring `max_time` and the
    /// stop condition. Returns `Ok(true)` if a frontier was dispatched, `Ok(false)` if the
    /// heap was already empty. `run` is built from repeated calls to this, interleaved with
    /// its own termination checks.
    pub fn step(&mut self) -> Result<bool, SimulationError> {
        if self.state.borrow().heap().peek_time().is_none() {
            return Ok(false);
        }
        self.advance_one_frontier()?;
        Ok(true)
    }

    /// Calls [`step`](Self::step) up to `n` times, stopping early if the heap empties.
    /// Returns the number of frontiers actually dispatched.
    pub fn steps(&mut self, n: usize) -> Result<usize, SimulationError> {
        for i in 0..n {
            if !self.step()? {
                return Ok(i);
            }
        }
        Ok(n)
    }

    /// Calls [`step`](Self::step) until the next pending event's time would exceed
    /// `current_time() + duration`, or the heap empties.
    pub fn step_for_duration(&mut self, duration: f64) -> Result<(), SimulationError> {
        let deadline = self.current_time() + duration;
        loop {
            let Some(t) = self.state.borrow().heap().peek_time() else {
                return Ok(());
            };
            if t > deadline {
                return Ok(());
            }
            self.advance_one_frontier()?;
        }
    }

    /// Calls [`step`](Self::step) until the heap empties.
    pub fn step_until_no_events(&mut self) -> Result<(), SimulationError> {
        while self.step()? {}
        Ok(())
    }

    fn advance_one_frontier(&mut self) -> Result<(), SimulationError> {
        let t = self
            .state
            .borrow()
            .heap()
            .peek_time()
            .expect("caller already checked the heap is non-empty");
        self.state.borrow_mut().set_time(t);
        let frontier = self.state.borrow_mut().heap_mut().pop_frontier();
        self.dispatch_frontier(frontier)
    }

    fn abort(&self, error: SimulationError, start_wall_time: SystemTime) -> RunSummary {
        let end_wall_time = SystemTime::now();
        RunSummary {
            num_events: self.dispatched_count,
            start_wall_time,
            end_wall_time,
            duration: end_wall_time.duration_since(start_wall_time).unwrap_or_default(),
            final_sim_time: self.current_time(),
            termination_reason: TerminationReason::Error(error.to_string()),
            offending_event: None,
            per_object_event_counts: self.state.borrow().profiling_counts().cloned(),
        }
    }

    /// Drains the heap in pop order for checkpointing, handing the caller the live events
    /// directly. A caller that wants a serialized form can do so itself — `Event::message` is
    /// already `erased_serde::Serialize` — but this crate has no opinion on the wire format, so
    /// it hands back exactly the type [`restore_heap`](Self::restore_heap) consumes.
    pub fn snapshot_heap(&mut self) -> Vec<Event> {
        self.state.borrow_mut().heap_mut().drain_ordered()
    }

    /// Rebuilds the heap from events produced by the caller (typically a prior
    /// [`snapshot_heap`](Self::snapshot_heap) call, round-tripped through storage and handed
    /// back unchanged). Sequence numbers are preserved verbatim; `next_sequence` is advanced
    /// past the highest one restored so freshly scheduled events never collide with a
    /// restored one.
    pub fn restore_heap(&mut self, events: Vec<Event>) {
        let mut state = self.state.borrow_mut();
        for event in events {
            let priority = state.priority_of(event.receiver);
            let receiver_name = state.lookup_name(event.receiver).unwrap_or("").to_owned();
            state.ensure_next_sequence_above(event.sequence_number);
            state.heap_mut().push(event, priority, receiver_name);
        }
    }

    /// Discards the heap and all object registrations, resetting the clock so the simulator
    /// can be reused for a new model.
    pub fn reset(&mut self) {
        self.state.borrow_mut().reset();
        self.objects.clear();
        self.handler_tables.clear();
        self.dispatched_count = 0;
        self.initialized = false;
        self.running = false;
        self.request_stop.set(false);
        self.stop_condition = None;
        self.offending_event = None;
    }

    fn dispatch_frontier(&mut self, mut frontier: Vec<Event>) -> Result<(), SimulationError> {
        if frontier.is_empty() {
            return Ok(());
        }
        let receiver = frontier[0].receiver;
        let obj_rc = self
            .objects
            .get(receiver as usize)
            .and_then(Option::clone)
            .ok_or(SimulationError::UnknownReceiver(receiver))?;

        {
            let state = self.state.borrow();
            frontier.sort_by(|a, b| {
                let pa = state.priority_of(a.sender);
                let pb = state.priority_of(b.sender);
                pa.cmp(&pb)
                    .then_with(|| {
                        let na = state.lookup_name(a.sender).unwrap_or("");
                        let nb = state.lookup_name(b.sender).unwrap_or("");
                        na.cmp(nb)
                    })
                    .then_with(|| a.sequence_number.cmp(&b.sequence_number))
            });
        }

        let receiver_name = self
            .state
            .borrow()
            .lookup_name(receiver)
            .expect("receiver was just resolved to a live object")
            .to_owned();
        let ctx = SimulationContext::new(receiver, &receiver_name, self.state.clone());

        let has_batch = obj_rc.borrow().has_batch_handler();
        let count = frontier.len() as u64;

        let mut received = Vec::with_capacity(frontier.len());
        for event in frontier {
            let variant = message_variant(event.message.as_ref());
            let sender_name = self.state.borrow().lookup_name(event.sender).unwrap_or("").to_owned();
            if log::log_enabled!(log::Level::Trace) {
                trace!(
                    target: &receiver_name,
                    "[{:.3} {} {}] {}",
                    event.receive_time,
                    get_colored("EVENT", colored::Color::BrightBlack),
                    receiver_name,
                    json!({"variant": variant, "src": sender_name})
                );
            }
            received.push(ReceivedEvent {
                sender: event.sender,
                sender_name,
                creation_time: event.creation_time,
                receive_time: event.receive_time,
                message: event.message,
            });
        }

        let mut obj = obj_rc.borrow_mut();
        if has_batch {
            if let Some(first) = received.first() {
                self.offending_event = Some(EventSummary {
                    sender: first.sender_name.clone(),
                    receiver: receiver_name.clone(),
                    variant: first.variant(),
                    receive_time: first.receive_time,
                });
            }
            obj.handle_batch(received, &ctx)?;
        } else {
            let table = self.handler_tables[receiver as usize]
                .as_ref()
                .expect("receiver was just resolved to a live object");
            for event in received {
                let type_id = event.message.as_ref().as_any().type_id();
                self.offending_event = Some(EventSummary {
                    sender: event.sender_name.clone(),
                    receiver: receiver_name.clone(),
                    variant: event.variant(),
                    receive_time: event.receive_time,
                });
                if !table.contains(&type_id) {
                    return Err(SimulationError::NoHandlerForVariant {
                        receiver: receiver_name,
                        variant: event.variant(),
                    });
                }
                table
                    .dispatch(type_id, &mut *obj, event, &ctx)
                    .expect("membership was just checked above")?;
            }
        }
        drop(obj);

        self.dispatched_count += count;
        for _ in 0..count {
            self.state.borrow_mut().record_dispatch(receiver);
        }
        self.offending_event = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde::Serialize;

    use super::*;
    use crate::object::HandlerTable;

    #[derive(Clone, Serialize)]
    struct Tick;

    struct Ticker {
        ctx: SimulationContext,
        period: f64,
        remaining: u32,
        fired: Rc<Cell<u32>>,
    }

    impl SimulationObject for Ticker {
        fn name(&self) -> &str {
            self.ctx.name()
        }

        fn sent_message_variants(&self) -> &'static [&'static str] {
            &["Tick"]
        }

        fn register_handlers(table: HandlerTable) -> HandlerTable {
            table.on::<Self, Tick, _>(|this, _tick, _meta, ctx| {
                this.fired.set(this.fired.get() + 1);
                if this.remaining > 0 {
                    this.remaining -= 1;
                    ctx.send_event(this.period, ctx.id(), Tick)?;
                }
                Ok(())
            })
        }

        fn pre_run_init(&mut self, ctx: &SimulationContext) -> Result<(), SimulationError> {
            ctx.send_event(self.period, ctx.id(), Tick)?;
            Ok(())
        }
    }

    fn ticking_sim(ticks: u32) -> (Simulator, Rc<Cell<u32>>) {
        let mut sim = Simulator::new(7);
        let fired = Rc::new(Cell::new(0));
        let ctx = sim.create_context("ticker");
        let ticker = Rc::new(RefCell::new(Ticker {
            ctx,
            period: 1.0,
            remaining: ticks - 1,
            fired: fired.clone(),
        }));
        sim.add_object(ticker).unwrap();
        sim.initialize().unwrap();
        (sim, fired)
    }

    #[test]
    fn step_dispatches_a_single_frontier() {
        let _ = env_logger::try_init();
        let (mut sim, fired) = ticking_sim(5);

        assert!(sim.step().unwrap());
        assert_eq!(fired.get(), 1);
        assert_eq!(sim.current_time(), 1.0);

        assert!(sim.step().unwrap());
        assert_eq!(fired.get(), 2);
        assert_eq!(sim.current_time(), 2.0);
    }

    #[test]
    fn step_returns_false_once_heap_is_empty() {
        let _ = env_logger::try_init();
        let (mut sim, fired) = ticking_sim(1);

        assert!(sim.step().unwrap());
        assert_eq!(fired.get(), 1);
        assert!(!sim.step().unwrap());
        assert!(!sim.step().unwrap());
    }

    #[test]
    fn steps_stops_early_when_the_heap_runs_dry() {
        let _ = env_logger::try_init();
        let (mut sim, fired) = ticking_sim(3);

        let dispatched = sim.steps(10).unwrap();
        assert_eq!(dispatched, 3);
        assert_eq!(fired.get(), 3);

        assert_eq!(sim.steps(1).unwrap(), 0);
    }

    #[test]
    fn step_for_duration_stops_at_the_deadline_without_consuming_past_it() {
        let _ = env_logger::try_init();
        let (mut sim, fired) = ticking_sim(10);

        sim.step_for_duration(3.5).unwrap();
        assert_eq!(fired.get(), 3);
        assert_eq!(sim.current_time(), 3.0);

        sim.step_for_duration(2.0).unwrap();
        assert_eq!(fired.get(), 5);
        assert_eq!(sim.current_time(), 5.0);
    }

    #[test]
    fn step_until_no_events_drains_the_whole_heap() {
        let _ = env_logger::try_init();
        let (mut sim, fired) = ticking_sim(6);

        sim.step_until_no_events().unwrap();
        assert_eq!(fired.get(), 6);
        assert_eq!(sim.current_time(), 6.0);
        assert!(sim.step().unwrap() == false);
    }

    #[test]
    fn snapshot_and_restore_round_trip_pending_events() {
        let _ = env_logger::try_init();
        let (mut sim, fired) = ticking_sim(5);

        // Drain one tick, then checkpoint everything still pending.
        sim.step().unwrap();
        assert_eq!(fired.get(), 1);

        let snapshot = sim.snapshot_heap();
        assert_eq!(snapshot.len(), 1);
        let sequence_before = snapshot[0].sequence_number;

        sim.restore_heap(snapshot);

        sim.step_until_no_events().unwrap();
        assert_eq!(fired.get(), 5);
        assert_eq!(sim.current_time(), 5.0);

        // A freshly scheduled event must not reuse a sequence number handed back by the
        // snapshot, even though the heap was fully drained and repopulated in between.
        assert!(sim.event_count() > sequence_before);
    }

    #[test]
    fn profiling_counts_dispatches_per_object() {
        let _ = env_logger::try_init();
        let mut sim = Simulator::new(7);
        sim.enable_profiling();
        let fired = Rc::new(Cell::new(0));
        let ctx = sim.create_context("ticker");
        let id = ctx.id();
        let ticker = Rc::new(RefCell::new(Ticker {
            ctx,
            period: 1.0,
            remaining: 3,
            fired: fired.clone(),
        }));
        sim.add_object(ticker).unwrap();
        sim.initialize().unwrap();

        let summary = sim.run(100.0);

        assert_eq!(summary.num_events, 4);
        let counts = summary.per_object_event_counts.expect("profiling was enabled");
        assert_eq!(counts.get(&id).copied(), Some(4));
    }
}
