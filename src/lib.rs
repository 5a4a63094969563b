//! desim-core is the core of a discrete-event simulation engine: a global event list, a
//! per-object event queue and dispatcher, and the simulator lifecycle that drives them. It
//! deliberately stops there — no process model, no network topology, no built-in metrics. Those
//! belong in libraries built on top of this one.
//!
//! ## Contents
//!
//! - [Basic Concepts](crate#basic-concepts)
//! - [Example](crate#example)
//! - [Ordering and Simultaneous Events](crate#ordering-and-simultaneous-events)
//! - [Errors](crate#errors)
//!
//! ## Basic Concepts
//!
//! A simulation model consists of user-defined _objects_ that emit and receive _events_.
//!
//! **Object.** An object implements [`SimulationObject`] and represents a part of the model with
//! its own internal state and handling logic. Each registered object is assigned a unique
//! [`Id`] used to address events to it. An object accesses simulation time, schedules new
//! events, and draws simulation-wide random numbers via a [`SimulationContext`], which it is
//! typically given at construction time and stores inside itself.
//!
//! **Event.** An event carries a simulation timestamp, the identifiers of its source and
//! destination objects, and a user-defined payload (any type implementing [`EventMessage`]).
//! Events are scheduled with a non-negative delay or an absolute future time relative to the
//! current simulation time and are delivered in that order; once scheduled, an event's time
//! cannot be changed. An object declares the payload variants it may emit
//! ([`SimulationObject::sent_message_variants`]), checked against every outgoing
//! `send_event`/`send_event_at` call. On the receiving side, [`SimulationObject::register_handlers`]
//! builds a [`HandlerTable`] mapping each payload type the object understands to the closure
//! that handles it; the table is built once per object type, so a payload type with no
//! registered handler is something the dispatcher can detect before ever calling into user code.
//!
//! **Simulator.** The [`Simulator`] owns the global event list and the object registry, and
//! drives the model by repeatedly advancing simulation time to the next pending event(s) and
//! invoking the destination object's handler. Because events are consumed in nondecreasing
//! time order, this makes models reproducible given the same random seed and the same sequence
//! of scheduling calls.
//!
//! ## Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use serde::Serialize;
//! use desim_core::{HandlerTable, Id, SimulationContext, SimulationError, SimulationObject, Simulator};
//!
//! #[derive(Clone, Serialize)]
//! struct Request {
//!     sent_at: f64,
//! }
//!
//! #[derive(Clone, Serialize)]
//! struct Response {
//!     request_sent_at: f64,
//! }
//!
//! struct Process {
//!     net_delay: f64,
//!     ctx: SimulationContext,
//! }
//!
//! impl Process {
//!     fn new(net_delay: f64, ctx: SimulationContext) -> Self {
//!         Self { net_delay, ctx }
//!     }
//!
//!     fn send_request(&self, dst: Id) -> Result<(), SimulationError> {
//!         self.ctx.send_event(self.net_delay, dst, Request { sent_at: self.ctx.time() })?;
//!         Ok(())
//!     }
//! }
//!
//! impl SimulationObject for Process {
//!     fn name(&self) -> &str {
//!         self.ctx.name()
//!     }
//!
//!     fn sent_message_variants(&self) -> &'static [&'static str] {
//!         &["Request", "Response"]
//!     }
//!
//!     fn register_handlers(table: HandlerTable) -> HandlerTable {
//!         table
//!             .on::<Self, Request, _>(|this, req, meta, ctx| {
//!                 let proc_delay = ctx.gen_range(0.5..1.0);
//!                 ctx.send_event(proc_delay + this.net_delay, meta.sender, Response { request_sent_at: req.sent_at })?;
//!                 Ok(())
//!             })
//!             .on::<Self, Response, _>(|_this, _resp, _meta, ctx| {
//!                 println!("response at {:.2}", ctx.time());
//!                 Ok(())
//!             })
//!     }
//! }
//!
//! fn main() {
//!     let mut sim = Simulator::new(123);
//!
//!     let proc1_ctx = sim.create_context("proc1");
//!     let proc1 = Rc::new(RefCell::new(Process::new(0.1, proc1_ctx)));
//!     sim.add_object(proc1.clone()).unwrap();
//!
//!     let proc2_ctx = sim.create_context("proc2");
//!     let proc2 = Rc::new(RefCell::new(Process::new(0.1, proc2_ctx)));
//!     let proc2_id = sim.add_object(proc2).unwrap();
//!
//!     sim.initialize().unwrap();
//!     proc1.borrow().send_request(proc2_id).unwrap();
//!     let summary = sim.run(100.0);
//!     println!("stopped at {:.2}: {:?}", summary.final_sim_time, summary.termination_reason);
//! }
//! ```
//!
//! ## Ordering and Simultaneous Events
//!
//! Pending events are ordered by `(receive_time, receiver.priority_key, receiver.name,
//! sequence_number)`. The simulator always advances to the earliest tied group (the
//! "frontier") for a single receiver and delivers every event in it before moving on — it never
//! interleaves delivery to different receivers at the same time. By default each event in a
//! frontier is looked up in the receiver's [`HandlerTable`] and delivered one at a time, in
//! order of `(sender.priority_key, sender.name, sequence_number)`; an object can instead opt
//! into [`SimulationObject::has_batch_handler`] to receive the whole frontier in one
//! [`SimulationObject::handle_batch`] call, bypassing the table entirely.
//!
//! ## Errors
//!
//! Scheduling calls ([`SimulationContext::send_event`], [`SimulationContext::send_event_at`])
//! return a [`Result`] whose `?`-propagation aborts the enclosing handler the way any other
//! fallible call would. Dispatch-time failures — an undeliverable variant, or a handler
//! returning an error — abort the run outright; [`Simulator::run`] always returns a
//! [`RunSummary`] rather than a `Result`, recording the failure in
//! [`RunSummary::termination_reason`].

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod component;
pub mod context;
pub mod error;
pub mod event;
mod heap;
pub mod logging;
pub mod object;
pub mod simulation;
mod state;

pub use colored;
pub use component::Id;
pub use context::SimulationContext;
pub use error::{SimulationError, UserHandlerError};
pub use event::{Event, EventId, EventMessage, ReceivedEvent};
pub use object::{HandlerTable, ReceivedEventMeta, SimulationObject};
pub use simulation::{EventSummary, RunSummary, Simulator, TerminationReason};
pub use state::EPSILON;
