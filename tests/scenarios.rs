//! End-to-end scenarios exercising the run loop, dispatcher, and error taxonomy together.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;

use desim_core::{
    HandlerTable, Id, ReceivedEvent, SimulationContext, SimulationError, SimulationObject, Simulator, TerminationReason,
};

#[derive(Clone, Serialize)]
struct Ping;

#[derive(Clone, Serialize)]
struct Tick;

#[derive(Clone, Serialize)]
struct X;

struct Pinger {
    ctx: SimulationContext,
    delay: f64,
}

impl SimulationObject for Pinger {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn sent_message_variants(&self) -> &'static [&'static str] {
        &["Ping"]
    }

    fn register_handlers(table: HandlerTable) -> HandlerTable {
        table.on::<Self, Ping, _>(|this, _ping, _meta, ctx| {
            ctx.send_event(this.delay, ctx.id(), Ping)?;
            Ok(())
        })
    }

    fn pre_run_init(&mut self, ctx: &SimulationContext) -> Result<(), SimulationError> {
        ctx.send_event(self.delay, ctx.id(), Ping)?;
        Ok(())
    }
}

#[test]
fn single_self_ping() {
    let mut sim = Simulator::new(1);
    let ctx = sim.create_context("pinger");
    let pinger = Rc::new(RefCell::new(Pinger { ctx, delay: 6.0 }));
    sim.add_object(pinger).unwrap();

    sim.initialize().unwrap();
    let summary = sim.run(25.0);

    assert_eq!(summary.num_events, 4);
    assert_eq!(summary.final_sim_time, 24.0);
    assert_eq!(summary.termination_reason, TerminationReason::MaxTimeReached);
}

struct RingNode {
    ctx: SimulationContext,
    next: Id,
    kick_off: bool,
}

impl SimulationObject for RingNode {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn sent_message_variants(&self) -> &'static [&'static str] {
        &["Tick"]
    }

    fn register_handlers(table: HandlerTable) -> HandlerTable {
        table.on::<Self, Tick, _>(|this, _tick, _meta, ctx| {
            ctx.send_event(1.0, this.next, Tick)?;
            Ok(())
        })
    }

    fn pre_run_init(&mut self, ctx: &SimulationContext) -> Result<(), SimulationError> {
        if self.kick_off {
            ctx.send_event(1.0, self.next, Tick)?;
        }
        Ok(())
    }
}

#[test]
fn cyclic_ring_of_four() {
    const N: usize = 4;
    let mut sim = Simulator::new(1);
    let ctxs: Vec<SimulationContext> = (0..N).map(|i| sim.create_context(format!("node{i}"))).collect();
    let ids: Vec<Id> = ctxs.iter().map(|c| c.id()).collect();

    for (i, ctx) in ctxs.into_iter().enumerate() {
        let next = ids[(i + 1) % N];
        let node = Rc::new(RefCell::new(RingNode {
            ctx,
            next,
            kick_off: true,
        }));
        sim.add_object(node).unwrap();
    }

    sim.initialize().unwrap();
    let summary = sim.run(10.0);

    assert_eq!(summary.num_events, (N as u64) * 10);
    assert_eq!(summary.final_sim_time, 10.0);
    assert_eq!(summary.termination_reason, TerminationReason::MaxTimeReached);
}

struct BatchCollector {
    ctx: SimulationContext,
    log: Rc<RefCell<Vec<(String, usize)>>>,
}

impl SimulationObject for BatchCollector {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn has_batch_handler(&self) -> bool {
        true
    }

    fn handle_batch(&mut self, events: Vec<ReceivedEvent>, _ctx: &SimulationContext) -> Result<(), SimulationError> {
        self.log.borrow_mut().push(("batch".to_owned(), events.len()));
        for event in &events {
            self.log.borrow_mut().push((event.sender_name.clone(), 0));
        }
        Ok(())
    }
}

struct Sender {
    ctx: SimulationContext,
    target: Id,
}

impl SimulationObject for Sender {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn sent_message_variants(&self) -> &'static [&'static str] {
        &["X"]
    }

    fn pre_run_init(&mut self, ctx: &SimulationContext) -> Result<(), SimulationError> {
        ctx.send_event_at(5.0, self.target, X)?;
        Ok(())
    }
}

#[test]
fn simultaneous_at_one_receiver_with_batch_handler() {
    let mut sim = Simulator::new(1);
    let c_ctx = sim.create_context("C");
    let log = Rc::new(RefCell::new(Vec::new()));
    let c = Rc::new(RefCell::new(BatchCollector {
        ctx: c_ctx,
        log: log.clone(),
    }));
    let c_id = sim.add_object(c).unwrap();

    let a_ctx = sim.create_context("A");
    let a = Rc::new(RefCell::new(Sender { ctx: a_ctx, target: c_id }));
    sim.add_object(a).unwrap();

    let b_ctx = sim.create_context("B");
    let b = Rc::new(RefCell::new(Sender { ctx: b_ctx, target: c_id }));
    sim.add_object(b).unwrap();

    sim.initialize().unwrap();
    let summary = sim.run(10.0);

    assert_eq!(summary.num_events, 2);
    let recorded = log.borrow();
    assert_eq!(recorded[0], ("batch".to_owned(), 2));
    assert_eq!(recorded[1].0, "A");
    assert_eq!(recorded[2].0, "B");
}

struct PerVariantCollector {
    ctx: SimulationContext,
    log: Rc<RefCell<Vec<(String, f64)>>>,
}

impl SimulationObject for PerVariantCollector {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn register_handlers(table: HandlerTable) -> HandlerTable {
        table.on::<Self, X, _>(|this, _x, meta, ctx| {
            this.log.borrow_mut().push((meta.sender_name.clone(), ctx.time()));
            Ok(())
        })
    }
}

#[test]
fn simultaneous_at_one_receiver_without_batch_handler() {
    let mut sim = Simulator::new(1);
    let c_ctx = sim.create_context("C");
    let log = Rc::new(RefCell::new(Vec::new()));
    let c = Rc::new(RefCell::new(PerVariantCollector {
        ctx: c_ctx,
        log: log.clone(),
    }));
    let c_id = sim.add_object(c).unwrap();

    let a_ctx = sim.create_context("A");
    let a = Rc::new(RefCell::new(Sender { ctx: a_ctx, target: c_id }));
    sim.add_object(a).unwrap();

    let b_ctx = sim.create_context("B");
    let b = Rc::new(RefCell::new(Sender { ctx: b_ctx, target: c_id }));
    sim.add_object(b).unwrap();

    sim.initialize().unwrap();
    let summary = sim.run(10.0);

    assert_eq!(summary.num_events, 2);
    let recorded = log.borrow();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0], ("A".to_owned(), 5.0));
    assert_eq!(recorded[1], ("B".to_owned(), 5.0));
}

struct CountingNode {
    ctx: SimulationContext,
    next: Id,
    kick_off: bool,
    counter: Rc<Cell<u32>>,
}

impl SimulationObject for CountingNode {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn sent_message_variants(&self) -> &'static [&'static str] {
        &["Tick"]
    }

    fn register_handlers(table: HandlerTable) -> HandlerTable {
        table.on::<Self, Tick, _>(|this, _tick, _meta, ctx| {
            this.counter.set(this.counter.get() + 1);
            ctx.send_event(1.0, this.next, Tick)?;
            Ok(())
        })
    }

    fn pre_run_init(&mut self, ctx: &SimulationContext) -> Result<(), SimulationError> {
        if self.kick_off {
            ctx.send_event(1.0, self.next, Tick)?;
        }
        Ok(())
    }
}

#[test]
fn stop_condition_halts_ring() {
    let mut sim = Simulator::new(1);
    let counter = Rc::new(Cell::new(0u32));

    let ctx0 = sim.create_context("node0");
    let ctx1 = sim.create_context("node1");
    let id0 = ctx0.id();
    let id1 = ctx1.id();

    let node0 = Rc::new(RefCell::new(CountingNode {
        ctx: ctx0,
        next: id1,
        kick_off: true,
        counter: counter.clone(),
    }));
    sim.add_object(node0).unwrap();

    let node1 = Rc::new(RefCell::new(CountingNode {
        ctx: ctx1,
        next: id0,
        kick_off: false,
        counter: counter.clone(),
    }));
    sim.add_object(node1).unwrap();

    let stop_counter = counter.clone();
    sim.set_stop_condition(move || stop_counter.get() >= 3);

    sim.initialize().unwrap();
    let summary = sim.run(100.0);

    assert_eq!(summary.termination_reason, TerminationReason::StopCondition);
    assert_eq!(summary.num_events, 3);
    assert_eq!(summary.final_sim_time, 3.0);
}

struct UndeclaredSender {
    ctx: SimulationContext,
    target: Id,
}

impl SimulationObject for UndeclaredSender {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    // Declares nothing, but `pre_run_init` still tries to send `X`.
    fn sent_message_variants(&self) -> &'static [&'static str] {
        &[]
    }

    fn pre_run_init(&mut self, ctx: &SimulationContext) -> Result<(), SimulationError> {
        ctx.send_event(1.0, self.target, X)?;
        Ok(())
    }
}

struct Idle {
    ctx: SimulationContext,
}

impl SimulationObject for Idle {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn register_handlers(table: HandlerTable) -> HandlerTable {
        table.on::<Self, X, _>(|_this, _x, _meta, _ctx| Ok(()))
    }
}

#[test]
fn undeclared_variant_aborts_cleanly() {
    let mut sim = Simulator::new(1);
    let b_ctx = sim.create_context("B");
    let b = Rc::new(RefCell::new(Idle { ctx: b_ctx }));
    let b_id = sim.add_object(b).unwrap();

    let a_ctx = sim.create_context("A");
    let a = Rc::new(RefCell::new(UndeclaredSender { ctx: a_ctx, target: b_id }));
    sim.add_object(a).unwrap();

    let result = sim.initialize();
    assert!(matches!(result, Err(SimulationError::UndeclaredSentVariant { ref sender, variant }) if sender == "A" && variant == "X"));
    assert_eq!(sim.event_count(), 0);
}
