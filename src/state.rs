//! Shared mutable simulation state, accessed through [`crate::context::SimulationContext`] and
//! [`crate::simulation::Simulator`] alike.

use std::collections::HashMap;

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::prelude::Distribution;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

use crate::component::Id;
use crate::error::SimulationError;
use crate::event::{message_variant, Event, EventId, EventMessage};
use crate::heap::EventHeap;

/// Epsilon used by callers that need to compare simulation times with tolerance.
pub const EPSILON: f64 = 1e-12;

/// The registry and clock shared by every [`SimulationContext`](crate::SimulationContext)
/// created for a given [`Simulator`](crate::Simulator), plus the pending-event heap.
pub struct SimulationState {
    time: f64,
    next_sequence: EventId,
    rng: Pcg64Mcg,
    heap: EventHeap,
    names: Vec<String>,
    name_to_id: HashMap<String, Id>,
    priorities: Vec<i64>,
    sent_variants: Vec<&'static [&'static str]>,
    event_count: u64,
    profiling: Option<HashMap<Id, u64>>,
}

impl SimulationState {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            time: 0.0,
            next_sequence: 0,
            rng: Pcg64Mcg::seed_from_u64(seed),
            heap: EventHeap::new(),
            names: Vec::new(),
            name_to_id: HashMap::new(),
            priorities: Vec::new(),
            sent_variants: Vec::new(),
            event_count: 0,
            profiling: None,
        }
    }

    pub(crate) fn time(&self) -> f64 {
        self.time
    }

    pub(crate) fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    pub(crate) fn register(&mut self, name: &str) -> Id {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = self.names.len() as Id;
        self.name_to_id.insert(name.to_owned(), id);
        self.names.push(name.to_owned());
        self.priorities.push(0);
        self.sent_variants.push(&[]);
        id
    }

    pub(crate) fn set_priority(&mut self, id: Id, priority: i64) {
        self.priorities[id as usize] = priority;
    }

    pub(crate) fn set_sent_variants(&mut self, id: Id, variants: &'static [&'static str]) {
        self.sent_variants[id as usize] = variants;
    }

    pub(crate) fn lookup_id(&self, name: &str) -> Option<Id> {
        self.name_to_id.get(name).copied()
    }

    pub(crate) fn lookup_name(&self, id: Id) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    pub(crate) fn priority_of(&self, id: Id) -> i64 {
        self.priorities.get(id as usize).copied().unwrap_or(0)
    }

    pub(crate) fn registered_count(&self) -> usize {
        self.names.len()
    }

    /// Schedules `message` from `sender` to `receiver`, firing at `receive_time`.
    ///
    /// Rejects `receive_time` strictly before the current time (no scheduling into the past)
    /// and rejects a message variant absent from the sender's declared send-list.
    pub(crate) fn schedule(
        &mut self,
        sender: Id,
        receiver: Id,
        receive_time: f64,
        message: Box<dyn EventMessage>,
    ) -> Result<EventId, SimulationError> {
        if receive_time < self.time {
            return Err(SimulationError::PastScheduling {
                now: self.time,
                receive_time,
            });
        }
        let receiver_name = self
            .lookup_name(receiver)
            .ok_or(SimulationError::UnknownReceiver(receiver))?
            .to_owned();
        let variant = message_variant(message.as_ref());
        let declared = self.sent_variants.get(sender as usize).copied().unwrap_or(&[]);
        if !declared.contains(&variant) {
            let sender_name = self.lookup_name(sender).unwrap_or("<unknown>").to_owned();
            return Err(SimulationError::UndeclaredSentVariant {
                sender: sender_name,
                variant,
            });
        }

        let sequence_number = self.next_sequence;
        self.next_sequence += 1;
        self.event_count += 1;

        let event = Event {
            sequence_number,
            creation_time: self.time,
            receive_time,
            sender,
            receiver,
            message,
        };
        let priority = self.priority_of(receiver);
        self.heap.push(event, priority, receiver_name);
        Ok(sequence_number)
    }

    pub(crate) fn heap(&self) -> &EventHeap {
        &self.heap
    }

    pub(crate) fn heap_mut(&mut self) -> &mut EventHeap {
        &mut self.heap
    }

    pub(crate) fn next_sequence(&self) -> EventId {
        self.next_sequence
    }

    /// Bumps `next_sequence` so a subsequently scheduled event never reuses `seq`.
    pub(crate) fn ensure_next_sequence_above(&mut self, seq: EventId) {
        if seq >= self.next_sequence {
            self.next_sequence = seq + 1;
        }
    }

    pub(crate) fn reset(&mut self) {
        self.time = 0.0;
        self.next_sequence = 0;
        self.heap.clear();
        self.names.clear();
        self.name_to_id.clear();
        self.priorities.clear();
        self.sent_variants.clear();
        self.event_count = 0;
        self.profiling = None;
    }

    pub(crate) fn event_count(&self) -> u64 {
        self.event_count
    }

    pub(crate) fn enable_profiling(&mut self) {
        self.profiling = Some(HashMap::new());
    }

    pub(crate) fn record_dispatch(&mut self, receiver: Id) {
        if let Some(counts) = self.profiling.as_mut() {
            *counts.entry(receiver).or_insert(0) += 1;
        }
    }

    pub(crate) fn profiling_counts(&self) -> Option<&HashMap<Id, u64>> {
        self.profiling.as_ref()
    }

    pub(crate) fn rand(&mut self) -> f64 {
        self.rng.gen_range(0.0..1.0)
    }

    pub(crate) fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.rng.gen_range(range)
    }

    pub(crate) fn sample_from_distribution<T, Dist: Distribution<T>>(&mut self, dist: &Dist) -> T {
        dist.sample(&mut self.rng)
    }

    pub(crate) fn random_string(&mut self, len: usize) -> String {
        use rand::distributions::Alphanumeric;
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }
}
