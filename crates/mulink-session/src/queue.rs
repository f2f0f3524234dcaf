//! Event queues, the deferral buffer, and the consumer's drain budget.
//!
//! ```text
//!   read task ──push──▶ session queue ──────────────────────▶ consumer
//!             ──push──▶ WorldOutbox ──▶ world queue ─────────▶ consumer
//!                          │    ▲
//!                 (in transition, entity events)
//!                          ▼    │ replay on completion
//!                       DeferralBuffer
//! ```
//!
//! The queues are unbounded crossbeam channels: the client only pushes and
//! the consumer only pops, and neither side takes a lock to do so.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::{SessionEvent, WorldEvent};

/// Default capacity of the deferral buffer.
pub const DEFAULT_DEFERRAL_CAPACITY: usize = 4096;

// ---------------------------------------------------------------------------
// EventQueues
// ---------------------------------------------------------------------------

/// The two FIFOs between the client and its consumer.
#[derive(Debug, Clone)]
pub struct EventQueues {
    session_tx: Sender<SessionEvent>,
    session_rx: Receiver<SessionEvent>,
    world_tx: Sender<WorldEvent>,
    world_rx: Receiver<WorldEvent>,
}

impl Default for EventQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueues {
    pub fn new() -> Self {
        let (session_tx, session_rx) = crossbeam_channel::unbounded();
        let (world_tx, world_rx) = crossbeam_channel::unbounded();
        Self {
            session_tx,
            session_rx,
            world_tx,
            world_rx,
        }
    }

    pub fn push_session(&self, event: SessionEvent) {
        // Both ends live in `self`, so the channel cannot be disconnected.
        let _ = self.session_tx.send(event);
    }

    pub(crate) fn world_sender(&self) -> Sender<WorldEvent> {
        self.world_tx.clone()
    }

    pub fn try_session(&self) -> Option<SessionEvent> {
        try_pop(&self.session_rx)
    }

    pub fn try_world(&self) -> Option<WorldEvent> {
        try_pop(&self.world_rx)
    }

    /// Pops session events into `f` until the queue is empty or `budget`
    /// runs out. Returns how many were handled.
    pub fn drain_session(&self, budget: &DrainBudget, f: impl FnMut(SessionEvent)) -> usize {
        budget.drain(&self.session_rx, f)
    }

    /// Pops world events into `f` until the queue is empty or `budget`
    /// runs out. Returns how many were handled.
    pub fn drain_world(&self, budget: &DrainBudget, f: impl FnMut(WorldEvent)) -> usize {
        budget.drain(&self.world_rx, f)
    }
}

fn try_pop<T>(rx: &Receiver<T>) -> Option<T> {
    match rx.try_recv() {
        Ok(event) => Some(event),
        Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
    }
}

// ---------------------------------------------------------------------------
// DrainBudget
// ---------------------------------------------------------------------------

/// A per-tick cap on how much of a queue the consumer handles at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainBudget {
    /// Most events handled per call.
    pub max_events: usize,
    /// Wall-clock cap, checked between events.
    pub max_duration: Option<Duration>,
}

impl Default for DrainBudget {
    fn default() -> Self {
        Self {
            max_events: 256,
            max_duration: Some(Duration::from_millis(4)),
        }
    }
}

impl DrainBudget {
    /// A count-only budget.
    pub fn events(max_events: usize) -> Self {
        Self {
            max_events,
            max_duration: None,
        }
    }

    fn drain<T>(&self, rx: &Receiver<T>, mut f: impl FnMut(T)) -> usize {
        let started = Instant::now();
        let mut handled = 0;
        while handled < self.max_events {
            if self.max_duration.is_some_and(|cap| started.elapsed() >= cap) {
                break;
            }
            let Some(event) = try_pop(rx) else { break };
            f(event);
            handled += 1;
        }
        handled
    }
}

// ---------------------------------------------------------------------------
// DeferralBuffer
// ---------------------------------------------------------------------------

/// A bounded FIFO that drops its oldest entry when full.
#[derive(Debug)]
pub struct DeferralBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    evicted: u64,
}

impl<T> DeferralBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(DEFAULT_DEFERRAL_CAPACITY)),
            capacity,
            evicted: 0,
        }
    }

    /// Appends `item`, evicting the oldest one when full. Returns the
    /// evicted item, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.evicted += 1;
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Removes every item, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.items.drain(..)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items dropped for lack of room since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

// ---------------------------------------------------------------------------
// WorldOutbox
// ---------------------------------------------------------------------------

/// The gate in front of the world queue.
///
/// While a map transition is in flight, entity events go to the deferral
/// buffer instead of the queue; everything else passes straight through.
/// Every map change starts a new numbered transition, and only the
/// acknowledgement of that number ends it.
#[derive(Debug)]
pub struct WorldOutbox {
    tx: Sender<WorldEvent>,
    in_transition: bool,
    /// Number of the latest transition. Bumped by every `begin_transition`.
    generation: u64,
    deferred: DeferralBuffer<WorldEvent>,
}

impl WorldOutbox {
    pub fn new(tx: Sender<WorldEvent>, capacity: usize) -> Self {
        Self {
            tx,
            in_transition: false,
            generation: 0,
            deferred: DeferralBuffer::new(capacity),
        }
    }

    pub fn publish(&mut self, event: WorldEvent) {
        if self.in_transition && event.affects_entities() {
            if self.deferred.push(event).is_some() {
                tracing::warn!(
                    capacity = self.deferred.capacity(),
                    evicted = self.deferred.evicted(),
                    "deferral buffer full, dropped oldest world event"
                );
            }
            return;
        }
        let _ = self.tx.send(event);
    }

    /// Starts a new transition, superseding any still open, and returns
    /// its number.
    pub fn begin_transition(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.in_transition = true;
        tracing::debug!(generation = self.generation, "map transition started");
        self.generation
    }

    /// Number of the open transition, if any.
    pub fn transition(&self) -> Option<u64> {
        self.in_transition.then_some(self.generation)
    }

    /// Ends transition `generation` and moves every deferred event to the
    /// queue in arrival order. Returns how many were replayed, or `None`
    /// when `generation` is not the open transition.
    pub fn complete_transition(&mut self, generation: u64) -> Option<usize> {
        if self.transition() != Some(generation) {
            tracing::debug!(
                generation,
                open = ?self.transition(),
                "acknowledgement for a superseded transition"
            );
            return None;
        }
        self.in_transition = false;
        let mut replayed = 0;
        for event in self.deferred.drain() {
            let _ = self.tx.send(event);
            replayed += 1;
        }
        tracing::debug!(generation, replayed, "map transition completed");
        Some(replayed)
    }

    /// Drops the transition and everything it held back.
    pub fn reset(&mut self) {
        self.in_transition = false;
        self.deferred.clear();
    }

    pub fn in_transition(&self) -> bool {
        self.in_transition
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }
}

// =========================================================================
// Tests
// =========================================================================
