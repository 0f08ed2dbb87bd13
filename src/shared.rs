//! State shared between interrupts and tasks.
//!
//! [`EcuShared`] is the single owner of everything that crosses a context boundary:
//! the edge queue, the decoder, the request and completion bits and the fault latch.
//! Every accessor locks through `critical_section::with` for exactly as long as it needs,
//! so callers never hold a lock across a call into another subsystem.
//!
//! It is built in `const` context so it can live in a `static`:
//!
//! ```rust
//! use ecu_core::config::TriggerConfig;
//! use ecu_core::shared::EcuShared;
//!
//! static ECU: EcuShared = EcuShared::new(TriggerConfig::DEFAULT);
//!
//! assert_eq!(ECU.dropped_events(), 0);
//! assert!(ECU.fault().is_none());
//! ```

use core::cell::{Cell, RefCell};
use core::fmt;

use critical_section::Mutex;
use heapless::Deque;

use crate::config::TriggerConfig;
use crate::consts::EVENT_QUEUE_LEN;
use crate::error::{CaptureError, Fault};
use crate::ignition::ChannelSet;
use crate::trigger::{TriggerDecoder, TriggerEvent};

/// Cross-context state for one engine.
///
/// `Q` is the capacity of the edge queue.
pub struct EcuShared<const Q: usize = EVENT_QUEUE_LEN> {
    events: Mutex<RefCell<Deque<TriggerEvent, Q>>>,
    dropped: Mutex<Cell<u32>>,
    decoder: Mutex<RefCell<TriggerDecoder>>,
    requests: Mutex<Cell<ChannelSet>>,
    completions: Mutex<Cell<ChannelSet>>,
    fault: Mutex<Cell<Option<Fault>>>,
}

impl<const Q: usize> EcuShared<Q> {
    /// Creates empty shared state around an unsynchronized decoder.
    pub const fn new(config: TriggerConfig) -> Self {
        Self {
            events: Mutex::new(RefCell::new(Deque::new())),
            dropped: Mutex::new(Cell::new(0)),
            decoder: Mutex::new(RefCell::new(TriggerDecoder::new(config))),
            requests: Mutex::new(Cell::new(ChannelSet::EMPTY)),
            completions: Mutex::new(Cell::new(ChannelSet::EMPTY)),
            fault: Mutex::new(Cell::new(None)),
        }
    }

    /// Queues an edge for the decoder task. Never blocks.
    ///
    /// When the queue is full the edge is dropped and counted.
    pub fn push_event(&self, event: TriggerEvent) -> Result<(), CaptureError> {
        critical_section::with(|cs| {
            if self.events.borrow(cs).borrow_mut().push_back(event).is_ok() {
                return Ok(());
            }
            let dropped = self.dropped.borrow(cs);
            dropped.set(dropped.get().saturating_add(1));
            warn!(
                "edge queue full, dropped {:?} edge at {} ({} total)",
                event.line,
                event.timestamp,
                dropped.get()
            );
            Err(CaptureError::QueueFull)
        })
    }

    /// Takes the oldest queued edge.
    pub fn pop_event(&self) -> Option<TriggerEvent> {
        critical_section::with(|cs| self.events.borrow(cs).borrow_mut().pop_front())
    }

    /// Number of edges waiting for the decoder task.
    pub fn queued_events(&self) -> usize {
        critical_section::with(|cs| self.events.borrow(cs).borrow().len())
    }

    /// Edges dropped on a full queue since startup. Saturates.
    pub fn dropped_events(&self) -> u32 {
        critical_section::with(|cs| self.dropped.borrow(cs).get())
    }

    /// Runs `f` against the decoder under one lock.
    pub fn with_decoder<R>(&self, f: impl FnOnce(&TriggerDecoder) -> R) -> R {
        critical_section::with(|cs| f(&*self.decoder.borrow(cs).borrow()))
    }

    /// Runs `f` against the decoder mutably under one lock.
    pub fn with_decoder_mut<R>(&self, f: impl FnOnce(&mut TriggerDecoder) -> R) -> R {
        critical_section::with(|cs| f(&mut *self.decoder.borrow(cs).borrow_mut()))
    }

    /// The decoder calibration.
    pub fn trigger_config(&self) -> TriggerConfig {
        self.with_decoder(|decoder| *decoder.config())
    }

    /// Asks the scheduler to compute the next event for `channels`.
    pub fn request(&self, channels: ChannelSet) {
        critical_section::with(|cs| {
            let requests = self.requests.borrow(cs);
            requests.set(requests.get().union(channels));
        });
    }

    /// Takes and clears the pending request bits.
    pub fn take_requests(&self) -> ChannelSet {
        critical_section::with(|cs| self.requests.borrow(cs).replace(ChannelSet::EMPTY))
    }

    /// Request bits not yet taken by the scheduler.
    pub fn pending_requests(&self) -> ChannelSet {
        critical_section::with(|cs| self.requests.borrow(cs).get())
    }

    /// Marks `channels` as done with their current event, fired or skipped.
    pub fn signal_completion(&self, channels: ChannelSet) {
        critical_section::with(|cs| {
            let completions = self.completions.borrow(cs);
            completions.set(completions.get().union(channels));
        });
    }

    /// Takes and clears the completion bits.
    pub fn take_completions(&self) -> ChannelSet {
        critical_section::with(|cs| self.completions.borrow(cs).replace(ChannelSet::EMPTY))
    }

    /// Completion bits not yet taken by the engine controller.
    pub fn pending_completions(&self) -> ChannelSet {
        critical_section::with(|cs| self.completions.borrow(cs).get())
    }

    /// Latches `fault` unless one is already latched, and returns the latched fault.
    pub fn raise_fault(&self, fault: Fault) -> Fault {
        critical_section::with(|cs| {
            let latch = self.fault.borrow(cs);
            match latch.get() {
                Some(first) => first,
                None => {
                    error!("fault raised: {}", fault);
                    latch.set(Some(fault));
                    fault
                }
            }
        })
    }

    /// The latched fault, if any.
    pub fn fault(&self) -> Option<Fault> {
        critical_section::with(|cs| self.fault.borrow(cs).get())
    }
}

impl<const Q: usize> fmt::Debug for EcuShared<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcuShared")
            .field("queued_events", &self.queued_events())
            .field("dropped_events", &self.dropped_events())
            .field("requests", &self.pending_requests())
            .field("completions", &self.pending_completions())
            .field("fault", &self.fault())
            .finish_non_exhaustive()
    }
}
