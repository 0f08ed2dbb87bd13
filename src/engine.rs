//! Engine regime state machine.
//!
//! The controller decides when ignition runs at all. It watches the decoder for a
//! cranking engine, keeps one event in flight per channel while the engine turns, and
//! drops back to `Off` when the crank slows below the stall threshold.
//!
//! ```text
//!        is_cranking            rpm > running
//!  Off ──────────────► Cranking ─────────────► Running
//!   ▲                     │                       │
//!   └──── rpm < stall ────┴────── rpm < stall ────┘
//! ```

use crate::config::EngineThresholds;
use crate::error::Fault;
use crate::ignition::ChannelSet;
use crate::shared::EcuShared;
use crate::timer::{MicrosClock, elapsed};
use crate::trigger::TriggerDecoder;

/// Operating regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum EngineState {
    /// Stopped or not yet synced. No events are requested.
    #[default]
    Off,
    /// Turning over on the starter.
    Cranking,
    /// Running on its own.
    Running,
}

/// Top-level controller driving the scheduler's channel requests.
#[derive(Debug)]
pub struct EngineController<'a, CLK, const Q: usize> {
    shared: &'a EcuShared<Q>,
    clock: CLK,
    thresholds: EngineThresholds,
    state: EngineState,
    outstanding: ChannelSet,
    waiting_since: u32,
    last_rpm: f32,
}

impl<'a, CLK: MicrosClock, const Q: usize> EngineController<'a, CLK, Q> {
    /// Creates a controller in `Off` with nothing outstanding.
    pub fn new(shared: &'a EcuShared<Q>, clock: CLK, thresholds: EngineThresholds) -> Self {
        Self {
            shared,
            clock,
            thresholds,
            state: EngineState::Off,
            outstanding: ChannelSet::EMPTY,
            waiting_since: 0,
            last_rpm: 0.0,
        }
    }

    /// Runs one iteration of the state machine. Never blocks.
    ///
    /// A latched fault forces `Off` and is returned as the error.
    pub fn step(&mut self) -> Result<EngineState, Fault> {
        if let Some(fault) = self.shared.fault() {
            self.transition(EngineState::Off);
            return Err(fault);
        }
        let result = match self.state {
            EngineState::Off => {
                self.idle();
                Ok(())
            }
            EngineState::Cranking | EngineState::Running => self.turn(),
        };
        if let Err(fault) = result {
            self.transition(EngineState::Off);
            return Err(fault);
        }
        Ok(self.state)
    }

    fn idle(&mut self) {
        let stale = self.shared.take_completions();
        self.outstanding = self.outstanding.difference(stale);
        if !self.shared.with_decoder(TriggerDecoder::is_cranking) {
            return;
        }
        let request = ChannelSet::ALL.difference(self.outstanding);
        self.outstanding = self.outstanding.union(request);
        self.shared.request(request);
        self.waiting_since = self.clock.now_micros();
        self.transition(EngineState::Cranking);
    }

    fn turn(&mut self) -> Result<(), Fault> {
        let completed = self.shared.take_completions();
        let now = self.clock.now_micros();
        if completed.is_empty() {
            let waited_us = elapsed(now, self.waiting_since);
            if waited_us > self.thresholds.completion_timeout_us {
                return Err(self.shared.raise_fault(Fault::CompletionTimeout { waited_us }));
            }
            return Ok(());
        }

        self.waiting_since = now;
        self.outstanding = self.outstanding.union(completed);
        self.shared.request(completed);

        let rpm = self.shared.with_decoder(TriggerDecoder::rpm).unwrap_or(0.0);
        self.last_rpm = rpm;
        match self.state {
            EngineState::Cranking if rpm > self.thresholds.running_rpm => {
                self.transition(EngineState::Running)
            }
            EngineState::Cranking | EngineState::Running if rpm < self.thresholds.stall_rpm => {
                self.transition(EngineState::Off)
            }
            _ => {}
        }
        Ok(())
    }

    fn transition(&mut self, next: EngineState) {
        if next != self.state {
            info!("engine {:?} -> {:?} at {} rpm", self.state, next, self.last_rpm);
            self.state = next;
        }
    }

    /// Current regime.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Channels with an event requested, armed or in flight.
    pub fn outstanding(&self) -> ChannelSet {
        self.outstanding
    }

    /// RPM read at the last completion, 0 when the decoder was not trusted.
    pub fn last_rpm(&self) -> f32 {
        self.last_rpm
    }
}
