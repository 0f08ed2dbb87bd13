#![allow(dead_code)]

//! Discrete-event engine simulator shared by the integration tests.
//!
//! Simulated time is a 64-bit microsecond count; the counter the crate sees is its low 32
//! bits offset by an origin, so a run can be started just before the counter wraps. Edge
//! and compare interrupts are dispatched at their exact due time, ahead of the tasks.
//! Every task round that reports work costs one microsecond; an idle round jumps
//! straight to the next interrupt.

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

use ecu_core::config::{EngineThresholds, IgnitionCalibration, TriggerConfig};
use ecu_core::consts::{EVENT_QUEUE_LEN, IGNITION_CHANNELS};
use ecu_core::engine::EngineState;
use ecu_core::error::Fault;
use ecu_core::ignition::{
    CoilPins, CompareOutcome, IgnitionChannel, IgnitionSchedule, IgnitionSlot, ScheduleStatus,
};
use ecu_core::runtime::EcuTasks;
use ecu_core::shared::EcuShared;
use ecu_core::timer::{
    CaptureSlot, CompareTimer, MicrosClock, global_capture_init, global_capture_setup,
    global_compare_match, global_edge_isr, global_ignition_init, global_ignition_setup,
};
use ecu_core::trigger::SensorLine;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

/// One cycle of the reference wheel: angle, line, primary level, secondary level.
pub const WHEEL: [(f64, SensorLine, bool, bool); 12] = [
    (105.0, SensorLine::Primary, true, false),
    (175.0, SensorLine::Primary, false, false),
    (230.0, SensorLine::Secondary, false, true),
    (285.0, SensorLine::Primary, true, true),
    (355.0, SensorLine::Primary, false, true),
    (410.0, SensorLine::Secondary, false, false),
    (465.0, SensorLine::Primary, true, false),
    (535.0, SensorLine::Primary, false, false),
    (590.0, SensorLine::Secondary, false, true),
    (635.0, SensorLine::Primary, true, true),
    (675.0, SensorLine::Secondary, true, false),
    (715.0, SensorLine::Primary, false, false),
];

/// Counter value at simulated time zero, half a second before the counter wraps.
pub const NEAR_WRAP: u32 = u32::MAX - 500_000;

pub fn us_per_degree(rpm: f64) -> f64 {
    60_000_000.0 / (rpm * 360.0)
}

/// Signed distance from `target` to `angle` on the 720° cycle, in `[-360, 360)`.
pub fn angle_error(angle: f64, target: f64) -> f64 {
    (angle - target + 360.0).rem_euclid(720.0) - 360.0
}

#[derive(Debug, Clone)]
pub struct SimClock {
    now: Rc<Cell<u64>>,
    origin: u32,
}

impl SimClock {
    pub fn new(origin: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
            origin,
        }
    }

    pub fn now(&self) -> u64 {
        self.now.get()
    }

    pub fn set(&self, t: u64) {
        self.now.set(t);
    }

    /// Counter value at simulated time `t`.
    pub fn counter_at(&self, t: u64) -> u32 {
        self.origin.wrapping_add(t as u32)
    }
}

impl MicrosClock for SimClock {
    fn now_micros(&self) -> u32 {
        self.counter_at(self.now())
    }
}

/// A digital line backed by a shared cell; readable as an input, drivable as an output.
#[derive(Debug, Clone, Default)]
pub struct SimPin(Rc<Cell<bool>>);

impl SimPin {
    pub fn level(&self) -> bool {
        self.0.get()
    }

    pub fn drive(&self, high: bool) {
        self.0.set(high);
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.get())
    }
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set(true);
        Ok(())
    }
}

/// Four one-shot compare registers, shared with the simulator.
#[derive(Debug, Clone, Default)]
pub struct SimCompare {
    armed: Rc<RefCell<[Option<u32>; IGNITION_CHANNELS]>>,
}

impl SimCompare {
    pub fn armed(&self) -> [Option<u32>; IGNITION_CHANNELS] {
        *self.armed.borrow()
    }

    /// Clears the register of a channel that just matched.
    fn matched(&self, channel: IgnitionChannel) {
        self.armed.borrow_mut()[channel.index()] = None;
    }
}

impl CompareTimer for SimCompare {
    fn arm(&mut self, channel: IgnitionChannel, deadline: u32) {
        self.armed.borrow_mut()[channel.index()] = Some(deadline);
    }

    fn disarm(&mut self, channel: IgnitionChannel) {
        self.armed.borrow_mut()[channel.index()] = None;
    }
}

pub type SimCoils = CoilPins<SimPin>;
pub type Tasks<'a> = EcuTasks<'a, SimClock, SimCompare, SimCoils, SimPin, EVENT_QUEUE_LEN>;

/// The hardware side of one simulated ECU.
pub struct Rig {
    pub clock: SimClock,
    pub compare: SimCompare,
    pub shared: EcuShared,
    pub ignition: IgnitionSlot<SimCompare, SimCoils>,
    pub capture: CaptureSlot<SimClock, SimPin, SimPin>,
    pub primary: SimPin,
    pub secondary: SimPin,
    pub coils: [SimPin; IGNITION_CHANNELS],
    pub marker: SimPin,
}

impl Rig {
    pub fn new(origin: u32) -> Self {
        Self::with_config(origin, TriggerConfig::DEFAULT)
    }

    pub fn with_config(origin: u32, config: TriggerConfig) -> Self {
        let rig = Self {
            clock: SimClock::new(origin),
            compare: SimCompare::default(),
            shared: EcuShared::new(config),
            ignition: global_ignition_init(),
            capture: global_capture_init(),
            primary: SimPin::default(),
            secondary: SimPin::default(),
            coils: Default::default(),
            marker: SimPin::default(),
        };
        global_ignition_setup(
            &rig.ignition,
            rig.compare.clone(),
            CoilPins::new(rig.coils.clone(), None),
        );
        global_capture_setup(
            &rig.capture,
            rig.clock.clone(),
            rig.primary.clone(),
            rig.secondary.clone(),
        );
        rig
    }

    pub fn tasks(&self, thresholds: EngineThresholds) -> Tasks<'_> {
        EcuTasks::new(
            &self.shared,
            &self.ignition,
            self.clock.clone(),
            IgnitionCalibration::DEFAULT,
            thresholds,
            Some(self.marker.clone()),
        )
        .unwrap()
    }

    pub fn schedule(&self, channel: IgnitionChannel) -> IgnitionSchedule {
        critical_section::with(|cs| {
            self.ignition
                .borrow(cs)
                .borrow()
                .as_ref()
                .unwrap()
                .schedule(channel)
        })
    }

    pub fn status(&self, channel: IgnitionChannel) -> ScheduleStatus {
        self.schedule(channel).status
    }

    /// Simulated time at which the counter next reads `counter`, from `now` on.
    pub fn time_of(&self, counter: u32, now: u64) -> u64 {
        now + u64::from(counter.wrapping_sub(self.clock.counter_at(now)))
    }

    pub fn armed(&self) -> [Option<u32>; IGNITION_CHANNELS] {
        self.compare.armed()
    }

    pub fn coil_levels(&self) -> [bool; IGNITION_CHANNELS] {
        self.coils.each_ref().map(SimPin::level)
    }
}

/// A crank/cam wheel turning at a settable speed.
#[derive(Debug, Clone)]
pub struct Wheel {
    next: usize,
    next_time: f64,
    us_per_degree: f64,
    last_angle: f64,
    last_time: f64,
    glitch: Option<usize>,
    emitted: usize,
}

impl Wheel {
    /// A wheel whose first edge is `WHEEL[first_edge]`, arriving at `first_time`.
    pub fn new(rpm: f64, first_edge: usize, first_time: u64) -> Self {
        let upd = us_per_degree(rpm);
        let previous = (first_edge + WHEEL.len() - 1) % WHEEL.len();
        Self {
            next: first_edge % WHEEL.len(),
            next_time: first_time as f64,
            us_per_degree: upd,
            last_angle: WHEEL[previous].0,
            last_time: first_time as f64 - gap(previous) * upd,
            glitch: None,
            emitted: 0,
        }
    }

    /// Takes effect from the edge after the next one.
    pub fn set_rpm(&mut self, rpm: f64) {
        self.us_per_degree = us_per_degree(rpm);
    }

    /// Corrupts the paired-line level seen by the edge `n` edges after the next one.
    pub fn glitch_in(&mut self, n: usize) {
        self.glitch = Some(self.emitted + n);
    }

    pub fn next_time(&self) -> u64 {
        self.next_time.round() as u64
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Engine angle at simulated time `t`, assuming the speed has not changed since the
    /// last edge.
    pub fn angle_at(&self, t: u64) -> f64 {
        (self.last_angle + (t as f64 - self.last_time) / self.us_per_degree).rem_euclid(720.0)
    }

    /// Moves the lines for the next edge and returns the line that moved.
    fn step(&mut self, primary: &SimPin, secondary: &SimPin) -> SensorLine {
        let (angle, line, p, s) = WHEEL[self.next];
        let glitched = self.glitch == Some(self.emitted);
        primary.drive(p != (glitched && line == SensorLine::Secondary));
        secondary.drive(s != (glitched && line == SensorLine::Primary));
        self.last_angle = angle;
        self.last_time = self.next_time;
        self.next_time += gap(self.next) * self.us_per_degree;
        self.next = (self.next + 1) % WHEEL.len();
        self.emitted += 1;
        line
    }

    /// Restores the true line levels after a glitched edge has been captured.
    fn settle(&self, primary: &SimPin, secondary: &SimPin) {
        let last = (self.next + WHEEL.len() - 1) % WHEEL.len();
        let (_, _, p, s) = WHEEL[last];
        primary.drive(p);
        secondary.drive(s);
    }
}

/// Degrees from `WHEEL[index]` to the edge after it.
fn gap(index: usize) -> f64 {
    let from = WHEEL[index].0;
    let to = WHEEL[(index + 1) % WHEEL.len()].0;
    (to - from).rem_euclid(720.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Firing {
    pub channel: IgnitionChannel,
    pub dwell_start: u64,
    pub fire: u64,
    pub fire_angle: f64,
}

#[derive(Debug, Default)]
pub struct Trace {
    pub firings: Vec<Firing>,
    /// Dwell starts that arrived after their fire deadline.
    pub skipped: Vec<(u64, IgnitionChannel)>,
    pub states: Vec<(u64, EngineState)>,
    pub fault: Option<Fault>,
    pub marker_rises: Vec<f64>,
    pub busy_rounds: u64,
}

impl Trace {
    pub fn last_state(&self) -> EngineState {
        self.states.last().map_or(EngineState::Off, |&(_, s)| s)
    }

    pub fn reached(&self, state: EngineState) -> bool {
        self.states.iter().any(|&(_, s)| s == state)
    }

    pub fn firings_of(&self, channel: IgnitionChannel) -> impl Iterator<Item = &Firing> {
        self.firings.iter().filter(move |f| f.channel == channel)
    }
}

/// Drives a [`Rig`] and its tasks through simulated time.
pub struct Sim<'r> {
    pub rig: &'r Rig,
    pub wheel: Option<Wheel>,
    pub trace: Trace,
    /// Compare interrupts are lost while set.
    pub mute_compare: bool,
    dwell_started: [Option<u64>; IGNITION_CHANNELS],
    marker_level: bool,
}

impl<'r> Sim<'r> {
    pub fn new(rig: &'r Rig, wheel: Option<Wheel>) -> Self {
        Self {
            rig,
            wheel,
            trace: Trace::default(),
            mute_compare: false,
            dwell_started: [None; IGNITION_CHANNELS],
            marker_level: false,
        }
    }

    fn next_compare(&self) -> Option<(u64, IgnitionChannel)> {
        if self.mute_compare {
            return None;
        }
        let now = self.rig.clock.now();
        let counter = self.rig.clock.counter_at(now);
        self.rig
            .armed()
            .iter()
            .enumerate()
            .filter_map(|(i, deadline)| {
                let ahead = (*deadline)?.wrapping_sub(counter);
                // A deadline behind the counter already latched its flag; the interrupt is late.
                let due = if ahead < 1 << 31 { now + u64::from(ahead) } else { now };
                Some((due, IgnitionChannel::from_index(i)?))
            })
            .min_by_key(|&(due, _)| due)
    }

    /// Delivers a compare interrupt for `channel` now, as the hardware would.
    pub fn compare_isr(&mut self, channel: IgnitionChannel) -> Result<CompareOutcome, Fault> {
        self.rig.compare.matched(channel);
        let now = self.rig.clock.now();
        let result = global_compare_match(
            &self.rig.ignition,
            &self.rig.shared,
            &self.rig.clock,
            channel,
        );
        match result {
            Ok(CompareOutcome::DwellStarted) => {
                assert!(self.rig.coils[channel.index()].level(), "{:?} not energized", channel);
                self.dwell_started[channel.index()] = Some(now);
            }
            Ok(CompareOutcome::Fired) => {
                assert!(!self.rig.coils[channel.index()].level(), "{:?} still energized", channel);
                let dwell_start = self.dwell_started[channel.index()].take().unwrap_or(now);
                let fire_angle = self.wheel.as_ref().map_or(f64::NAN, |w| w.angle_at(now));
                self.trace.firings.push(Firing {
                    channel,
                    dwell_start,
                    fire: now,
                    fire_angle,
                });
            }
            Ok(CompareOutcome::Skipped) => {
                assert!(!self.rig.coils[channel.index()].level(), "{:?} energized", channel);
                self.trace.skipped.push((now, channel));
            }
            Err(_) => {}
        }
        result
    }

    /// Delivers the wheel's next edge now, wherever its due time is.
    pub fn deliver_edge(&mut self) {
        let Some(wheel) = self.wheel.as_mut() else {
            return;
        };
        let line = wheel.step(&self.rig.primary, &self.rig.secondary);
        let _ = global_edge_isr(&self.rig.capture, &self.rig.shared, line);
        wheel.settle(&self.rig.primary, &self.rig.secondary);
    }

    fn record(&mut self, tasks: &Tasks<'_>) {
        let now = self.rig.clock.now();
        let state = tasks.state();
        if self.trace.last_state() != state || self.trace.states.is_empty() {
            self.trace.states.push((now, state));
        }
        let level = self.rig.marker.level();
        if level && !self.marker_level {
            let angle = self.wheel.as_ref().map_or(f64::NAN, |w| w.angle_at(now));
            self.trace.marker_rises.push(angle);
        }
        self.marker_level = level;
    }

    /// Runs until simulated time `until` or a fault, whichever comes first.
    pub fn run_until(&mut self, tasks: &mut Tasks<'_>, until: u64) {
        let clock = self.rig.clock.clone();
        while clock.now() < until && self.trace.fault.is_none() {
            let now = clock.now();
            let compare = self.next_compare();
            if let Some((due, channel)) = compare {
                if due <= now {
                    let _ = self.compare_isr(channel);
                    continue;
                }
            }
            let edge = self.wheel.as_ref().map(Wheel::next_time);
            if let Some(due) = edge {
                if due <= now {
                    self.deliver_edge();
                    continue;
                }
            }

            match tasks.poll() {
                Ok(true) => {
                    self.trace.busy_rounds += 1;
                    clock.set(now + 1);
                }
                Ok(false) => {
                    let next = [compare.map(|(due, _)| due), edge, Some(until)]
                        .into_iter()
                        .flatten()
                        .min()
                        .unwrap_or(until);
                    clock.set(next.max(now + 1));
                }
                Err(fault) => self.trace.fault = Some(fault),
            }
            self.record(tasks);
        }
    }
}
