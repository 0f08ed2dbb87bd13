//! Crank/cam trigger decoding.
//!
//! Edge handling is split across two contexts:
//! - [`EdgeCapture`] runs in the edge interrupt. It timestamps the edge, samples both
//!   lines and pushes a [`TriggerEvent`] onto the bounded queue in
//!   [`crate::shared::EcuShared`]. Nothing is interpreted there.
//! - [`DecoderTask`] runs in task context. It pops events one at a time and feeds them to
//!   the [`TriggerDecoder`] state machine, which tracks sync and edge history.
//!
//! Timing queries (`rpm`, `current_angle`, `timing`, ...) live on [`TriggerDecoder`] and
//! are reached through [`crate::shared::EcuShared::with_decoder`], so every read happens
//! under one lock.

mod capture;
mod decoder;
mod task;

pub use capture::*;
pub use decoder::*;
pub use task::*;

/// Which sensor produced an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SensorLine {
    /// Crank sensor, 8 edges per cycle.
    Primary,
    /// Cam sensor, 4 edges per cycle.
    Secondary,
}

/// Direction of a transition, classified from the level read right after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Edge {
    /// LOW → HIGH.
    Rise,
    /// HIGH → LOW.
    Fall,
}

impl Edge {
    /// Classifies an edge from the level the line settled at.
    pub const fn from_level(high: bool) -> Self {
        if high { Edge::Rise } else { Edge::Fall }
    }
}

/// Both line levels sampled at capture time (`true` = HIGH).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct LineLevels {
    /// Crank line level.
    pub primary: bool,
    /// Cam line level.
    pub secondary: bool,
}

impl LineLevels {
    /// Level of `line`.
    pub const fn of(&self, line: SensorLine) -> bool {
        match line {
            SensorLine::Primary => self.primary,
            SensorLine::Secondary => self.secondary,
        }
    }
}

/// One sensor edge, captured in interrupt context and consumed once by the decoder task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct TriggerEvent {
    /// Counter value read before anything else in the ISR, in microseconds.
    pub timestamp: u32,
    /// Line that moved.
    pub line: SensorLine,
    /// Direction of the move.
    pub edge: Edge,
    /// Both lines as sampled right after the timestamp.
    pub levels: LineLevels,
}

impl TriggerEvent {
    /// Builds an event from raw samples, classifying the edge from the level of `line`.
    pub const fn from_samples(timestamp: u32, line: SensorLine, levels: LineLevels) -> Self {
        Self {
            timestamp,
            line,
            edge: Edge::from_level(levels.of(line)),
            levels,
        }
    }
}
