//! Per-channel ignition scheduling.
//!
//! Each of the four channels owns one compare register on a shared timer and walks the
//! same three-state machine: `Off → Pending → Running → Off`.
//!
//! - [`SchedulerTask`] (task context) turns a channel request into a [`FiringWindow`] from
//!   the decoder's timing and arms the channel, moving it `Off → Pending`.
//! - [`IgnitionBank::on_compare_match`] (interrupt context) starts the dwell on the first
//!   match and fires the coil on the second, then signals completion. A first match that
//!   arrives after the fire deadline skips the event instead.
//!
//! The task side only ever touches `Off` channels, the interrupt side only `Pending` and
//! `Running` ones. A channel found in any other state is a [`crate::error::Fault`].

mod bank;
mod scheduler;

pub use bank::*;
pub use scheduler::*;

use crate::consts::IGNITION_CHANNELS;
use crate::error::Fault;
use embedded_hal::digital::OutputPin;

/// One ignition output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum IgnitionChannel {
    /// Channel 1.
    Ch1,
    /// Channel 2.
    Ch2,
    /// Channel 3.
    Ch3,
    /// Channel 4.
    Ch4,
}

impl IgnitionChannel {
    /// Every channel in index order.
    pub const ALL: [Self; IGNITION_CHANNELS] = [Self::Ch1, Self::Ch2, Self::Ch3, Self::Ch4];

    /// Zero-based index, matching the compare register and calibration table order.
    pub const fn index(self) -> usize {
        match self {
            Self::Ch1 => 0,
            Self::Ch2 => 1,
            Self::Ch3 => 2,
            Self::Ch4 => 3,
        }
    }

    /// Channel for a zero-based index.
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Ch1),
            1 => Some(Self::Ch2),
            2 => Some(Self::Ch3),
            3 => Some(Self::Ch4),
            _ => None,
        }
    }

    const fn mask(self) -> u8 {
        1 << self.index()
    }
}

/// A set of channels, one bit each.
///
/// Carries both the scheduler request bits and the completion bits between contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ChannelSet(u8);

impl ChannelSet {
    /// No channels.
    pub const EMPTY: Self = Self(0);
    /// All four channels.
    pub const ALL: Self = Self(0b1111);

    /// Whether `channel` is in the set.
    pub const fn contains(self, channel: IgnitionChannel) -> bool {
        self.0 & channel.mask() != 0
    }

    /// The set plus `channel`.
    pub const fn with(self, channel: IgnitionChannel) -> Self {
        Self(self.0 | channel.mask())
    }

    /// The set minus `channel`.
    pub const fn without(self, channel: IgnitionChannel) -> Self {
        Self(self.0 & !channel.mask())
    }

    /// Channels in either set.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Channels in `self` but not in `other`.
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// `true` when no channel is present.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of channels present.
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Raw bit mask, bit `i` for channel index `i`.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Channels present, in index order.
    pub fn iter(self) -> impl Iterator<Item = IgnitionChannel> {
        IgnitionChannel::ALL
            .into_iter()
            .filter(move |channel| self.contains(*channel))
    }
}

impl From<IgnitionChannel> for ChannelSet {
    fn from(channel: IgnitionChannel) -> Self {
        Self::EMPTY.with(channel)
    }
}

impl FromIterator<IgnitionChannel> for ChannelSet {
    fn from_iter<I: IntoIterator<Item = IgnitionChannel>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

/// Where a channel is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ScheduleStatus {
    /// Nothing armed; the scheduler may arm it.
    #[default]
    Off,
    /// Armed for dwell start.
    Pending,
    /// Coil energized, armed for the fire deadline.
    Running,
}

/// One channel's schedule entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct IgnitionSchedule {
    /// Counter value at which dwell starts.
    pub start: u32,
    /// Counter value at which the coil fires.
    pub end: u32,
    /// Current state.
    pub status: ScheduleStatus,
}

impl IgnitionSchedule {
    /// An idle entry.
    pub const OFF: Self = Self {
        start: 0,
        end: 0,
        status: ScheduleStatus::Off,
    };
}

/// Absolute dwell start and fire times for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct FiringWindow {
    /// Counter value at which the coil is energized.
    pub start: u32,
    /// Counter value at which the coil fires.
    pub end: u32,
}

/// Coil outputs, addressed by channel.
pub trait CoilDriver {
    /// Starts charging `channel`'s coil.
    fn energize(&mut self, channel: IgnitionChannel) -> Result<(), Fault>;

    /// Releases `channel`'s coil, producing the spark.
    fn fire(&mut self, channel: IgnitionChannel) -> Result<(), Fault>;

    /// Drives every coil to its de-energized level, ignoring pin errors.
    fn release_all(&mut self);
}

/// Four coil driver outputs on `OutputPin`s.
///
/// Energizing drives the pin HIGH, firing drives it LOW; `inverted` swaps the two for
/// active-low driver stages. All coils are released on construction.
#[derive(Debug)]
pub struct CoilPins<P: OutputPin> {
    pins: [P; IGNITION_CHANNELS],
    inverted: bool,
}

impl<P: OutputPin> CoilPins<P> {
    /// Takes ownership of the four pins, in channel order, and releases every coil.
    pub fn new(pins: [P; IGNITION_CHANNELS], inverted: Option<bool>) -> Self {
        let mut coils = Self {
            pins,
            inverted: inverted.unwrap_or(false),
        };
        coils.release_all();
        coils
    }

    fn drive(&mut self, channel: IgnitionChannel, energized: bool) -> Result<(), Fault> {
        let pin = &mut self.pins[channel.index()];
        let result = if energized != self.inverted {
            pin.set_high()
        } else {
            pin.set_low()
        };
        result.map_err(|_| Fault::CoilDrive(channel))
    }

    /// Mutable access to the pins, in channel order.
    pub fn pins_mut(&mut self) -> &mut [P; IGNITION_CHANNELS] {
        &mut self.pins
    }

    /// Gives the pins back.
    pub fn release(self) -> [P; IGNITION_CHANNELS] {
        self.pins
    }
}

impl<P: OutputPin> CoilDriver for CoilPins<P> {
    fn energize(&mut self, channel: IgnitionChannel) -> Result<(), Fault> {
        self.drive(channel, true)
    }

    fn fire(&mut self, channel: IgnitionChannel) -> Result<(), Fault> {
        self.drive(channel, false)
    }

    fn release_all(&mut self) {
        for channel in IgnitionChannel::ALL {
            let _ = self.drive(channel, false);
        }
    }
}
