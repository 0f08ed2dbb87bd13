//! Error and fault types.
//!
//! Recoverable conditions ([`NotSynced`], [`CaptureError`], [`ScheduleError`],
//! [`ConfigError`]) are ordinary `Result` errors. A [`Fault`] is different: it means a
//! logic or hardware invariant was broken, it is latched in [`crate::shared::EcuShared`],
//! and the supervisor answers it by releasing every coil output.

use crate::ignition::IgnitionChannel;
use crate::trigger::SensorLine;

/// A derived timing quantity was requested while the decoder is not trusted.
///
/// Returned by every RPM, angle and rate query until sync has been held for the
/// configured number of consecutive edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[error("trigger decoder is not synchronized")]
pub struct NotSynced;

/// Failure to hand a sensor edge from interrupt context to the decoder task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum CaptureError {
    /// The event queue was full; the edge was dropped and counted.
    #[error("trigger event queue full, edge dropped")]
    QueueFull,
    /// A sensor line could not be read.
    #[error("failed to read the {0:?} sensor line")]
    LineRead(SensorLine),
    /// An edge interrupt fired before `global_capture_setup` installed the capture.
    #[error("edge capture used before setup")]
    Uninitialized,
}

/// Reasons a channel's next ignition event was not armed.
///
/// All variants except [`ScheduleError::ChannelBusy`] skip the channel for one cycle and
/// still signal its completion, so the engine controller is never starved.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ScheduleError {
    /// Angle or rate was unavailable.
    #[error(transparent)]
    NotSynced(#[from] NotSynced),
    /// The dwell start would already be in the past.
    #[error("deadline elapsed: lead {lead_us} us does not cover dwell {dwell_us} us")]
    DeadlineElapsed {
        /// Time from now until the firing deadline.
        lead_us: u32,
        /// Configured dwell.
        dwell_us: u32,
    },
    /// The firing deadline is too far away to order against a wrapping counter.
    #[error("deadline {lead_us} us ahead exceeds the counter horizon")]
    HorizonExceeded {
        /// Time from now until the firing deadline.
        lead_us: u32,
    },
    /// The channel still has an event in flight.
    #[error("{0:?} is still pending or running")]
    ChannelBusy(IgnitionChannel),
}

/// Fatal invariant violations.
///
/// Any fault stops ignition: it is latched, logged, and the supervisor releases all coils.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Fault {
    /// A compare match fired for a channel with nothing scheduled.
    #[error("compare match on idle channel {0:?}")]
    CompareWhileOff(IgnitionChannel),
    /// The scheduler was asked to arm a channel that was still in flight.
    #[error("arm requested for busy channel {0:?}")]
    ChannelBusy(IgnitionChannel),
    /// A coil output could not be driven.
    #[error("coil output for {0:?} could not be driven")]
    CoilDrive(IgnitionChannel),
    /// The engine controller waited too long for any ignition completion.
    #[error("no ignition completion for {waited_us} us")]
    CompletionTimeout {
        /// Time spent waiting.
        waited_us: u32,
    },
    /// Ignition hardware was used before `global_ignition_setup` installed it.
    #[error("ignition bank used before setup")]
    IgnitionUninitialized,
}

/// Calibration rejected by `validate()`.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ConfigError {
    /// A primary edge angle lies outside `[0, 720)`.
    #[error("primary angle {angle} at index {index} outside [0, 720)")]
    AngleOutOfRange {
        /// Primary edge index.
        index: usize,
        /// Offending angle.
        angle: f32,
    },
    /// Primary edge angles must strictly increase through the cycle.
    #[error("primary angle at index {index} does not increase")]
    AnglesNotIncreasing {
        /// First index that is not greater than its predecessor.
        index: usize,
    },
    /// A sync anchor names an edge index outside the pattern.
    #[error("sync anchor ({primary_index}, {secondary_index}) outside the pattern")]
    AnchorOutOfRange {
        /// Anchor primary index.
        primary_index: u8,
        /// Anchor secondary index.
        secondary_index: u8,
    },
    /// A sync anchor disagrees with the expectation tables.
    #[error("sync anchor ({primary_index}, {secondary_index}) contradicts the expected levels")]
    AnchorContradictsExpectation {
        /// Anchor primary index.
        primary_index: u8,
        /// Anchor secondary index.
        secondary_index: u8,
    },
    /// Sync confidence threshold must be at least one edge.
    #[error("sync confidence threshold must be non-zero")]
    ZeroConfidenceThreshold,
    /// A channel target angle lies outside `[0, 720)`.
    #[error("target angle {angle} for {channel:?} outside [0, 720)")]
    TargetOutOfRange {
        /// Channel with the bad target.
        channel: IgnitionChannel,
        /// Offending angle.
        angle: f32,
    },
    /// Dwell must be non-zero.
    #[error("dwell must be non-zero")]
    ZeroDwell,
    /// The stall threshold must lie below the running threshold.
    #[error("stall rpm {stall_rpm} not below running rpm {running_rpm}")]
    InvertedRpmThresholds {
        /// Configured stall RPM.
        stall_rpm: f32,
        /// Configured running RPM.
        running_rpm: f32,
    },
    /// The completion timeout must be non-zero.
    #[error("completion timeout must be non-zero")]
    ZeroTimeout,
}
