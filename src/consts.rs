//! Constants used across the trigger decoder, ignition scheduler and engine controller.
//!
//! This module defines the wheel pattern sizes, ring buffer depths and the
//! reference calibration values the [`crate::config`] defaults are built from.
//!
//! ## Key Concepts
//!
//! - **Engine cycle**: one full four-stroke cycle, i.e. two crank revolutions or 720°.
//! - **Primary pattern**: 8 crank edges per engine cycle, one of them following the
//!   asymmetric gap that lets the decoder find its phase.
//! - **Secondary pattern**: 4 cam edges per engine cycle, used to tell the two crank
//!   revolutions apart.
//! - **Confidence**: number of consecutive edges that matched the expected paired-line
//!   level since sync was acquired.
//!
//! The pattern sizes are structural (they size arrays); everything else here is only a
//! default and can be overridden through the configuration structs.

/// Degrees of crank rotation in one complete engine cycle.
pub const CYCLE_DEGREES: f32 = 720.0;

/// Number of primary (crank) edges in one engine cycle.
pub const PRIMARY_EDGES: usize = 8;

/// Number of secondary (cam) edges in one engine cycle.
pub const SECONDARY_EDGES: usize = 4;

/// Depth of each edge timestamp history, newest first.
///
/// The oldest entry is `HISTORY_LEN - 1` edges behind the newest one, which is the
/// window RPM and angular rate are measured over.
pub const HISTORY_LEN: usize = 4;

/// Number of independent ignition channels, one compare register each.
pub const IGNITION_CHANNELS: usize = 4;

/// Default capacity of the ISR → decoder task event queue.
pub const EVENT_QUEUE_LEN: usize = 10;

/// Minimum sync confidence before RPM, angle and rate queries are trusted.
pub const SYNC_CONFIDENCE_THRESHOLD: u32 = 13;

/// The last three primary edges must span less than this for the engine to count as cranking.
///
/// 600 ms over the reference window is roughly 50 RPM.
pub const CRANKING_WINDOW_US: u32 = 600_000;

/// Below this RPM the engine is considered stopped.
pub const STALL_RPM: f32 = 50.0;

/// Above this RPM a cranking engine is considered running.
pub const RUNNING_RPM: f32 = 500.0;

/// Default coil dwell, in microseconds.
pub const DEFAULT_DWELL_US: u32 = 10_000;

/// Default time the engine controller waits for any completion before raising a fault.
pub const COMPLETION_TIMEOUT_US: u32 = 5_000_000;

/// Engine angle associated with each primary edge index in the reference wheel.
pub const PRIMARY_ANGLES: [f32; PRIMARY_EDGES] =
    [105.0, 175.0, 285.0, 355.0, 465.0, 535.0, 635.0, 715.0];

/// Secondary line level expected on each primary edge index (`true` = HIGH).
pub const EXPECTED_SECONDARY: [bool; PRIMARY_EDGES] =
    [false, false, true, true, false, false, true, false];

/// Primary line level expected on each secondary edge index (`true` = HIGH).
pub const EXPECTED_PRIMARY: [bool; SECONDARY_EDGES] = [false, false, false, true];

/// Target firing angle per ignition channel, one per 180° of the cycle.
pub const TARGET_ANGLES: [f32; IGNITION_CHANNELS] = [90.0, 270.0, 450.0, 630.0];

/// Microseconds in one minute, used by the RPM calculation.
pub const MICROS_PER_MINUTE: f32 = 60_000_000.0;

/// Crank degrees in one revolution.
pub const DEGREES_PER_REV: f32 = 360.0;
