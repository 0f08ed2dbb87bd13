//! Calibration data.
//!
//! The decoder's wheel geometry, the ignition targets and the engine thresholds are data,
//! not code. Each struct has a `const DEFAULT` holding the reference calibration so it can
//! seed a `static`, and a `validate()` that rejects tables the algorithms cannot work with.
//!
//! ## Example
//!
//! ```rust
//! use ecu_core::config::{EcuConfig, IgnitionCalibration};
//!
//! let config = EcuConfig {
//!     ignition: IgnitionCalibration {
//!         dwell_us: 3_500,
//!         ..IgnitionCalibration::DEFAULT
//!     },
//!     ..EcuConfig::DEFAULT
//! };
//! assert!(config.validate().is_ok());
//! ```

use crate::consts::{
    COMPLETION_TIMEOUT_US, CRANKING_WINDOW_US, CYCLE_DEGREES, DEFAULT_DWELL_US,
    EXPECTED_PRIMARY, EXPECTED_SECONDARY, IGNITION_CHANNELS, PRIMARY_ANGLES, PRIMARY_EDGES,
    RUNNING_RPM, SECONDARY_EDGES, STALL_RPM, SYNC_CONFIDENCE_THRESHOLD, TARGET_ANGLES,
};
use crate::error::ConfigError;
use crate::ignition::IgnitionChannel;
use crate::trigger::Edge;

/// Edge indices the decoder jumps to when it acquires sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct SyncAnchor {
    /// Primary index of the edge that established sync.
    pub primary_index: u8,
    /// Secondary index in effect at that edge.
    pub secondary_index: u8,
}

impl SyncAnchor {
    /// Creates an anchor.
    pub const fn new(primary_index: u8, secondary_index: u8) -> Self {
        Self {
            primary_index,
            secondary_index,
        }
    }

    fn in_range(&self) -> bool {
        (self.primary_index as usize) < PRIMARY_EDGES
            && (self.secondary_index as usize) < SECONDARY_EDGES
    }
}

/// Crank/cam wheel geometry.
///
/// Encodes which engine angle each primary edge sits at, which paired-line level each
/// edge must see while in sync, and the edges that can establish sync from nothing.
/// `true` means HIGH throughout.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct WheelGeometry {
    /// Engine angle of each primary edge, strictly increasing within `[0, 720)`.
    pub primary_angles: [f32; PRIMARY_EDGES],
    /// Secondary level expected when primary edge `i` arrives.
    pub expected_secondary: [bool; PRIMARY_EDGES],
    /// Primary level expected when secondary edge `i` arrives.
    pub expected_primary: [bool; SECONDARY_EDGES],
    /// Primary edge direction that can establish sync.
    pub primary_sync_edge: Edge,
    /// Secondary level that must accompany the primary sync edge.
    pub primary_sync_secondary_level: bool,
    /// Indices adopted when sync comes from a primary edge.
    pub primary_sync_anchor: SyncAnchor,
    /// Secondary edge direction that can establish sync.
    pub secondary_sync_edge: Edge,
    /// Indices adopted when the secondary sync edge arrives with the primary LOW.
    pub secondary_sync_primary_low: SyncAnchor,
    /// Indices adopted when the secondary sync edge arrives with the primary HIGH.
    pub secondary_sync_primary_high: SyncAnchor,
}

impl WheelGeometry {
    /// 8 crank edges with one asymmetric gap, 4 cam edges.
    pub const DEFAULT: Self = Self {
        primary_angles: PRIMARY_ANGLES,
        expected_secondary: EXPECTED_SECONDARY,
        expected_primary: EXPECTED_PRIMARY,
        primary_sync_edge: Edge::Fall,
        primary_sync_secondary_level: true,
        primary_sync_anchor: SyncAnchor::new(3, 0),
        secondary_sync_edge: Edge::Fall,
        secondary_sync_primary_low: SyncAnchor::new(3, 1),
        secondary_sync_primary_high: SyncAnchor::new(6, 3),
    };

    /// Checks angle ordering, anchor ranges and anchor/expectation consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, &angle) in self.primary_angles.iter().enumerate() {
            if !(0.0..CYCLE_DEGREES).contains(&angle) {
                return Err(ConfigError::AngleOutOfRange { index, angle });
            }
            if index > 0 && angle <= self.primary_angles[index - 1] {
                return Err(ConfigError::AnglesNotIncreasing { index });
            }
        }

        for anchor in [
            self.primary_sync_anchor,
            self.secondary_sync_primary_low,
            self.secondary_sync_primary_high,
        ] {
            if !anchor.in_range() {
                return Err(ConfigError::AnchorOutOfRange {
                    primary_index: anchor.primary_index,
                    secondary_index: anchor.secondary_index,
                });
            }
        }

        // A sync edge must itself satisfy the table it is about to be checked against.
        let contradicts = |anchor: SyncAnchor| ConfigError::AnchorContradictsExpectation {
            primary_index: anchor.primary_index,
            secondary_index: anchor.secondary_index,
        };
        let anchor = self.primary_sync_anchor;
        if self.expected_secondary[anchor.primary_index as usize]
            != self.primary_sync_secondary_level
        {
            return Err(contradicts(anchor));
        }
        let anchor = self.secondary_sync_primary_low;
        if self.expected_primary[anchor.secondary_index as usize] {
            return Err(contradicts(anchor));
        }
        let anchor = self.secondary_sync_primary_high;
        if !self.expected_primary[anchor.secondary_index as usize] {
            return Err(contradicts(anchor));
        }
        Ok(())
    }
}

impl Default for WheelGeometry {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Trigger decoder calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct TriggerConfig {
    /// Wheel pattern and sync rules.
    pub geometry: WheelGeometry,
    /// Consecutive matching edges needed before timing queries are trusted.
    pub confidence_threshold: u32,
    /// Longest span of the last three primary edges that still counts as cranking.
    pub cranking_window_us: u32,
}

impl TriggerConfig {
    /// Reference calibration.
    pub const DEFAULT: Self = Self {
        geometry: WheelGeometry::DEFAULT,
        confidence_threshold: SYNC_CONFIDENCE_THRESHOLD,
        cranking_window_us: CRANKING_WINDOW_US,
    };

    /// Validates the geometry and the confidence threshold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.geometry.validate()?;
        if self.confidence_threshold == 0 {
            return Err(ConfigError::ZeroConfidenceThreshold);
        }
        Ok(())
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Per-channel ignition targets and the coil dwell.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct IgnitionCalibration {
    /// Engine angle each channel fires at, indexed by [`IgnitionChannel::index`].
    pub target_angles: [f32; IGNITION_CHANNELS],
    /// Time a coil is energized before it fires, in microseconds.
    pub dwell_us: u32,
}

impl IgnitionCalibration {
    /// Reference calibration: 90°, 270°, 450°, 630° with a 10 ms dwell.
    pub const DEFAULT: Self = Self {
        target_angles: TARGET_ANGLES,
        dwell_us: DEFAULT_DWELL_US,
    };

    /// Target angle for `channel`.
    pub const fn target(&self, channel: IgnitionChannel) -> f32 {
        self.target_angles[channel.index()]
    }

    /// Checks target ranges and dwell.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for channel in IgnitionChannel::ALL {
            let angle = self.target(channel);
            if !(0.0..CYCLE_DEGREES).contains(&angle) {
                return Err(ConfigError::TargetOutOfRange { channel, angle });
            }
        }
        if self.dwell_us == 0 {
            return Err(ConfigError::ZeroDwell);
        }
        Ok(())
    }
}

impl Default for IgnitionCalibration {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Engine regime thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct EngineThresholds {
    /// Below this RPM the engine is stopped.
    pub stall_rpm: f32,
    /// Above this RPM a cranking engine is running.
    pub running_rpm: f32,
    /// Longest wait for any ignition completion before a liveness fault.
    pub completion_timeout_us: u32,
}

impl EngineThresholds {
    /// 50 RPM stall, 500 RPM running, 5 s completion timeout.
    pub const DEFAULT: Self = Self {
        stall_rpm: STALL_RPM,
        running_rpm: RUNNING_RPM,
        completion_timeout_us: COMPLETION_TIMEOUT_US,
    };

    /// Checks threshold ordering and the timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.stall_rpm < self.running_rpm) {
            return Err(ConfigError::InvertedRpmThresholds {
                stall_rpm: self.stall_rpm,
                running_rpm: self.running_rpm,
            });
        }
        if self.completion_timeout_us == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

impl Default for EngineThresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Complete calibration for one engine.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct EcuConfig {
    /// Trigger decoder calibration.
    pub trigger: TriggerConfig,
    /// Ignition targets and dwell.
    pub ignition: IgnitionCalibration,
    /// Regime thresholds.
    pub engine: EngineThresholds,
}

impl EcuConfig {
    /// Reference calibration for every subsystem.
    pub const DEFAULT: Self = Self {
        trigger: TriggerConfig::DEFAULT,
        ignition: IgnitionCalibration::DEFAULT,
        engine: EngineThresholds::DEFAULT,
    };

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.trigger.validate()?;
        self.ignition.validate()?;
        self.engine.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_calibration_is_valid() {
        assert_eq!(EcuConfig::DEFAULT.validate(), Ok(()));
        assert_eq!(EcuConfig::default(), EcuConfig::DEFAULT);
    }

    #[test]
    fn test_rejects_non_increasing_angles() {
        let mut geometry = WheelGeometry::DEFAULT;
        geometry.primary_angles[4] = 540.0;
        assert_eq!(
            geometry.validate(),
            Err(ConfigError::AnglesNotIncreasing { index: 5 })
        );
        geometry.primary_angles[4] = 355.0;
        assert_eq!(
            geometry.validate(),
            Err(ConfigError::AnglesNotIncreasing { index: 4 })
        );
    }

    #[test]
    fn test_rejects_angle_past_cycle_end() {
        let mut geometry = WheelGeometry::DEFAULT;
        geometry.primary_angles[7] = 720.0;
        assert_eq!(
            geometry.validate(),
            Err(ConfigError::AngleOutOfRange {
                index: 7,
                angle: 720.0
            })
        );
    }

    #[test]
    fn test_rejects_anchor_contradicting_tables() {
        let mut geometry = WheelGeometry::DEFAULT;
        geometry.primary_sync_anchor = SyncAnchor::new(1, 0);
        assert_eq!(
            geometry.validate(),
            Err(ConfigError::AnchorContradictsExpectation {
                primary_index: 1,
                secondary_index: 0
            })
        );

        let mut geometry = WheelGeometry::DEFAULT;
        geometry.secondary_sync_primary_high = SyncAnchor::new(6, 4);
        assert!(matches!(
            geometry.validate(),
            Err(ConfigError::AnchorOutOfRange { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_ignition_and_engine_values() {
        let ignition = IgnitionCalibration {
            dwell_us: 0,
            ..IgnitionCalibration::DEFAULT
        };
        assert_eq!(ignition.validate(), Err(ConfigError::ZeroDwell));

        let mut ignition = IgnitionCalibration::DEFAULT;
        ignition.target_angles[2] = -1.0;
        assert_eq!(
            ignition.validate(),
            Err(ConfigError::TargetOutOfRange {
                channel: IgnitionChannel::Ch3,
                angle: -1.0
            })
        );

        let engine = EngineThresholds {
            stall_rpm: 600.0,
            ..EngineThresholds::DEFAULT
        };
        assert!(matches!(
            engine.validate(),
            Err(ConfigError::InvertedRpmThresholds { .. })
        ));
    }
}
