use crate::config::{SyncAnchor, TriggerConfig};
use crate::consts::{
    CYCLE_DEGREES, DEGREES_PER_REV, HISTORY_LEN, MICROS_PER_MINUTE, PRIMARY_EDGES,
    SECONDARY_EDGES,
};
use crate::error::NotSynced;
use crate::timer::{elapsed, is_after};
use crate::trigger::{SensorLine, TriggerEvent};

/// Angle swept going forward from `from` to `to` through the 720° cycle.
///
/// Equal angles count as one full cycle.
///
/// # Example
/// ```rust
/// use ecu_core::trigger::forward_delta;
///
/// assert_eq!(forward_delta(285.0, 535.0), 250.0);
/// assert_eq!(forward_delta(645.0, 105.0), 180.0);
/// ```
pub fn forward_delta(from: f32, to: f32) -> f32 {
    if to > from {
        to - from
    } else {
        (CYCLE_DEGREES - from) + to
    }
}

/// Wraps any angle into `[0, 720)`.
pub fn wrap_angle(angle: f32) -> f32 {
    let mut wrapped = libm::fmodf(angle, CYCLE_DEGREES);
    if wrapped < 0.0 {
        wrapped += CYCLE_DEGREES;
    }
    // fmodf of a tiny negative value plus a full cycle can round up to exactly 720
    if wrapped >= CYCLE_DEGREES {
        wrapped = 0.0;
    }
    wrapped
}

/// Edge timestamps for one line, newest first.
///
/// Fixed size, overwritten in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct EventHistory {
    stamps: [u32; HISTORY_LEN],
}

impl EventHistory {
    /// An all-zero history.
    pub const fn new() -> Self {
        Self {
            stamps: [0; HISTORY_LEN],
        }
    }

    /// Shifts every entry one slot older and stores `timestamp` as the newest.
    pub fn push(&mut self, timestamp: u32) {
        self.stamps.copy_within(0..HISTORY_LEN - 1, 1);
        self.stamps[0] = timestamp;
    }

    /// Most recent timestamp.
    pub const fn newest(&self) -> u32 {
        self.stamps[0]
    }

    /// Timestamp `HISTORY_LEN - 1` edges before the newest.
    pub const fn oldest(&self) -> u32 {
        self.stamps[HISTORY_LEN - 1]
    }

    /// Timestamps, newest first.
    pub const fn as_array(&self) -> &[u32; HISTORY_LEN] {
        &self.stamps
    }
}

/// What a single event did to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum DecodeOutcome {
    /// No sync, and this edge could not establish it.
    Searching,
    /// This edge established sync at confidence 1.
    SyncAcquired,
    /// The edge matched the expected paired-line level.
    Confirmed {
        /// Confidence after this edge.
        confidence: u32,
    },
    /// The edge contradicted the expected level and sync was dropped.
    SyncLost,
}

/// Every derived timing quantity, computed from one consistent view of the decoder.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct TimingSnapshot {
    /// Engine angle at the instant the snapshot was taken, in `[0, 720)`.
    pub current_angle: f32,
    /// Microseconds per crank degree.
    pub us_per_degree: f32,
    /// Crank degrees per microsecond.
    pub degrees_per_us: f32,
    /// Crank revolutions per minute.
    pub rpm: f32,
}

/// Sync and edge-history state machine for the crank/cam pair.
///
/// Mutated only by [`crate::trigger::DecoderTask`]; read by every other task through
/// [`crate::shared::EcuShared::with_decoder`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct TriggerDecoder {
    config: TriggerConfig,
    has_sync: bool,
    sync_confidence: u32,
    primary_index: u8,
    secondary_index: u8,
    primary_history: EventHistory,
    secondary_history: EventHistory,
}

impl TriggerDecoder {
    /// Creates an unsynchronized decoder.
    pub const fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            has_sync: false,
            sync_confidence: 0,
            primary_index: 0,
            secondary_index: 0,
            primary_history: EventHistory::new(),
            secondary_history: EventHistory::new(),
        }
    }

    /// Applies one captured edge.
    ///
    /// Edge indices advance on every edge. Without sync, only the configured sync edges
    /// (with the configured paired-line level) can establish it; with sync, every edge is
    /// checked against the expectation tables and either raises confidence or drops sync.
    pub fn process(&mut self, event: &TriggerEvent) -> DecodeOutcome {
        let geometry = self.config.geometry;
        match event.line {
            SensorLine::Primary => {
                self.primary_index = (self.primary_index + 1) % PRIMARY_EDGES as u8;
                self.primary_history.push(event.timestamp);
                if !self.has_sync {
                    if event.edge == geometry.primary_sync_edge
                        && event.levels.secondary == geometry.primary_sync_secondary_level
                    {
                        return self.acquire(geometry.primary_sync_anchor);
                    }
                    return DecodeOutcome::Searching;
                }
                let expected = geometry.expected_secondary[self.primary_index as usize];
                self.check(event.levels.secondary == expected)
            }
            SensorLine::Secondary => {
                self.secondary_index = (self.secondary_index + 1) % SECONDARY_EDGES as u8;
                self.secondary_history.push(event.timestamp);
                if !self.has_sync {
                    if event.edge == geometry.secondary_sync_edge {
                        let anchor = if event.levels.primary {
                            geometry.secondary_sync_primary_high
                        } else {
                            geometry.secondary_sync_primary_low
                        };
                        return self.acquire(anchor);
                    }
                    return DecodeOutcome::Searching;
                }
                let expected = geometry.expected_primary[self.secondary_index as usize];
                self.check(event.levels.primary == expected)
            }
        }
    }

    fn acquire(&mut self, anchor: SyncAnchor) -> DecodeOutcome {
        self.primary_index = anchor.primary_index;
        self.secondary_index = anchor.secondary_index;
        self.has_sync = true;
        self.sync_confidence = 1;
        DecodeOutcome::SyncAcquired
    }

    fn check(&mut self, matched: bool) -> DecodeOutcome {
        if matched {
            self.sync_confidence = self.sync_confidence.saturating_add(1);
            DecodeOutcome::Confirmed {
                confidence: self.sync_confidence,
            }
        } else {
            self.has_sync = false;
            self.sync_confidence = 0;
            DecodeOutcome::SyncLost
        }
    }

    /// Angle and time spanned by the primary history, only once trusted.
    fn span(&self) -> Result<(f32, u32), NotSynced> {
        if !self.is_trusted() {
            return Err(NotSynced);
        }
        let angles = &self.config.geometry.primary_angles;
        let newest = self.primary_index as usize;
        let oldest = (newest + PRIMARY_EDGES - (HISTORY_LEN - 1)) % PRIMARY_EDGES;
        let delta_angle = forward_delta(angles[oldest], angles[newest]);
        let delta_time = elapsed(self.primary_history.newest(), self.primary_history.oldest());
        if delta_time == 0 {
            return Err(NotSynced);
        }
        Ok((delta_angle, delta_time))
    }

    /// Crank RPM over the last three primary edges.
    pub fn rpm(&self) -> Result<f32, NotSynced> {
        let (delta_angle, delta_time) = self.span()?;
        Ok(delta_angle * MICROS_PER_MINUTE / (delta_time as f32 * DEGREES_PER_REV))
    }

    /// Microseconds per crank degree.
    pub fn us_per_degree(&self) -> Result<f32, NotSynced> {
        let (delta_angle, delta_time) = self.span()?;
        Ok(delta_time as f32 / delta_angle)
    }

    /// Crank degrees per microsecond.
    pub fn degrees_per_us(&self) -> Result<f32, NotSynced> {
        let (delta_angle, delta_time) = self.span()?;
        Ok(delta_angle / delta_time as f32)
    }

    /// Engine angle at counter value `now`, extrapolated from the newest primary edge.
    pub fn current_angle(&self, now: u32) -> Result<f32, NotSynced> {
        Ok(self.timing(now)?.current_angle)
    }

    /// All timing quantities at counter value `now`.
    ///
    /// A `now` that is not after the newest primary edge reads as that edge's angle.
    pub fn timing(&self, now: u32) -> Result<TimingSnapshot, NotSynced> {
        let (delta_angle, delta_time) = self.span()?;
        let degrees_per_us = delta_angle / delta_time as f32;
        let newest_angle = self.config.geometry.primary_angles[self.primary_index as usize];
        let newest = self.primary_history.newest();
        let since_edge = if is_after(now, newest) {
            elapsed(now, newest)
        } else {
            0
        };
        Ok(TimingSnapshot {
            current_angle: wrap_angle(newest_angle + degrees_per_us * since_edge as f32),
            us_per_degree: delta_time as f32 / delta_angle,
            degrees_per_us,
            rpm: delta_angle * MICROS_PER_MINUTE / (delta_time as f32 * DEGREES_PER_REV),
        })
    }

    /// `true` when sync is trusted and the last three primary edges fit in the cranking window.
    pub fn is_cranking(&self) -> bool {
        matches!(self.span(), Ok((_, delta_time)) if delta_time < self.config.cranking_window_us)
    }

    /// Whether the edge indices are believed to match the engine angle.
    pub const fn has_sync(&self) -> bool {
        self.has_sync
    }

    /// Consecutive matching edges since sync was acquired.
    pub const fn sync_confidence(&self) -> u32 {
        self.sync_confidence
    }

    /// Whether derived timing quantities may be used.
    pub const fn is_trusted(&self) -> bool {
        self.has_sync && self.sync_confidence >= self.config.confidence_threshold
    }

    /// Index of the most recent primary edge.
    pub const fn primary_index(&self) -> u8 {
        self.primary_index
    }

    /// Index of the most recent secondary edge.
    pub const fn secondary_index(&self) -> u8 {
        self.secondary_index
    }

    /// Primary edge timestamps, newest first.
    pub const fn primary_history(&self) -> &EventHistory {
        &self.primary_history
    }

    /// Secondary edge timestamps, newest first.
    pub const fn secondary_history(&self) -> &EventHistory {
        &self.secondary_history
    }

    /// Calibration in use.
    pub const fn config(&self) -> &TriggerConfig {
        &self.config
    }
}
