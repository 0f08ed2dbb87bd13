use core::fmt;

use crate::config::IgnitionCalibration;
use crate::error::{Fault, ScheduleError};
use crate::ignition::{ChannelSet, CoilDriver, FiringWindow, IgnitionChannel, IgnitionSlot};
use crate::shared::EcuShared;
use crate::timer::{COUNTER_HALF_RANGE, CompareTimer, MicrosClock};
use crate::trigger::{TimingSnapshot, forward_delta};

/// Computes the dwell start and fire times for an event at `target_angle`.
///
/// The fire time is the time the crank needs to sweep forward from the current angle to
/// the target at the current rate; the dwell starts `dwell_us` before that. The result is
/// rejected when the dwell start is not strictly in the future, or when the fire time is
/// too far ahead to be ordered against a wrapping counter.
///
/// # Example
/// ```rust
/// use ecu_core::ignition::plan_window;
/// use ecu_core::trigger::TimingSnapshot;
///
/// let timing = TimingSnapshot {
///     current_angle: 30.0,
///     us_per_degree: 100.0,
///     degrees_per_us: 0.01,
///     rpm: 1666.7,
/// };
/// let window = plan_window(90.0, &timing, 2_000, 1_000).unwrap();
/// assert_eq!(window.end, 7_000);
/// assert_eq!(window.start, 5_000);
/// ```
pub fn plan_window(
    target_angle: f32,
    timing: &TimingSnapshot,
    dwell_us: u32,
    now: u32,
) -> Result<FiringWindow, ScheduleError> {
    let lead = timing.us_per_degree * forward_delta(timing.current_angle, target_angle);
    if lead >= COUNTER_HALF_RANGE as f32 {
        return Err(ScheduleError::HorizonExceeded {
            lead_us: lead as u32,
        });
    }
    let lead_us = lead as u32;
    if lead_us <= dwell_us {
        return Err(ScheduleError::DeadlineElapsed { lead_us, dwell_us });
    }
    let end = now.wrapping_add(lead_us);
    Ok(FiringWindow {
        start: end.wrapping_sub(dwell_us),
        end,
    })
}

/// Task that turns channel requests into armed compare registers.
///
/// Every requested channel ends in exactly one of three ways: armed, skipped with its
/// completion signalled, or a fault.
pub struct SchedulerTask<'a, CLK, CMP, C, const Q: usize> {
    shared: &'a EcuShared<Q>,
    slot: &'a IgnitionSlot<CMP, C>,
    clock: CLK,
    calibration: IgnitionCalibration,
    armed: u32,
    skipped: u32,
}

impl<'a, CLK, CMP, C, const Q: usize> SchedulerTask<'a, CLK, CMP, C, Q>
where
    CLK: MicrosClock,
    CMP: CompareTimer,
    C: CoilDriver,
{
    /// Creates the task.
    pub fn new(
        shared: &'a EcuShared<Q>,
        slot: &'a IgnitionSlot<CMP, C>,
        clock: CLK,
        calibration: IgnitionCalibration,
    ) -> Self {
        Self {
            shared,
            slot,
            clock,
            calibration,
            armed: 0,
            skipped: 0,
        }
    }

    /// Handles every pending request.
    ///
    /// Returns the channels that were armed, `WouldBlock` when nothing was requested, or the
    /// latched fault.
    pub fn poll(&mut self) -> nb::Result<ChannelSet, Fault> {
        if let Some(fault) = self.shared.fault() {
            return Err(nb::Error::Other(fault));
        }
        let requested = self.shared.take_requests();
        if requested.is_empty() {
            return Err(nb::Error::WouldBlock);
        }

        let mut armed = ChannelSet::EMPTY;
        for channel in requested.iter() {
            let outcome = match self.plan(channel) {
                Ok(window) => match self.arm(channel, window) {
                    Some(result) => result.map(|()| window),
                    None => {
                        let fault = self.shared.raise_fault(Fault::IgnitionUninitialized);
                        return Err(nb::Error::Other(fault));
                    }
                },
                Err(err) => Err(err),
            };
            match outcome {
                Ok(window) => {
                    debug!(
                        "{:?} armed: dwell at {}, fire at {}",
                        channel, window.start, window.end
                    );
                    armed = armed.with(channel);
                    self.armed = self.armed.wrapping_add(1);
                }
                Err(ScheduleError::ChannelBusy(channel)) => {
                    let fault = self.shared.raise_fault(Fault::ChannelBusy(channel));
                    return Err(nb::Error::Other(fault));
                }
                Err(err) => {
                    match err {
                        ScheduleError::NotSynced(_) => {
                            debug!("{:?} skipped: not synced", channel)
                        }
                        _ => warn!("{:?} skipped: {}", channel, err),
                    }
                    self.skipped = self.skipped.wrapping_add(1);
                    self.shared.signal_completion(channel.into());
                }
            }
        }
        Ok(armed)
    }

    fn plan(&self, channel: IgnitionChannel) -> Result<FiringWindow, ScheduleError> {
        // Read under the decoder lock so no edge newer than `now` can be processed in between.
        let (now, timing) = self.shared.with_decoder(|decoder| {
            let now = self.clock.now_micros();
            decoder.timing(now).map(|timing| (now, timing))
        })?;
        plan_window(
            self.calibration.target(channel),
            &timing,
            self.calibration.dwell_us,
            now,
        )
    }

    /// `None` when no bank has been installed.
    fn arm(
        &self,
        channel: IgnitionChannel,
        window: FiringWindow,
    ) -> Option<Result<(), ScheduleError>> {
        critical_section::with(|cs| {
            self.slot
                .borrow(cs)
                .borrow_mut()
                .as_mut()
                .map(|bank| bank.arm(channel, window, self.clock.now_micros()))
        })
    }

    /// Events armed since creation. Wraps.
    pub fn armed_count(&self) -> u32 {
        self.armed
    }

    /// Requests skipped since creation. Wraps.
    pub fn skipped_count(&self) -> u32 {
        self.skipped
    }

    /// Calibration in use.
    pub fn calibration(&self) -> &IgnitionCalibration {
        &self.calibration
    }
}

impl<CLK, CMP, C, const Q: usize> fmt::Debug for SchedulerTask<'_, CLK, CMP, C, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerTask")
            .field("calibration", &self.calibration)
            .field("armed", &self.armed)
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}
