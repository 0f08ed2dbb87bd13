use core::cell::RefCell;

use critical_section::Mutex;

use crate::consts::IGNITION_CHANNELS;
use crate::error::{Fault, ScheduleError};
use crate::ignition::{
    CoilDriver, FiringWindow, IgnitionChannel, IgnitionSchedule, ScheduleStatus,
};
use crate::timer::{CompareTimer, elapsed, is_after};

/// Global home of an [`IgnitionBank`], shared by the scheduler task and the compare ISR.
pub type IgnitionSlot<CMP, C> = Mutex<RefCell<Option<IgnitionBank<CMP, C>>>>;

/// What a compare match did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum CompareOutcome {
    /// The coil was energized and the fire deadline armed.
    DwellStarted,
    /// The coil fired and the channel is idle again.
    Fired,
    /// The dwell-start match arrived at or after the fire deadline. The coil was never
    /// energized and the channel is idle again.
    Skipped,
}

/// The four schedule entries plus the hardware that executes them.
#[derive(Debug)]
pub struct IgnitionBank<CMP, C> {
    compare: CMP,
    coils: C,
    schedules: [IgnitionSchedule; IGNITION_CHANNELS],
}

impl<CMP: CompareTimer, C: CoilDriver> IgnitionBank<CMP, C> {
    /// Takes the compare timer and coil outputs. Every channel starts `Off`.
    pub fn new(compare: CMP, coils: C) -> Self {
        Self {
            compare,
            coils,
            schedules: [IgnitionSchedule::OFF; IGNITION_CHANNELS],
        }
    }

    /// Arms `channel` for `window`, moving it `Off → Pending`.
    ///
    /// `now` must be read while the bank is locked, so the start check cannot race the
    /// counter.
    pub fn arm(
        &mut self,
        channel: IgnitionChannel,
        window: FiringWindow,
        now: u32,
    ) -> Result<(), ScheduleError> {
        let schedule = &mut self.schedules[channel.index()];
        if schedule.status != ScheduleStatus::Off {
            return Err(ScheduleError::ChannelBusy(channel));
        }
        if !is_after(window.start, now) {
            return Err(ScheduleError::DeadlineElapsed {
                lead_us: elapsed(window.end, now),
                dwell_us: elapsed(window.end, window.start),
            });
        }
        *schedule = IgnitionSchedule {
            start: window.start,
            end: window.end,
            status: ScheduleStatus::Pending,
        };
        self.compare.arm(channel, window.start);
        Ok(())
    }

    /// Advances `channel` after its compare register matched at counter value `now`.
    ///
    /// `Pending` energizes the coil and re-arms the register at the fire deadline, unless
    /// that deadline is no longer ahead of `now`: an equality compare armed in the past
    /// would only match after the counter wraps, so the event is skipped instead.
    /// `Running` fires the coil and disarms the register so it cannot match again after
    /// the counter wraps. A match on an `Off` channel is a fault.
    pub fn on_compare_match(
        &mut self,
        channel: IgnitionChannel,
        now: u32,
    ) -> Result<CompareOutcome, Fault> {
        let schedule = &mut self.schedules[channel.index()];
        match schedule.status {
            ScheduleStatus::Pending => {
                let end = schedule.end;
                if !is_after(end, now) {
                    schedule.status = ScheduleStatus::Off;
                    self.compare.disarm(channel);
                    warn!("{:?} dwell started {} us late, skipped", channel, elapsed(now, end));
                    return Ok(CompareOutcome::Skipped);
                }
                schedule.status = ScheduleStatus::Running;
                self.compare.arm(channel, end);
                self.coils.energize(channel)?;
                Ok(CompareOutcome::DwellStarted)
            }
            ScheduleStatus::Running => {
                schedule.status = ScheduleStatus::Off;
                self.compare.disarm(channel);
                self.coils.fire(channel)?;
                Ok(CompareOutcome::Fired)
            }
            ScheduleStatus::Off => Err(Fault::CompareWhileOff(channel)),
        }
    }

    /// Releases every coil, disarms every register and idles every channel.
    pub fn shutdown(&mut self) {
        self.coils.release_all();
        for channel in IgnitionChannel::ALL {
            self.compare.disarm(channel);
        }
        self.schedules = [IgnitionSchedule::OFF; IGNITION_CHANNELS];
    }

    /// Current schedule entry for `channel`.
    pub fn schedule(&self, channel: IgnitionChannel) -> IgnitionSchedule {
        self.schedules[channel.index()]
    }

    /// Current state of `channel`.
    pub fn status(&self, channel: IgnitionChannel) -> ScheduleStatus {
        self.schedules[channel.index()].status
    }

    /// The compare timer.
    pub fn compare(&self) -> &CMP {
        &self.compare
    }

    /// The coil outputs.
    pub fn coils(&self) -> &C {
        &self.coils
    }

    /// Mutable access to the coil outputs.
    pub fn coils_mut(&mut self) -> &mut C {
        &mut self.coils
    }

    /// Gives back the compare timer and coil outputs.
    pub fn release(self) -> (CMP, C) {
        (self.compare, self.coils)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignition::CoilPins;
    use embedded_hal_mock::eh1::MockError;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    #[derive(Debug, Default)]
    struct Registers {
        armed: [Option<u32>; IGNITION_CHANNELS],
    }

    impl CompareTimer for Registers {
        fn arm(&mut self, channel: IgnitionChannel, deadline: u32) {
            self.armed[channel.index()] = Some(deadline);
        }

        fn disarm(&mut self, channel: IgnitionChannel) {
            self.armed[channel.index()] = None;
        }
    }

    fn low() -> PinTransaction {
        PinTransaction::set(PinState::Low)
    }

    fn high() -> PinTransaction {
        PinTransaction::set(PinState::High)
    }

    fn coils(ch1: &[PinTransaction]) -> CoilPins<PinMock> {
        CoilPins::new(
            [
                PinMock::new(ch1),
                PinMock::new(&[low()]),
                PinMock::new(&[low()]),
                PinMock::new(&[low()]),
            ],
            None,
        )
    }

    fn finish(bank: IgnitionBank<Registers, CoilPins<PinMock>>) {
        let (_, coils) = bank.release();
        for mut pin in coils.release() {
            pin.done();
        }
    }

    const WINDOW: FiringWindow = FiringWindow {
        start: 0xFFFF_F000,
        end: 0x0000_1710,
    };

    #[test]
    fn test_full_cycle_across_wrap() {
        let mut bank = IgnitionBank::new(Registers::default(), coils(&[low(), high(), low()]));
        let ch = IgnitionChannel::Ch1;

        bank.arm(ch, WINDOW, 0xFFFF_0000).unwrap();
        assert_eq!(bank.status(ch), ScheduleStatus::Pending);
        assert_eq!(bank.compare().armed[0], Some(WINDOW.start));

        assert_eq!(
            bank.on_compare_match(ch, WINDOW.start),
            Ok(CompareOutcome::DwellStarted)
        );
        assert_eq!(bank.status(ch), ScheduleStatus::Running);
        assert_eq!(bank.compare().armed[0], Some(WINDOW.end));

        assert_eq!(bank.on_compare_match(ch, WINDOW.end), Ok(CompareOutcome::Fired));
        assert_eq!(bank.status(ch), ScheduleStatus::Off);
        assert_eq!(bank.compare().armed[0], None);
        finish(bank);
    }

    #[test]
    fn test_arm_rejects_busy_and_late() {
        let mut bank = IgnitionBank::new(Registers::default(), coils(&[low()]));
        let ch = IgnitionChannel::Ch1;

        assert_eq!(
            bank.arm(ch, WINDOW, WINDOW.start),
            Err(ScheduleError::DeadlineElapsed {
                lead_us: 0x2710,
                dwell_us: 0x2710
            })
        );
        assert_eq!(bank.status(ch), ScheduleStatus::Off);

        assert!(bank.arm(ch, WINDOW, 0).is_err());
        bank.arm(ch, WINDOW, 0xFFFF_0000).unwrap();
        assert_eq!(
            bank.arm(ch, WINDOW, 0xFFFF_0000),
            Err(ScheduleError::ChannelBusy(ch))
        );
        finish(bank);
    }

    #[test]
    fn test_late_dwell_start_skips_without_energizing() {
        let mut bank = IgnitionBank::new(Registers::default(), coils(&[low()]));
        let ch = IgnitionChannel::Ch1;

        bank.arm(ch, WINDOW, 0xFFFF_0000).unwrap();
        assert_eq!(
            bank.on_compare_match(ch, WINDOW.end.wrapping_add(5)),
            Ok(CompareOutcome::Skipped)
        );
        assert_eq!(bank.status(ch), ScheduleStatus::Off);
        assert_eq!(bank.compare().armed[0], None);

        // Exactly at the fire deadline is already too late to start a dwell.
        bank.arm(ch, WINDOW, 0xFFFF_0000).unwrap();
        assert_eq!(
            bank.on_compare_match(ch, WINDOW.end),
            Ok(CompareOutcome::Skipped)
        );
        assert_eq!(bank.status(ch), ScheduleStatus::Off);
        finish(bank);
    }

    #[test]
    fn test_compare_on_idle_channel_is_fault() {
        let mut bank = IgnitionBank::new(Registers::default(), coils(&[low()]));
        assert_eq!(
            bank.on_compare_match(IgnitionChannel::Ch3, 0),
            Err(Fault::CompareWhileOff(IgnitionChannel::Ch3))
        );
        finish(bank);
    }

    #[test]
    fn test_coil_error_is_fault() {
        let mut bank = IgnitionBank::new(
            Registers::default(),
            coils(&[
                low(),
                high().with_error(MockError::Io(std::io::ErrorKind::Other)),
            ]),
        );
        let ch = IgnitionChannel::Ch1;
        bank.arm(ch, WINDOW, 0xFFFF_0000).unwrap();
        assert_eq!(
            bank.on_compare_match(ch, WINDOW.start),
            Err(Fault::CoilDrive(ch))
        );
        finish(bank);
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let mut bank = IgnitionBank::new(
            Registers::default(),
            CoilPins::new(
                [
                    PinMock::new(&[low(), high(), low()]),
                    PinMock::new(&[low(), low()]),
                    PinMock::new(&[low(), low()]),
                    PinMock::new(&[low(), low()]),
                ],
                None,
            ),
        );
        let ch = IgnitionChannel::Ch1;
        bank.arm(ch, WINDOW, 0xFFFF_0000).unwrap();
        bank.arm(IgnitionChannel::Ch2, WINDOW, 0xFFFF_0000).unwrap();
        let _ = bank.on_compare_match(ch, WINDOW.start).unwrap();

        bank.shutdown();
        for channel in IgnitionChannel::ALL {
            assert_eq!(bank.status(channel), ScheduleStatus::Off);
        }
        assert_eq!(bank.compare().armed, [None; IGNITION_CHANNELS]);
        finish(bank);
    }
}
