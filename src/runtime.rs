//! Cooperative runtime for the three ECU tasks.
//!
//! [`EcuTasks`] is what the firmware's `main` builds once the shared state and the
//! ignition slot exist. Each call to [`EcuTasks::poll`] runs one round:
//!
//! 1. the decoder task drains the edge queue
//! 2. the engine controller steps its state machine and issues requests
//! 3. the scheduler arms the requested channels
//! 4. the supervisor shuts ignition down if anything latched a fault
//!
//! The round never blocks; the caller decides whether to sleep, wait for an interrupt, or
//! spin when it reports no work.

use core::fmt;

use embedded_hal::digital::OutputPin;

use crate::config::{EngineThresholds, IgnitionCalibration};
use crate::engine::{EngineController, EngineState};
use crate::error::{ConfigError, Fault};
use crate::ignition::{CoilDriver, IgnitionSlot, SchedulerTask};
use crate::shared::EcuShared;
use crate::supervisor;
use crate::timer::{CompareTimer, MicrosClock};
use crate::trigger::DecoderTask;

/// The decoder task, scheduler task and engine controller, wired to one [`EcuShared`].
pub struct EcuTasks<'a, CLK, CMP, C, M: OutputPin, const Q: usize> {
    shared: &'a EcuShared<Q>,
    slot: &'a IgnitionSlot<CMP, C>,
    decoder: DecoderTask<'a, M, Q>,
    scheduler: SchedulerTask<'a, CLK, CMP, C, Q>,
    controller: EngineController<'a, CLK, Q>,
}

impl<'a, CLK, CMP, C, M, const Q: usize> EcuTasks<'a, CLK, CMP, C, M, Q>
where
    CLK: MicrosClock + Clone,
    CMP: CompareTimer,
    C: CoilDriver,
    M: OutputPin,
{
    /// Validates the calibration and builds the tasks.
    ///
    /// The trigger calibration is read from `shared`. `clock` is cloned into the tasks
    /// that need it, so pass a reference or another cheap handle.
    ///
    /// # Example
    /// ```rust
    /// use core::cell::RefCell;
    /// use critical_section::Mutex;
    /// use ecu_core::config::{EngineThresholds, IgnitionCalibration, TriggerConfig};
    /// use ecu_core::ignition::{CoilDriver, IgnitionChannel, IgnitionSlot};
    /// use ecu_core::error::Fault;
    /// use ecu_core::runtime::EcuTasks;
    /// use ecu_core::shared::EcuShared;
    /// use ecu_core::timer::{CompareTimer, MicrosClock};
    /// use ecu_core::trigger::NoMarker;
    ///
    /// #[derive(Clone, Copy)]
    /// struct Clock;
    /// impl MicrosClock for Clock {
    ///     fn now_micros(&self) -> u32 { 0 }
    /// }
    /// struct Compare;
    /// impl CompareTimer for Compare {
    ///     fn arm(&mut self, _: IgnitionChannel, _: u32) {}
    ///     fn disarm(&mut self, _: IgnitionChannel) {}
    /// }
    /// struct Coils;
    /// impl CoilDriver for Coils {
    ///     fn energize(&mut self, _: IgnitionChannel) -> Result<(), Fault> { Ok(()) }
    ///     fn fire(&mut self, _: IgnitionChannel) -> Result<(), Fault> { Ok(()) }
    ///     fn release_all(&mut self) {}
    /// }
    ///
    /// static ECU: EcuShared = EcuShared::new(TriggerConfig::DEFAULT);
    /// static IGNITION: IgnitionSlot<Compare, Coils> = Mutex::new(RefCell::new(None));
    ///
    /// let mut tasks = EcuTasks::new(
    ///     &ECU,
    ///     &IGNITION,
    ///     Clock,
    ///     IgnitionCalibration::DEFAULT,
    ///     EngineThresholds::DEFAULT,
    ///     None::<NoMarker>,
    /// )
    /// .unwrap();
    /// assert_eq!(tasks.poll(), Ok(false));
    /// ```
    pub fn new(
        shared: &'a EcuShared<Q>,
        slot: &'a IgnitionSlot<CMP, C>,
        clock: CLK,
        ignition: IgnitionCalibration,
        engine: EngineThresholds,
        marker: Option<M>,
    ) -> Result<Self, ConfigError> {
        shared.trigger_config().validate()?;
        ignition.validate()?;
        engine.validate()?;
        Ok(Self {
            shared,
            slot,
            decoder: DecoderTask::new(shared, marker),
            scheduler: SchedulerTask::new(shared, slot, clock.clone(), ignition),
            controller: EngineController::new(shared, clock, engine),
        })
    }

    /// Runs one cooperative round.
    ///
    /// Returns `Ok(true)` when any task did work and another round should follow
    /// immediately, `Ok(false)` when everything is idle, and the latched fault once
    /// ignition has been shut down.
    pub fn poll(&mut self) -> Result<bool, Fault> {
        let mut busy = self.decoder.drain() > 0;
        let stepped = self.controller.step().map(|_| ());
        let scheduled = match self.scheduler.poll() {
            Ok(_) => {
                busy = true;
                Ok(())
            }
            Err(nb::Error::WouldBlock) => Ok(()),
            Err(nb::Error::Other(fault)) => Err(fault),
        };
        supervisor::enforce(self.shared, self.slot)?;
        stepped.and(scheduled)?;
        Ok(busy)
    }

    /// Current engine regime.
    pub fn state(&self) -> EngineState {
        self.controller.state()
    }

    /// The decoder task.
    pub fn decoder(&self) -> &DecoderTask<'a, M, Q> {
        &self.decoder
    }

    /// The scheduler task.
    pub fn scheduler(&self) -> &SchedulerTask<'a, CLK, CMP, C, Q> {
        &self.scheduler
    }

    /// The engine controller.
    pub fn controller(&self) -> &EngineController<'a, CLK, Q> {
        &self.controller
    }

    /// The shared state the tasks run against.
    pub fn shared(&self) -> &'a EcuShared<Q> {
        self.shared
    }
}

impl<CLK, CMP, C, M: OutputPin, const Q: usize> fmt::Debug for EcuTasks<'_, CLK, CMP, C, M, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcuTasks")
            .field("shared", self.shared)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
