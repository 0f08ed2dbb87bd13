use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::error::Fault;
use crate::ignition::CoilDriver;
use crate::runtime::EcuTasks;
use crate::timer::{CompareTimer, MicrosClock};

/// Runs the ECU tasks in a blocking loop until a fault stops ignition.
///
/// This is a simple super-loop for firmware without an executor. Rounds that did work are
/// followed immediately by another round; an idle round sleeps `idle_us` on `delay`.
/// Interrupts keep capturing edges and firing coils while the loop sleeps.
///
/// # Arguments
/// - `tasks`: the wired tasks from [`EcuTasks::new`]
/// - `delay`: a delay provider implementing `DelayNs`, typically from the HAL
/// - `idle_us`: sleep after an idle round, in microseconds
///
/// # Example
/// ```rust,ignore
/// use ecu_core::timer::run_ecu_loop;
///
/// let fault = run_ecu_loop(&mut tasks, &mut delay, 50);
/// defmt::error!("ECU halted: {}", fault);
/// ```
///
/// # Notes
/// - Only returns on a fault, after every coil has been released.
/// - Keep `idle_us` well below the shortest dwell so requests are armed in time.
pub fn run_ecu_loop<D, CLK, CMP, C, M, const Q: usize>(
    tasks: &mut EcuTasks<'_, CLK, CMP, C, M, Q>,
    delay: &mut D,
    idle_us: u32,
) -> Fault
where
    D: DelayNs,
    CLK: MicrosClock + Clone,
    CMP: CompareTimer,
    C: CoilDriver,
    M: OutputPin,
{
    loop {
        match tasks.poll() {
            Ok(true) => {}
            Ok(false) => delay.delay_us(idle_us),
            Err(fault) => return fault,
        }
    }
}
