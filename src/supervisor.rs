//! Safe shutdown on a latched fault.

use crate::error::Fault;
use crate::ignition::{CoilDriver, IgnitionSlot};
use crate::shared::EcuShared;
use crate::timer::CompareTimer;

/// Stops all ignition output if a fault is latched.
///
/// Releases every coil, disarms every compare register and idles every channel, then
/// returns the fault. Returns `Ok(())` when nothing is latched. Safe to call repeatedly.
pub fn enforce<CMP, C, const Q: usize>(
    shared: &EcuShared<Q>,
    slot: &IgnitionSlot<CMP, C>,
) -> Result<(), Fault>
where
    CMP: CompareTimer,
    C: CoilDriver,
{
    let Some(fault) = shared.fault() else {
        return Ok(());
    };
    critical_section::with(|cs| {
        if let Some(bank) = slot.borrow(cs).borrow_mut().as_mut() {
            bank.shutdown();
        }
    });
    error!("ignition stopped: {}", fault);
    Err(fault)
}
