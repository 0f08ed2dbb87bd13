use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::digital::InputPin;

use crate::error::{CaptureError, Fault};
use crate::ignition::{
    CoilDriver, CompareOutcome, IgnitionBank, IgnitionChannel, IgnitionSlot,
};
use crate::shared::EcuShared;
use crate::timer::{CompareTimer, MicrosClock};
use crate::trigger::{EdgeCapture, SensorLine, TriggerEvent};

/// Global home of an [`EdgeCapture`], used only by the edge interrupt.
pub type CaptureSlot<CLK, P, S> = Mutex<RefCell<Option<EdgeCapture<CLK, P, S>>>>;

/// Used to initialize the global static ignition bank for use with `critical_section`.
///
/// # Returns
/// * An empty slot, filled later by [`global_ignition_setup`]
///
/// # Example
/// ```rust,ignore
/// use ecu_core::ignition::{CoilPins, IgnitionSlot};
/// use ecu_core::timer::global_ignition_init;
/// use some_hal::{Tim2Compare, CoilPin};
///
/// static IGNITION: IgnitionSlot<Tim2Compare, CoilPins<CoilPin>> = global_ignition_init();
/// ```
pub const fn global_ignition_init<CMP: CompareTimer, C: CoilDriver>() -> IgnitionSlot<CMP, C> {
    Mutex::new(RefCell::new(None))
}

/// Installs the compare timer and coil outputs in the global ignition slot.
///
/// # Arguments
/// * The global ignition slot
/// * The compare timer, already configured to count in microseconds
/// * The coil outputs
///
/// # Example
/// ```rust,ignore
/// fn main() {
///     global_ignition_setup(&IGNITION, compare, CoilPins::new(coil_pins, None));
/// }
/// ```
pub fn global_ignition_setup<CMP: CompareTimer, C: CoilDriver>(
    slot: &IgnitionSlot<CMP, C>,
    compare: CMP,
    coils: C,
) {
    critical_section::with(|cs| {
        let _ = slot.borrow(cs).replace(Some(IgnitionBank::new(compare, coils)));
    });
}

/// Handles a compare match for `channel`.
///
/// Call from the shared compare interrupt once per channel whose flag is set. `clock` is
/// read inside the critical section, so a delayed interrupt sees the real counter value.
/// A fired or skipped channel has its completion signalled. Any fault shuts the bank down
/// and is latched in `shared` before it is returned.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM2() {
///     for channel in pending_compare_channels() {
///         let _ = global_compare_match(&IGNITION, &ECU, &CLOCK, channel);
///     }
/// }
/// ```
pub fn global_compare_match<CLK, CMP, C, const Q: usize>(
    slot: &IgnitionSlot<CMP, C>,
    shared: &EcuShared<Q>,
    clock: &CLK,
    channel: IgnitionChannel,
) -> Result<CompareOutcome, Fault>
where
    CLK: MicrosClock + ?Sized,
    CMP: CompareTimer,
    C: CoilDriver,
{
    critical_section::with(|cs| {
        let mut guard = slot.borrow(cs).borrow_mut();
        let Some(bank) = guard.as_mut() else {
            return Err(shared.raise_fault(Fault::IgnitionUninitialized));
        };
        match bank.on_compare_match(channel, clock.now_micros()) {
            Ok(outcome @ (CompareOutcome::Fired | CompareOutcome::Skipped)) => {
                shared.signal_completion(channel.into());
                Ok(outcome)
            }
            Ok(outcome) => Ok(outcome),
            Err(fault) => {
                bank.shutdown();
                Err(shared.raise_fault(fault))
            }
        }
    })
}

/// Used to initialize the global static edge capture for use with `critical_section`.
///
/// # Example
/// ```rust,ignore
/// static EDGE_CAPTURE: CaptureSlot<&'static Tim2Clock, PA0, PA1> = global_capture_init();
/// ```
pub const fn global_capture_init<CLK, P, S>() -> CaptureSlot<CLK, P, S>
where
    CLK: MicrosClock,
    P: InputPin,
    S: InputPin,
{
    Mutex::new(RefCell::new(None))
}

/// Installs the counter handle and sensor inputs in the global capture slot.
pub fn global_capture_setup<CLK, P, S>(
    slot: &CaptureSlot<CLK, P, S>,
    clock: CLK,
    primary: P,
    secondary: S,
) where
    CLK: MicrosClock,
    P: InputPin,
    S: InputPin,
{
    critical_section::with(|cs| {
        let _ = slot
            .borrow(cs)
            .replace(Some(EdgeCapture::new(clock, primary, secondary)));
    });
}

/// Captures an edge on `line` from its pin-change interrupt.
///
/// Clearing the hardware edge flag stays with the caller.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn EXTI0() {
///     clear_exti0_flag();
///     let _ = global_edge_isr(&EDGE_CAPTURE, &ECU, SensorLine::Primary);
/// }
/// ```
pub fn global_edge_isr<CLK, P, S, const Q: usize>(
    slot: &CaptureSlot<CLK, P, S>,
    shared: &EcuShared<Q>,
    line: SensorLine,
) -> Result<TriggerEvent, CaptureError>
where
    CLK: MicrosClock,
    P: InputPin,
    S: InputPin,
{
    critical_section::with(|cs| match slot.borrow(cs).borrow_mut().as_mut() {
        Some(capture) => capture.on_edge(line, shared),
        None => Err(CaptureError::Uninitialized),
    })
}
