/// Declares the static `ECU` shared state.
///
/// # Arguments
/// - `$config`: optional `TriggerConfig` constant expression, defaults to
///   `TriggerConfig::DEFAULT`
///
/// # Example
/// ```rust
/// ecu_core::init_ecu_shared!();
///
/// assert_eq!(ECU.dropped_events(), 0);
/// ```
#[macro_export]
macro_rules! init_ecu_shared {
    () => {
        $crate::init_ecu_shared!($crate::config::TriggerConfig::DEFAULT);
    };
    ( $config:expr ) => {
        pub static ECU: $crate::shared::EcuShared = $crate::shared::EcuShared::new($config);
    };
}

/// Declares a static `IGNITION` slot protected by a `critical_section` mutex.
///
/// The slot is shared by the scheduler task and the compare-match interrupt. Fill it with
/// [`setup_ignition!`] before the interrupt is enabled.
///
/// # Arguments
/// - `$cmp`: the compare timer type (must implement `CompareTimer`)
/// - `$coils`: the coil driver type (must implement `CoilDriver`)
///
/// # Example
/// ```rust,ignore
/// init_ignition!(Tim2Compare, CoilPins<ErasedPin<Output>>);
/// ```
#[macro_export]
macro_rules! init_ignition {
    ( $cmp:ty, $coils:ty ) => {
        pub static IGNITION: $crate::ignition::IgnitionSlot<$cmp, $coils> =
            $crate::critical_section::Mutex::new(::core::cell::RefCell::new(None));
    };
}

/// Installs the compare timer and coils in the `IGNITION` slot declared by
/// [`init_ignition!`].
///
/// # Example
/// ```rust,ignore
/// fn main() {
///     setup_ignition!(compare, CoilPins::new(coils, None));
/// }
/// ```
#[macro_export]
macro_rules! setup_ignition {
    ( $cmp:expr, $coils:expr ) => {
        $crate::timer::global_ignition_setup(&IGNITION, $cmp, $coils)
    };
}

/// Declares a static `EDGE_CAPTURE` slot protected by a `critical_section` mutex.
///
/// # Arguments
/// - `$clk`: the counter handle type (must implement `MicrosClock`)
/// - `$primary`: the crank input pin type (must implement `InputPin`)
/// - `$secondary`: the cam input pin type (must implement `InputPin`)
///
/// # Example
/// ```rust,ignore
/// init_edge_capture!(&'static Tim2Clock, PA0<Input>, PA1<Input>);
/// ```
#[macro_export]
macro_rules! init_edge_capture {
    ( $clk:ty, $primary:ty, $secondary:ty ) => {
        pub static EDGE_CAPTURE: $crate::timer::CaptureSlot<$clk, $primary, $secondary> =
            $crate::critical_section::Mutex::new(::core::cell::RefCell::new(None));
    };
}

/// Installs the counter handle and sensor inputs in the `EDGE_CAPTURE` slot declared by
/// [`init_edge_capture!`].
#[macro_export]
macro_rules! setup_edge_capture {
    ( $clk:expr, $primary:expr, $secondary:expr ) => {
        $crate::timer::global_capture_setup(&EDGE_CAPTURE, $clk, $primary, $secondary)
    };
}

/// Routes a compare match for one channel to the `IGNITION` slot.
///
/// `$clk` is the counter the compare registers run on. Expands to a
/// `Result<CompareOutcome, Fault>`. A fault has already been latched in `ECU` and the bank
/// shut down, so the ISR may ignore it.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM2() {
///     if tim2_cc1_pending() {
///         clear_tim2_cc1();
///         let _ = compare_match_isr!(CLOCK, IgnitionChannel::Ch1);
///     }
/// }
/// ```
///
/// # Notes
/// - Assumes `IGNITION` and `ECU` were declared with [`init_ignition!`] and
///   [`init_ecu_shared!`].
/// - Clearing the compare flag stays with the caller.
#[macro_export]
macro_rules! compare_match_isr {
    ( $clk:expr, $channel:expr ) => {
        $crate::timer::global_compare_match(&IGNITION, &ECU, &$clk, $channel)
    };
}

/// Captures an edge into `ECU` through the `EDGE_CAPTURE` slot.
///
/// Expands to a `Result<TriggerEvent, CaptureError>`.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn EXTI0() {
///     clear_exti0_pending();
///     let _ = edge_isr!(SensorLine::Primary);
/// }
/// ```
///
/// # Notes
/// - The pin-change flag must be cleared by the ISR itself, before or after this call.
/// - A full queue drops the edge and counts it; it is safe to ignore the error.
#[macro_export]
macro_rules! edge_isr {
    ( $line:expr ) => {
        $crate::timer::global_edge_isr(&EDGE_CAPTURE, &ECU, $line)
    };
}
