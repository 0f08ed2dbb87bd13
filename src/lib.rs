//! # ecu-core
//!
//! A portable, no_std engine control core for spark-ignition engines with a crank/cam
//! trigger pair.
//!
//! The crate turns raw sensor edges into a synchronized engine-angle clock and uses that
//! clock to fire ignition coils at precise absolute times on hardware compare channels:
//! - `embedded-hal` traits for the sensor inputs, coil outputs and blocking delay
//! - a trigger decoder that finds and keeps sync on an 8-edge crank / 4-edge cam pattern
//! - a per-channel `Off → Pending → Running` ignition scheduler driven by compare matches
//! - an engine regime state machine (stopped / cranking / running)
//! - interrupt-safe shared state with `critical-section`
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Builds against `std` |
//! | `timer-isr` (default) | Global-slot helpers and macros for wiring interrupts to statics |
//! | `delay-loop`          | Blocking `run_ecu_loop` on an `embedded_hal::delay::DelayNs` |
//! | `defmt-0-3`           | Uses `defmt` logging; public types derive `defmt::Format` |
//! | `log`                 | Uses `log` logging |
//!
//! ## Architecture
//!
//! ```text
//!  edge ISR ──► EdgeCapture ──► EcuShared queue ──► DecoderTask ──► TriggerDecoder
//!                                                                        │ timing
//!  EngineController ──requests──► SchedulerTask ──arm──► IgnitionBank ◄──┘
//!         ▲                                                  │ compare ISR
//!         └───────────────────── completions ◄───────────────┘
//! ```
//!
//! Interrupts only timestamp, classify and advance channel state. Everything else runs
//! in task context through [`runtime::EcuTasks::poll`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ecu_core::config::{EngineThresholds, IgnitionCalibration};
//! use ecu_core::ignition::{CoilPins, IgnitionChannel};
//! use ecu_core::runtime::EcuTasks;
//! use ecu_core::trigger::{NoMarker, SensorLine};
//! use ecu_core::{
//!     compare_match_isr, edge_isr, init_ecu_shared, init_edge_capture, init_ignition,
//!     setup_edge_capture, setup_ignition,
//! };
//!
//! init_ecu_shared!();
//! init_ignition!(Tim2Compare, CoilPins<ErasedPin<Output>>);
//! init_edge_capture!(&'static Tim2Clock, PA0<Input>, PA1<Input>);
//!
//! #[interrupt]
//! fn EXTI0() {
//!     let _ = edge_isr!(SensorLine::Primary);
//! }
//!
//! #[interrupt]
//! fn TIM2() {
//!     let _ = compare_match_isr!(CLOCK, IgnitionChannel::Ch1);
//! }
//!
//! fn main() -> ! {
//!     setup_ignition!(compare, CoilPins::new(coils, None));
//!     setup_edge_capture!(&CLOCK, crank, cam);
//!     let mut tasks = EcuTasks::new(
//!         &ECU,
//!         &IGNITION,
//!         &CLOCK,
//!         IgnitionCalibration::DEFAULT,
//!         EngineThresholds::DEFAULT,
//!         None::<NoMarker>,
//!     )
//!     .unwrap();
//!     loop {
//!         if !matches!(tasks.poll(), Ok(true)) {
//!             cortex_m::asm::wfi();
//!         }
//!     }
//! }
//! ```
//!
//! Or, with `delay-loop`, hand the tasks to `run_ecu_loop()`:
//!
//! ```rust,ignore
//! let fault = ecu_core::timer::run_ecu_loop(&mut tasks, &mut delay, 50);
//! ```
//!
//! ## Integration Notes
//!
//! - The microsecond counter must be free-running and 32 bits wide; it may wrap.
//! - Compare interrupts should outrank the edge interrupt; both outrank the tasks.
//! - Only one engine instance should be wired to the global slots at a time.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod fmt;

pub use critical_section;
pub use heapless;

pub mod config;
pub mod consts;
pub mod engine;
pub mod error;
pub mod ignition;
pub mod runtime;
pub mod shared;
pub mod supervisor;
pub mod timer;
pub mod trigger;
