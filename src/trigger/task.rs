use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};

use crate::shared::EcuShared;
use crate::trigger::{DecodeOutcome, SensorLine};

/// Placeholder for a [`DecoderTask`] without a cycle marker output.
///
/// ```rust
/// use ecu_core::config::TriggerConfig;
/// use ecu_core::shared::EcuShared;
/// use ecu_core::trigger::{DecoderTask, NoMarker};
///
/// let shared: EcuShared = EcuShared::new(TriggerConfig::DEFAULT);
/// let mut task = DecoderTask::new(&shared, None::<NoMarker>);
/// assert_eq!(task.drain(), 0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMarker;

impl ErrorType for NoMarker {
    type Error = Infallible;
}

impl OutputPin for NoMarker {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Task-side half of the trigger decoder.
///
/// Pops edges from the shared queue and applies them to the decoder one at a time. The
/// optional marker output goes HIGH on the first crank edge of each cycle and LOW on the
/// next, which gives a scope a once-per-cycle trigger.
#[derive(Debug)]
pub struct DecoderTask<'a, M: OutputPin, const Q: usize> {
    shared: &'a EcuShared<Q>,
    marker: Option<M>,
    processed: u32,
}

impl<'a, M: OutputPin, const Q: usize> DecoderTask<'a, M, Q> {
    /// Creates the task. Drives the marker LOW if one is given.
    pub fn new(shared: &'a EcuShared<Q>, marker: Option<M>) -> Self {
        let mut marker = marker;
        if let Some(pin) = marker.as_mut() {
            let _ = pin.set_low();
        }
        Self {
            shared,
            marker,
            processed: 0,
        }
    }

    /// Processes one queued edge.
    ///
    /// Returns `WouldBlock` when the queue is empty.
    pub fn poll(&mut self) -> nb::Result<DecodeOutcome, Infallible> {
        let event = self.shared.pop_event().ok_or(nb::Error::WouldBlock)?;
        let (outcome, synced, index, threshold) = self.shared.with_decoder_mut(|decoder| {
            let outcome = decoder.process(&event);
            (
                outcome,
                decoder.has_sync(),
                decoder.primary_index(),
                decoder.config().confidence_threshold,
            )
        });
        self.processed = self.processed.wrapping_add(1);

        match outcome {
            DecodeOutcome::SyncAcquired => {
                info!("trigger sync acquired at {}", event.timestamp)
            }
            DecodeOutcome::SyncLost => {
                warn!("trigger sync lost on {:?} edge at {}", event.line, event.timestamp)
            }
            DecodeOutcome::Confirmed { confidence } if confidence == threshold => {
                info!("trigger timing trusted after {} edges", confidence)
            }
            _ => {}
        }

        if synced && event.line == SensorLine::Primary {
            if let Some(pin) = self.marker.as_mut() {
                match index {
                    0 => {
                        let _ = pin.set_high();
                    }
                    1 => {
                        let _ = pin.set_low();
                    }
                    _ => {}
                }
            }
        }
        Ok(outcome)
    }

    /// Processes every queued edge and returns how many there were.
    pub fn drain(&mut self) -> u32 {
        let mut count = 0;
        while self.poll().is_ok() {
            count += 1;
        }
        count
    }

    /// Edges processed since creation. Wraps.
    pub fn processed(&self) -> u32 {
        self.processed
    }

    /// Mutable access to the marker output.
    pub fn marker_mut(&mut self) -> Option<&mut M> {
        self.marker.as_mut()
    }
}
