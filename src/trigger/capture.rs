use embedded_hal::digital::InputPin;

use crate::error::CaptureError;
use crate::shared::EcuShared;
use crate::timer::MicrosClock;
use crate::trigger::{LineLevels, SensorLine, TriggerEvent};

/// Interrupt-side half of the trigger decoder.
///
/// Owns the two sensor inputs and a handle to the microsecond counter. Its only job is to
/// turn a pin-change interrupt into a [`TriggerEvent`] on the shared queue as fast as
/// possible.
#[derive(Debug)]
pub struct EdgeCapture<CLK, P, S> {
    clock: CLK,
    primary: P,
    secondary: S,
}

impl<CLK, P, S> EdgeCapture<CLK, P, S>
where
    CLK: MicrosClock,
    P: InputPin,
    S: InputPin,
{
    /// Takes the counter handle and both sensor lines.
    pub fn new(clock: CLK, primary: P, secondary: S) -> Self {
        Self {
            clock,
            primary,
            secondary,
        }
    }

    /// Handles an edge on `line`.
    ///
    /// Reads the counter before anything else, then samples both lines, classifies the edge
    /// from the level of `line` and queues it. On a full queue the edge is dropped and
    /// counted in `shared`; the caller may ignore the error.
    pub fn on_edge<const Q: usize>(
        &mut self,
        line: SensorLine,
        shared: &EcuShared<Q>,
    ) -> Result<TriggerEvent, CaptureError> {
        let timestamp = self.clock.now_micros();
        let primary = self
            .primary
            .is_high()
            .map_err(|_| CaptureError::LineRead(SensorLine::Primary))?;
        let secondary = self
            .secondary
            .is_high()
            .map_err(|_| CaptureError::LineRead(SensorLine::Secondary))?;
        let event = TriggerEvent::from_samples(timestamp, line, LineLevels { primary, secondary });
        shared.push_event(event)?;
        Ok(event)
    }

    /// Mutable access to the crank input.
    pub fn primary_mut(&mut self) -> &mut P {
        &mut self.primary
    }

    /// Mutable access to the cam input.
    pub fn secondary_mut(&mut self) -> &mut S {
        &mut self.secondary
    }

    /// Gives back the counter handle and both inputs.
    pub fn release(self) -> (CLK, P, S) {
        (self.clock, self.primary, self.secondary)
    }
}
