//! Raspberry Pi GPIO pin bank.

use rppal::gpio::{Gpio, OutputPin};

use crate::actuator::pins::{PinAssignment, LINE_COUNT};
use crate::actuator::{PinBank, PinState};
use crate::error::PinError;

/// Four output lines driven through rppal. Lines start low.
pub struct RppalPinBank {
    outputs: Option<[OutputPin; LINE_COUNT]>,
    levels: PinState,
}

impl RppalPinBank {
    pub fn open(assignment: &PinAssignment) -> Result<Self, PinError> {
        let gpio = Gpio::new().map_err(|e| PinError::Unavailable(e.to_string()))?;
        let mut outputs = Vec::with_capacity(LINE_COUNT);
        for line in assignment.lines() {
            let pin = gpio
                .get(line)
                .map_err(|e| PinError::Unavailable(format!("gpio {}: {}", line, e)))?;
            outputs.push(pin.into_output_low());
        }
        let outputs: [OutputPin; LINE_COUNT] = outputs
            .try_into()
            .map_err(|_| PinError::Unavailable("pin bank incomplete".to_string()))?;
        log::info!("RppalPinBank: claimed gpio lines {:?}", assignment.lines());
        Ok(Self {
            outputs: Some(outputs),
            levels: PinState::INACTIVE,
        })
    }
}

impl PinBank for RppalPinBank {
    fn name(&self) -> &'static str {
        "rppal"
    }

    fn write_batch(&mut self, state: &PinState) -> Result<(), PinError> {
        let outputs = self.outputs.as_mut().ok_or(PinError::Released)?;
        let target = state.lines();
        let previous = self.levels.lines();
        // Falling edges first: a side never has both inputs high mid-batch.
        for (i, output) in outputs.iter_mut().enumerate() {
            if previous[i] && !target[i] {
                output.set_low();
            }
        }
        for (i, output) in outputs.iter_mut().enumerate() {
            if target[i] && !previous[i] {
                output.set_high();
            }
        }
        self.levels = *state;
        Ok(())
    }

    fn release(&mut self) -> Result<(), PinError> {
        let mut outputs = self.outputs.take().ok_or(PinError::Released)?;
        for output in outputs.iter_mut() {
            output.set_low();
        }
        self.levels = PinState::INACTIVE;
        // Dropping the pins restores their previous mode.
        drop(outputs);
        log::info!("RppalPinBank: gpio lines released");
        Ok(())
    }
}
