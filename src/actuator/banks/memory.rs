use std::sync::{Arc, Mutex, PoisonError};

use crate::actuator::{PinBank, PinState};
use crate::error::PinError;

#[derive(Debug, Default)]
struct MemoryPins {
    current: PinState,
    history: Vec<PinState>,
    releases: u32,
}

/// In-memory pin bank. Every batch is recorded so the sequence of
/// externally visible states can be inspected through a `PinProbe`.
#[derive(Debug, Default)]
pub struct MemoryPinBank {
    shared: Arc<Mutex<MemoryPins>>,
    released: bool,
}

/// Read-only view onto a `MemoryPinBank`, usable after the bank has been
/// moved into an actuator.
#[derive(Clone, Debug)]
pub struct PinProbe {
    shared: Arc<Mutex<MemoryPins>>,
}

impl MemoryPinBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> PinProbe {
        PinProbe {
            shared: self.shared.clone(),
        }
    }
}

impl PinBank for MemoryPinBank {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn write_batch(&mut self, state: &PinState) -> Result<(), PinError> {
        if self.released {
            return Err(PinError::Released);
        }
        let mut pins = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        pins.current = *state;
        pins.history.push(*state);
        Ok(())
    }

    fn release(&mut self) -> Result<(), PinError> {
        if self.released {
            return Err(PinError::Released);
        }
        self.released = true;
        let mut pins = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        pins.releases += 1;
        Ok(())
    }
}

impl PinProbe {
    pub fn current(&self) -> PinState {
        self.shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
    }

    /// Every batch written, in order.
    pub fn history(&self) -> Vec<PinState> {
        self.shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .clone()
    }

    pub fn release_count(&self) -> u32 {
        self.shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .releases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::Direction;

    #[test]
    fn records_batches_and_refuses_writes_after_release() {
        let mut bank = MemoryPinBank::new();
        let probe = bank.probe();

        bank.write_batch(&Direction::Forward.pin_state()).unwrap();
        assert_eq!(probe.current(), Direction::Forward.pin_state());

        bank.release().unwrap();
        assert!(matches!(
            bank.write_batch(&Direction::Left.pin_state()),
            Err(PinError::Released)
        ));
        assert!(bank.release().is_err());
        assert_eq!(probe.release_count(), 1);
        assert_eq!(probe.history().len(), 1);
    }
}
