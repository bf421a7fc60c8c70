//! Tank-drive actuator.
//!
//! `Actuator` is the only owner of the pin bank. Callers see one operation,
//! `apply(Direction)`, which writes the full pin pattern for that direction
//! inside a single critical section. Concurrent commands are therefore
//! linearized: one batch completes before the next begins.

mod banks;
mod direction;
pub mod pins;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use banks::{MemoryPinBank, PinProbe};
#[cfg(feature = "gpio-rppal")]
pub use banks::RppalPinBank;
pub use direction::Direction;
pub use pins::{PinAssignment, PinBackendKind, PinState};

use crate::config::PinSettings;
use crate::error::PinError;

/// Hardware seam for the four driver inputs.
///
/// Implementations apply a whole `PinState` per call. They are only ever
/// driven from inside the actuator's lock.
pub trait PinBank: Send {
    fn name(&self) -> &'static str;

    /// Set every line to the given levels.
    fn write_batch(&mut self, state: &PinState) -> Result<(), PinError>;

    /// Return the lines to the system. Called once; later writes fail.
    fn release(&mut self) -> Result<(), PinError>;
}

/// Open the pin bank selected by configuration.
pub fn open_pin_bank(settings: &PinSettings) -> Result<Box<dyn PinBank>, PinError> {
    settings.assignment.validate()?;
    match settings.backend {
        PinBackendKind::Memory => {
            log::info!(
                "pin bank: in-memory simulation for lines {:?}",
                settings.assignment.lines()
            );
            Ok(Box::new(MemoryPinBank::new()))
        }
        #[cfg(feature = "gpio-rppal")]
        PinBackendKind::Rppal => Ok(Box::new(RppalPinBank::open(&settings.assignment)?)),
        #[cfg(not(feature = "gpio-rppal"))]
        PinBackendKind::Rppal => Err(PinError::Unavailable(
            "rppal backend requires the gpio-rppal feature".to_string(),
        )),
    }
}

struct DriveState {
    bank: Box<dyn PinBank>,
    direction: Direction,
    pins: PinState,
    released: bool,
}

/// Direction state machine over a pin bank.
pub struct Actuator {
    state: Mutex<DriveState>,
}

impl Actuator {
    /// Take ownership of a bank and drive it to the inactive state.
    pub fn new(mut bank: Box<dyn PinBank>) -> Result<Self, PinError> {
        bank.write_batch(&PinState::INACTIVE)?;
        Ok(Self {
            state: Mutex::new(DriveState {
                bank,
                direction: Direction::Stop,
                pins: PinState::INACTIVE,
                released: false,
            }),
        })
    }

    /// Apply a direction. Every transition is allowed; repeating a direction
    /// rewrites the same pattern.
    pub fn apply(&self, direction: Direction) -> Result<PinState, PinError> {
        let mut state = self.lock();
        if state.released {
            return Err(PinError::Released);
        }
        let target = direction.pin_state();
        if let Err(err) = state.bank.write_batch(&target) {
            log::error!("actuator: {} batch failed: {}", direction, err);
            if state.bank.write_batch(&PinState::INACTIVE).is_ok() {
                state.direction = Direction::Stop;
                state.pins = PinState::INACTIVE;
            }
            return Err(err);
        }
        if state.direction != direction {
            log::debug!("actuator: {} -> {}", state.direction, direction);
        }
        state.direction = direction;
        state.pins = target;
        Ok(target)
    }

    pub fn current(&self) -> Direction {
        self.lock().direction
    }

    pub fn pin_state(&self) -> PinState {
        self.lock().pins
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Drive all lines inactive and release the bank.
    ///
    /// Returns `Ok(true)` for the call that performed the release and
    /// `Ok(false)` for any later call.
    pub fn release(&self) -> Result<bool, PinError> {
        let mut state = self.lock();
        if state.released {
            return Ok(false);
        }
        state.released = true;
        if let Err(err) = state.bank.write_batch(&PinState::INACTIVE) {
            log::warn!("actuator: final stop before release failed: {}", err);
        }
        state.direction = Direction::Stop;
        state.pins = PinState::INACTIVE;
        state.bank.release()?;
        log::info!("actuator: {} pin bank released", state.bank.name());
        Ok(true)
    }

    // A panic elsewhere must not leave the motors unstoppable.
    fn lock(&self) -> MutexGuard<'_, DriveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
