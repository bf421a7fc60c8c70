#[cfg(feature = "gpio-rppal")]
mod gpio;
mod memory;

#[cfg(feature = "gpio-rppal")]
pub use gpio::RppalPinBank;
pub use memory::{MemoryPinBank, PinProbe};
