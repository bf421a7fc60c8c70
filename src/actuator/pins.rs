use anyhow::{anyhow, Result};
use serde::Serialize;
use std::str::FromStr;

use super::Direction;
use crate::error::PinError;

/// Number of motor-driver input lines (two per side).
pub const LINE_COUNT: usize = 4;

/// Highest BCM line exposed on the 40-pin header.
const MAX_BCM_LINE: u8 = 27;

/// Output levels for the four driver inputs, in
/// `[left_forward, left_reverse, right_forward, right_reverse]` order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PinState([bool; LINE_COUNT]);

impl PinState {
    pub const INACTIVE: PinState = PinState([false; LINE_COUNT]);

    pub(crate) const fn new(lines: [bool; LINE_COUNT]) -> Self {
        Self(lines)
    }

    pub fn lines(&self) -> [bool; LINE_COUNT] {
        self.0
    }

    pub fn active_count(&self) -> usize {
        self.0.iter().filter(|line| **line).count()
    }

    pub fn is_inactive(&self) -> bool {
        self.active_count() == 0
    }

    /// Reverse lookup; `None` for combinations no direction produces.
    pub fn direction(&self) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|direction| direction.pin_state() == *self)
    }
}

/// BCM line numbers for the four driver inputs (IN1..IN4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinAssignment {
    pub left_forward: u8,
    pub left_reverse: u8,
    pub right_forward: u8,
    pub right_reverse: u8,
}

impl PinAssignment {
    pub fn from_lines(lines: [u8; LINE_COUNT]) -> Self {
        Self {
            left_forward: lines[0],
            left_reverse: lines[1],
            right_forward: lines[2],
            right_reverse: lines[3],
        }
    }

    pub fn from_slice(lines: &[u8]) -> Result<Self, PinError> {
        let lines: [u8; LINE_COUNT] = lines.try_into().map_err(|_| {
            PinError::InvalidAssignment(format!(
                "expected {} pin lines, got {}",
                LINE_COUNT,
                lines.len()
            ))
        })?;
        Ok(Self::from_lines(lines))
    }

    pub fn lines(&self) -> [u8; LINE_COUNT] {
        [
            self.left_forward,
            self.left_reverse,
            self.right_forward,
            self.right_reverse,
        ]
    }

    /// Lines must be distinct header GPIOs. Never coerced.
    pub fn validate(&self) -> Result<(), PinError> {
        let lines = self.lines();
        for (i, line) in lines.iter().enumerate() {
            if *line > MAX_BCM_LINE {
                return Err(PinError::InvalidAssignment(format!(
                    "gpio {} is outside the header range 0..={}",
                    line, MAX_BCM_LINE
                )));
            }
            if lines[..i].contains(line) {
                return Err(PinError::InvalidAssignment(format!(
                    "gpio {} assigned to more than one driver input",
                    line
                )));
            }
        }
        Ok(())
    }
}

/// Which pin bank implementation to open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PinBackendKind {
    /// In-memory bank (simulation and tests).
    #[default]
    Memory,
    /// Raspberry Pi GPIO via rppal (feature `gpio-rppal`).
    Rppal,
}

impl FromStr for PinBackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "sim" => Ok(Self::Memory),
            "rppal" | "gpio" => Ok(Self::Rppal),
            other => Err(anyhow!(
                "unknown pin backend '{}'; expected memory or rppal",
                other
            )),
        }
    }
}
