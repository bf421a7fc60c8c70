use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::pins::PinState;

/// Logical drive command. The only vocabulary the actuator accepts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    #[default]
    Stop,
}

impl Direction {
    pub const ALL: [Direction; 5] = [
        Direction::Forward,
        Direction::Backward,
        Direction::Left,
        Direction::Right,
        Direction::Stop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Stop => "stop",
        }
    }

    /// Pin pattern for a tank drive wired IN1..IN4 as
    /// left-forward, left-reverse, right-forward, right-reverse.
    pub fn pin_state(self) -> PinState {
        match self {
            Direction::Forward => PinState::new([true, false, true, false]),
            Direction::Backward => PinState::new([false, true, false, true]),
            // Tank turns: one side reverses while the other drives forward.
            Direction::Left => PinState::new([false, true, true, false]),
            Direction::Right => PinState::new([true, false, false, true]),
            Direction::Stop => PinState::INACTIVE,
        }
    }

    /// Short acknowledgement body for the per-direction HTTP routes.
    pub fn ack(&self) -> &'static str {
        match self {
            Direction::Forward => "Forward OK",
            Direction::Backward => "Backward OK",
            Direction::Left => "Left OK",
            Direction::Right => "Right OK",
            Direction::Stop => "Stop OK",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let token = value.trim();
        Direction::ALL
            .into_iter()
            .find(|direction| direction.as_str().eq_ignore_ascii_case(token))
            .ok_or_else(|| anyhow!("unknown direction '{}'", token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tokens_case_insensitively() {
        assert_eq!("forward".parse::<Direction>().unwrap(), Direction::Forward);
        assert_eq!(" LEFT ".parse::<Direction>().unwrap(), Direction::Left);
        assert!("sideways".parse::<Direction>().is_err());
        assert!("".parse::<Direction>().is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for direction in Direction::ALL {
            assert_eq!(direction.to_string().parse::<Direction>().unwrap(), direction);
        }
    }

    #[test]
    fn serializes_as_lowercase_token() {
        let json = serde_json::to_string(&Direction::Backward).unwrap();
        assert_eq!(json, r#""backward""#);
    }
}
