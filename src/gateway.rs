use std::sync::Arc;

use crate::actuator::{Actuator, Direction};
use crate::error::PinError;

/// Result of one drive command.
#[derive(Debug)]
pub enum CommandOutcome {
    Applied(Direction),
    /// The token named no direction; the rover was stopped instead.
    Unrecognized(String),
    /// The actuator refused the write (released or hardware fault).
    Failed(PinError),
}

impl CommandOutcome {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Self::Applied(direction) => Some(*direction),
            _ => None,
        }
    }
}

/// Translates command tokens into actuator transitions.
///
/// Holds nothing but the actuator, so commands never wait on capture,
/// inference or encoding.
#[derive(Clone)]
pub struct CommandGateway {
    actuator: Arc<Actuator>,
}

impl CommandGateway {
    pub fn new(actuator: Arc<Actuator>) -> Self {
        Self { actuator }
    }

    pub fn actuator(&self) -> &Arc<Actuator> {
        &self.actuator
    }

    pub fn handle(&self, token: &str) -> CommandOutcome {
        match token.parse::<Direction>() {
            Ok(direction) => self.apply(direction),
            Err(_) => {
                log::warn!("gateway: unknown command '{}', stopping", token);
                if let Err(err) = self.actuator.apply(Direction::Stop) {
                    return CommandOutcome::Failed(err);
                }
                CommandOutcome::Unrecognized(token.to_string())
            }
        }
    }

    pub fn apply(&self, direction: Direction) -> CommandOutcome {
        match self.actuator.apply(direction) {
            Ok(_) => {
                log::info!("gateway: {}", direction);
                CommandOutcome::Applied(direction)
            }
            Err(err) => {
                log::warn!("gateway: {} rejected: {}", direction, err);
                CommandOutcome::Failed(err)
            }
        }
    }
}
