use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::bus::ServoBus;
use crate::limits::{LimitTable, OutOfRange};

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error(transparent)]
    OutOfRange(#[from] OutOfRange),
    /// Anything the bus reports. Timeouts, disconnects and device argument
    /// errors all land here.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Converts a move duration given in seconds.
///
/// Zero is accepted and lets the servo move as fast as it can.
pub fn move_duration(duration_seconds: f64) -> Result<Duration, GuardError> {
    if duration_seconds.is_nan() || duration_seconds < 0.0 {
        return Err(GuardError::InvalidArgument(format!(
            "Move time must be a non-negative number of seconds, got {}",
            duration_seconds
        )));
    }
    Duration::try_from_secs_f64(duration_seconds).map_err(|_| {
        GuardError::InvalidArgument(format!("Move time {}s is too long", duration_seconds))
    })
}

/// Servo bus wrapper that refuses moves outside the configured limits.
pub struct GuardedBusClient<B> {
    bus: B,
    limits: LimitTable,
}

impl<B: ServoBus> GuardedBusClient<B> {
    pub fn new(bus: B, limits: LimitTable) -> GuardedBusClient<B> {
        GuardedBusClient { bus, limits }
    }

    pub fn limits(&self) -> &LimitTable {
        &self.limits
    }

    pub fn into_inner(self) -> B {
        self.bus
    }

    /// Validates and forwards a move. Rejected moves never reach the bus.
    pub async fn set_position(
        &mut self,
        servo_id: u8,
        position: i32,
        duration_seconds: f64,
    ) -> Result<(), GuardError> {
        let duration = move_duration(duration_seconds)?;
        if let Err(err) = self.limits.check(servo_id, position) {
            warn!("rejected move: {}", err);
            return Err(err.into());
        }
        debug!(
            "moving servo {} to {} over {:?}",
            servo_id, position, duration
        );
        self.bus.set_position(servo_id, position, duration).await?;
        Ok(())
    }

    pub async fn read_position(&mut self, servo_id: u8) -> Result<i32, GuardError> {
        Ok(self.bus.read_position(servo_id).await?)
    }

    pub async fn unload(&mut self, servo_id: u8) -> Result<(), GuardError> {
        Ok(self.bus.unload(servo_id).await?)
    }
}
