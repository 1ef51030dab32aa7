//! Position-limited control of LewanSoul/Hiwonder bus servos.
//!
//! [`GuardedBusClient`] wraps any [`ServoBus`] and refuses moves outside the
//! per-servo ranges of a [`LimitTable`]. [`Session`] is the interactive loop
//! used by the `servo-repl` binary, and [`LewansoulDriver`] is the serial bus
//! implementation it drives.

mod bus;
mod guard;
mod instructions;
mod limits;
mod serial_driver;
mod session;

pub use bus::ServoBus;
pub use guard::{move_duration, GuardError, GuardedBusClient};
pub use limits::{LimitError, LimitTable, OutOfRange, ServoLimit, UNLIMITED_RANGE};
pub use session::{Command, CommandError, Session, SessionConfig, DEFAULT_MOVE_SECONDS};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use instructions::{
    Instruction, MAX_MOVE_TIME_MS, MAX_POSITION, MAX_SERVO_ID, SERVO_POS_READ,
};
use serial_driver::{FramedDriver, FramedSerialDriver, Status};

pub const DEFAULT_BAUD_RATE: u32 = 115200;

// frames from other servos or our own echo that may precede a reply
const MAX_SKIPPED_FRAMES: usize = 4;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum DriverError {
    #[error("servo id {0} is above the maximum of {}", MAX_SERVO_ID)]
    InvalidServoId(u8),
    #[error("position {0} can not be sent to the servo, expected 0-{}", MAX_POSITION)]
    InvalidPosition(i32),
    #[error("move time {0:?} is above the maximum of {}ms", MAX_MOVE_TIME_MS)]
    InvalidMoveTime(Duration),
    #[error("no reply from servo {0}")]
    MissingReply(u8),
}

pub struct LewansoulDriver {
    port: Box<dyn FramedDriver>,
}

impl LewansoulDriver {
    pub fn new(port_name: &str) -> anyhow::Result<LewansoulDriver> {
        LewansoulDriver::with_baud_rate(port_name, DEFAULT_BAUD_RATE)
    }

    pub fn with_baud_rate(port_name: &str, baud_rate: u32) -> anyhow::Result<LewansoulDriver> {
        let driver = FramedSerialDriver::with_baud_rate(port_name, baud_rate)?;
        Ok(LewansoulDriver {
            port: Box::new(driver),
        })
    }

    #[cfg(test)]
    fn with_driver(driver: Box<dyn FramedDriver>) -> LewansoulDriver {
        LewansoulDriver { port: driver }
    }

    pub async fn move_time_write(
        &mut self,
        id: u8,
        position: u16,
        time: Duration,
    ) -> anyhow::Result<()> {
        check_id(id)?;
        if position > MAX_POSITION {
            return Err(DriverError::InvalidPosition(position as i32).into());
        }
        let time_ms = time.as_millis();
        if time_ms > MAX_MOVE_TIME_MS as u128 {
            return Err(DriverError::InvalidMoveTime(time).into());
        }
        let message = Instruction::move_time_write(id, position, time_ms as u16);
        self.request(message).await
    }

    pub async fn read_position(&mut self, id: u8) -> anyhow::Result<i16> {
        check_id(id)?;
        let message = Instruction::pos_read(id);
        self.request(message).await?;
        let status = self.read_reply(id, SERVO_POS_READ).await?;
        match (status.param(0), status.param(1)) {
            (Some(low), Some(high)) => Ok(i16::from_le_bytes([low, high])),
            _ => Err(DriverError::MissingReply(id).into()),
        }
    }

    pub async fn write_load(&mut self, id: u8, load: bool) -> anyhow::Result<()> {
        check_id(id)?;
        let message = Instruction::load_or_unload_write(id, load);
        self.request(message).await
    }

    /// Sends `message` after dropping whatever is left in the input, so echoes
    /// of earlier writes and replies that arrived after a timeout are never
    /// taken for the answer to this request.
    async fn request(&mut self, message: Instruction) -> anyhow::Result<()> {
        self.port.clear_input()?;
        self.port.send(message).await
    }

    async fn read_reply(&mut self, id: u8, command: u8) -> anyhow::Result<Status> {
        for _ in 0..=MAX_SKIPPED_FRAMES {
            let status = self.port.receive().await?;
            if status.id() == id && status.command() == command && status.param(1).is_some() {
                return Ok(status);
            }
            debug!("skipping unrelated frame {:?}", status);
        }
        Err(DriverError::MissingReply(id).into())
    }
}

fn check_id(id: u8) -> Result<(), DriverError> {
    if id > MAX_SERVO_ID {
        return Err(DriverError::InvalidServoId(id));
    }
    Ok(())
}

#[async_trait]
impl ServoBus for LewansoulDriver {
    async fn set_position(
        &mut self,
        servo_id: u8,
        position: i32,
        duration: Duration,
    ) -> anyhow::Result<()> {
        let position =
            u16::try_from(position).map_err(|_| DriverError::InvalidPosition(position))?;
        self.move_time_write(servo_id, position, duration).await
    }

    async fn read_position(&mut self, servo_id: u8) -> anyhow::Result<i32> {
        Ok(LewansoulDriver::read_position(self, servo_id).await? as i32)
    }

    async fn unload(&mut self, servo_id: u8) -> anyhow::Result<()> {
        self.write_load(servo_id, false).await
    }
}
