use std::future::Future;
use std::io::{self, Write};
use std::str::FromStr;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{error, info, warn};

use crate::bus::ServoBus;
use crate::guard::{GuardError, GuardedBusClient};
use crate::instructions::MAX_SERVO_ID;

/// Move time used when a command only names a position.
pub const DEFAULT_MOVE_SECONDS: f64 = 1.0;

const USAGE: &str = "Commands:
  select <id>        - Switch to servo ID
  <position>         - Move to position (1s default)
  <position> <time>  - Move to position in time seconds
  pos                - Read current position
  off                - Power off (unload) the servo
  help               - Show this list
  Ctrl+C             - Exit";

#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("Invalid format. Use: position, position time, or select <id>")]
    InvalidFormat,
    #[error("Invalid input. Please enter numbers only.")]
    InvalidNumber,
    #[error("Invalid servo id {0}. Servo id must be 0-{}", MAX_SERVO_ID)]
    InvalidServoId(i64),
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Command {
    Empty,
    Select(u8),
    Move { position: i32, duration_seconds: f64 },
    ReadPosition,
    Unload,
    Help,
}

fn number<T: FromStr>(token: &str) -> Result<T, CommandError> {
    token.parse().map_err(|_| CommandError::InvalidNumber)
}

fn is_any(token: &str, keywords: &[&str]) -> bool {
    keywords
        .iter()
        .any(|keyword| token.eq_ignore_ascii_case(keyword))
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [] => Ok(Command::Empty),
            [keyword, id] if keyword.eq_ignore_ascii_case("select") => {
                let id: i64 = number(id)?;
                match u8::try_from(id) {
                    Ok(id) if id <= MAX_SERVO_ID => Ok(Command::Select(id)),
                    _ => Err(CommandError::InvalidServoId(id)),
                }
            }
            [keyword] if keyword.eq_ignore_ascii_case("select") => {
                Err(CommandError::InvalidFormat)
            }
            [keyword] if is_any(keyword, &["pos", "read"]) => Ok(Command::ReadPosition),
            [keyword] if is_any(keyword, &["off", "unload"]) => Ok(Command::Unload),
            [keyword] if keyword.eq_ignore_ascii_case("help") => Ok(Command::Help),
            [position] => Ok(Command::Move {
                position: number(position)?,
                duration_seconds: DEFAULT_MOVE_SECONDS,
            }),
            [position, time] => Ok(Command::Move {
                position: number(position)?,
                duration_seconds: number(time)?,
            }),
            _ => Err(CommandError::InvalidFormat),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub initial_servo_id: u8,
    /// Power off the selected servo when the session ends.
    pub unload_on_exit: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            initial_servo_id: 4,
            unload_on_exit: false,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
enum SessionState {
    Running,
    Terminated,
}

/// Interactive command loop over a guarded bus.
///
/// Every line is handled to completion before the next one is read, and no
/// command failure ends the session. Only the shutdown signal or the end of
/// input does.
pub struct Session<B> {
    client: GuardedBusClient<B>,
    selected_servo_id: u8,
    unload_on_exit: bool,
    state: SessionState,
}

impl<B: ServoBus> Session<B> {
    pub fn new(client: GuardedBusClient<B>, config: SessionConfig) -> Session<B> {
        Session {
            client,
            selected_servo_id: config.initial_servo_id,
            unload_on_exit: config.unload_on_exit,
            state: SessionState::Running,
        }
    }

    pub fn selected_servo_id(&self) -> u8 {
        self.selected_servo_id
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn into_client(self) -> GuardedBusClient<B> {
        self.client
    }

    /// Reads commands from `input` until `shutdown` resolves or input ends.
    ///
    /// `shutdown` only interrupts waiting for a line; a move already sent to
    /// the bus is awaited to completion.
    pub async fn run<R, W, S>(&mut self, input: R, out: &mut W, shutdown: S) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: Write,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut lines = BufReader::new(input).lines();
        writeln!(out, "Servo Control Interface")?;
        writeln!(out, "{}", USAGE)?;
        let current = self.client.limits().describe(self.selected_servo_id);
        writeln!(out, "\nCurrent: {}\n", current)?;

        while self.is_running() {
            write!(out, "[Servo {}] > ", self.selected_servo_id)?;
            out.flush()?;
            tokio::select! {
                _ = &mut shutdown => {
                    info!("interrupted");
                    self.terminate(out).await?;
                }
                line = lines.next_line() => {
                    match line? {
                        Some(line) => self.execute(&line, out).await?,
                        None => {
                            info!("input closed");
                            self.terminate(out).await?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Handles one input line. Only console write failures are returned.
    pub async fn execute<W: Write>(&mut self, line: &str, out: &mut W) -> io::Result<()> {
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                warn!("unparsable command {:?}", line);
                return writeln!(out, "{}", err);
            }
        };
        let servo_id = self.selected_servo_id;
        match command {
            Command::Empty => Ok(()),
            Command::Help => writeln!(out, "{}", USAGE),
            Command::Select(new_servo_id) => {
                self.selected_servo_id = new_servo_id;
                info!("selected servo {}", new_servo_id);
                writeln!(out, "{}", self.client.limits().describe(new_servo_id))
            }
            Command::Move {
                position,
                duration_seconds,
            } => {
                // early check for a friendlier message, the client checks again
                if let Err(err) = self.client.limits().check(servo_id, position) {
                    warn!("rejected move: {}", err);
                    writeln!(out, "ERROR: Position {} is out of bounds!", position)?;
                    return writeln!(out, "Allowed range: {} - {}", err.min, err.max);
                }
                match self
                    .client
                    .set_position(servo_id, position, duration_seconds)
                    .await
                {
                    Ok(()) => writeln!(
                        out,
                        "Moving servo {} to {} in {:?}s",
                        servo_id, position, duration_seconds
                    ),
                    Err(err) => report(out, err),
                }
            }
            Command::ReadPosition => match self.client.read_position(servo_id).await {
                Ok(position) => writeln!(out, "Servo {} is at {}", servo_id, position),
                Err(err) => report(out, err),
            },
            Command::Unload => match self.client.unload(servo_id).await {
                Ok(()) => writeln!(out, "Servo {} powered off", servo_id),
                Err(err) => report(out, err),
            },
        }
    }

    async fn terminate<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        self.state = SessionState::Terminated;
        writeln!(out, "\n\nExiting...")?;
        if self.unload_on_exit {
            if let Err(err) = self.client.unload(self.selected_servo_id).await {
                report(out, err)?;
            }
        }
        Ok(())
    }
}

fn report<W: Write>(out: &mut W, err: GuardError) -> io::Result<()> {
    if let GuardError::Transport(ref cause) = err {
        error!("bus error: {:#}", cause);
    }
    writeln!(out, "Error: {}", err)
}
