use async_trait::async_trait;
use std::time::Duration;

/// Capabilities of a servo bus used by the guard and the REPL.
///
/// Implementations own the transport. Errors are opaque to callers and are
/// reported as transport failures.
#[async_trait]
pub trait ServoBus: Send {
    /// Move `servo_id` to `position` over `duration`.
    async fn set_position(
        &mut self,
        servo_id: u8,
        position: i32,
        duration: Duration,
    ) -> anyhow::Result<()>;

    async fn read_position(&mut self, servo_id: u8) -> anyhow::Result<i32>;

    /// Power off the motor so the horn can be moved by hand.
    async fn unload(&mut self, servo_id: u8) -> anyhow::Result<()>;
}

