use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt};
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, warn};

use anyhow::{self, Result};

use crate::instructions::{calc_checksum, Instruction, HEADER};

#[derive(Error, Debug)]
#[non_exhaustive]
pub(crate) enum SerialPortError {
    #[error("connection timeout")]
    Timeout,
    #[error("reading error")]
    ReadingError,
}

#[derive(PartialEq, Debug)]
pub(crate) struct Status {
    id: u8,
    command: u8,
    params: Vec<u8>,
}

impl Status {
    pub(crate) fn new(id: u8, command: u8, params: Vec<u8>) -> Status {
        Status {
            id,
            command,
            params,
        }
    }

    pub(crate) fn id(&self) -> u8 {
        self.id
    }

    pub(crate) fn command(&self) -> u8 {
        self.command
    }

    pub(crate) fn param(&self, index: usize) -> Option<u8> {
        self.params.get(index).copied()
    }
}

/// Frame codec for the LewanSoul bus.
///
/// The decoder resynchronises on the `0x55 0x55` header and skips frames with a
/// bad checksum instead of failing, since a codec error ends the framed stream.
pub(crate) struct LewansoulProtocol;

impl Decoder for LewansoulProtocol {
    type Item = Status;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match src.windows(2).position(|pair| pair == [HEADER, HEADER]) {
                Some(offset) => src.advance(offset),
                None => {
                    // a lone trailing header byte may be the start of the next frame
                    let keep = usize::from(src.last() == Some(&HEADER));
                    let garbage = src.len() - keep;
                    src.advance(garbage);
                    return Ok(None);
                }
            }
            if src.len() < 4 {
                return Ok(None);
            }
            let len = src[3] as usize;
            if len < 3 {
                warn!("dropping frame with invalid length {}", len);
                src.advance(1);
                continue;
            }
            if src.len() < 3 + len {
                return Ok(None);
            }
            let checksum = calc_checksum(&src[2..2 + len]);
            if checksum != src[2 + len] {
                warn!("bad checksum on frame {:?}", &src[..3 + len]);
                src.advance(1);
                continue;
            }
            let message = src.split_to(3 + len);
            let status = Status::new(
                message[2],
                message[4],
                message[5..message.len() - 1].to_vec(),
            );
            debug!("received {:?}", status);
            return Ok(Some(status));
        }
    }
}

impl Encoder<Instruction> for LewansoulProtocol {
    type Error = anyhow::Error;

    fn encode(&mut self, data: Instruction, buf: &mut BytesMut) -> Result<()> {
        let msg = data.serialize();
        buf.reserve(msg.len());
        buf.put(msg.as_ref());
        Ok(())
    }
}

#[async_trait]
pub(crate) trait FramedDriver: Send {
    /// Drops received bytes that have not been read yet.
    fn clear_input(&mut self) -> Result<()>;
    async fn send(&mut self, instruction: Instruction) -> Result<()>;
    async fn receive(&mut self) -> Result<Status>;
}

pub(crate) const TIMEOUT: u64 = 100;

pub(crate) struct FramedSerialDriver {
    framed_port: Framed<tokio_serial::SerialStream, LewansoulProtocol>,
}

impl FramedSerialDriver {
    pub(crate) fn with_baud_rate(port: &str, baud_rate: u32) -> Result<FramedSerialDriver> {
        let serial_port = tokio_serial::new(port, baud_rate)
            .timeout(Duration::from_millis(TIMEOUT))
            .open_native_async()?;
        Ok(FramedSerialDriver {
            framed_port: Framed::new(serial_port, LewansoulProtocol),
        })
    }
}

#[async_trait]
impl FramedDriver for FramedSerialDriver {
    fn clear_input(&mut self) -> Result<()> {
        self.framed_port.get_ref().clear(ClearBuffer::Input)?;
        self.framed_port.read_buffer_mut().clear();
        Ok(())
    }

    async fn send(&mut self, instruction: Instruction) -> Result<()> {
        debug!("sending {}", instruction);
        self.framed_port.send(instruction).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Status> {
        let response = timeout(Duration::from_millis(TIMEOUT), self.framed_port.next())
            .await
            .map_err(|_| SerialPortError::Timeout)?
            .ok_or(SerialPortError::ReadingError)??;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_message_decode() {
        let mut payload =
            BytesMut::from(vec![0x55, 0x55, 0x04, 0x05, 0x1C, 0xF4, 0x01, 0xE5].as_slice());
        let mut codec = LewansoulProtocol {};
        let res = codec.decode(&mut payload).unwrap().unwrap();
        assert_eq!(res, Status::new(4, 28, vec![0xF4, 0x01]));
        assert!(payload.is_empty());
    }

    #[test]
    fn test_partial_message_waits() {
        let mut payload = BytesMut::from(vec![0x55, 0x55, 0x04, 0x05, 0x1C].as_slice());
        let mut codec = LewansoulProtocol {};
        assert!(codec.decode(&mut payload).unwrap().is_none());
        payload.extend_from_slice(&[0xF4, 0x01, 0xE5]);
        let res = codec.decode(&mut payload).unwrap().unwrap();
        assert_eq!(res.param(0), Some(0xF4));
        assert_eq!(res.param(1), Some(0x01));
        assert_eq!(res.param(2), None);
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut payload = BytesMut::from(
            vec![0x00, 0x13, 0x55, 0x55, 0x55, 0x04, 0x05, 0x1C, 0xF4, 0x01, 0xE5].as_slice(),
        );
        let mut codec = LewansoulProtocol {};
        let res = codec.decode(&mut payload).unwrap().unwrap();
        assert_eq!(res, Status::new(4, 28, vec![0xF4, 0x01]));
        assert!(payload.is_empty());
    }

    #[test]
    fn test_garbage_without_header_is_discarded() {
        let mut payload = BytesMut::from(vec![0x01, 0x02, 0x03, 0x55].as_slice());
        let mut codec = LewansoulProtocol {};
        assert!(codec.decode(&mut payload).unwrap().is_none());
        assert_eq!(payload.as_ref(), &[0x55]);
    }

    #[test]
    fn test_bad_checksum_is_dropped() {
        let mut payload = BytesMut::from(
            vec![
                0x55, 0x55, 0x04, 0x05, 0x1C, 0xF4, 0x01, 0x00, // corrupt
                0x55, 0x55, 0x04, 0x05, 0x1C, 0xF4, 0x01, 0xE5,
            ]
            .as_slice(),
        );
        let mut codec = LewansoulProtocol {};
        let res = codec.decode(&mut payload).unwrap().unwrap();
        assert_eq!(res, Status::new(4, 28, vec![0xF4, 0x01]));
        assert!(payload.is_empty());
    }

    #[test]
    fn test_encode_move() {
        let mut buf = BytesMut::new();
        let mut codec = LewansoulProtocol {};
        codec
            .encode(Instruction::move_time_write(1, 500, 1000), &mut buf)
            .unwrap();
        assert_eq!(
            buf.as_ref(),
            &[0x55, 0x55, 0x01, 0x07, 0x01, 0xF4, 0x01, 0xE8, 0x03, 0x16]
        );
    }
}
