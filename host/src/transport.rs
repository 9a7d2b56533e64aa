//! HCI transport over a byte stream using the UART (H4) framing.
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_io_async::{Read, ReadExactError, Write};

use crate::driver::{self, ErrorKind, HciDriver, HciMessageType};

/// Error from a serial transport.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The underlying stream failed.
    Io(E),
    /// The stream ended in the middle of a packet.
    UnexpectedEof,
    /// The packet indicator byte is not a known packet type.
    InvalidIndicator(u8),
    /// The packet does not fit the receive buffer.
    PacketTooLarge(usize),
}

impl<E: embedded_io_async::Error> driver::Error for Error<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(e) => e.kind(),
            Self::UnexpectedEof => ErrorKind::Other,
            Self::InvalidIndicator(_) => ErrorKind::InvalidData,
            Self::PacketTooLarge(_) => ErrorKind::OutOfMemory,
        }
    }
}

impl<E> From<ReadExactError<E>> for Error<E> {
    fn from(e: ReadExactError<E>) -> Self {
        match e {
            ReadExactError::UnexpectedEof => Self::UnexpectedEof,
            ReadExactError::Other(e) => Self::Io(e),
        }
    }
}

/// A HCI transport for controllers attached through a serial line.
///
/// Reader and writer are locked separately, so a pending read does not block commands.
pub struct SerialTransport<M: RawMutex, R, W> {
    reader: Mutex<M, R>,
    writer: Mutex<M, W>,
}

impl<M: RawMutex, R: Read, W: Write<Error = R::Error>> SerialTransport<M, R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

fn header_len(kind: HciMessageType) -> usize {
    match kind {
        HciMessageType::Command => 3,
        HciMessageType::Data => 4,
        HciMessageType::Sync => 3,
        HciMessageType::Event => 2,
        HciMessageType::Iso => 4,
    }
}

fn payload_len(kind: HciMessageType, header: &[u8]) -> usize {
    match kind {
        HciMessageType::Command | HciMessageType::Sync => header[2] as usize,
        HciMessageType::Event => header[1] as usize,
        HciMessageType::Data => u16::from_le_bytes([header[2], header[3]]) as usize,
        HciMessageType::Iso => (u16::from_le_bytes([header[2], header[3]]) & 0x3fff) as usize,
    }
}

impl<M: RawMutex, R: Read, W: Write<Error = R::Error>> HciDriver for SerialTransport<M, R, W> {
    type Error = Error<R::Error>;

    async fn read(&self, buf: &mut [u8]) -> Result<(HciMessageType, usize), Self::Error> {
        let mut reader = self.reader.lock().await;
        let mut indicator = [0; 1];
        reader.read_exact(&mut indicator).await?;
        let kind = HciMessageType::from_indicator(indicator[0]).ok_or(Error::InvalidIndicator(indicator[0]))?;

        let hlen = header_len(kind);
        if buf.len() < hlen {
            return Err(Error::PacketTooLarge(hlen));
        }
        reader.read_exact(&mut buf[..hlen]).await?;
        let plen = payload_len(kind, &buf[..hlen]);
        if buf.len() < hlen + plen {
            return Err(Error::PacketTooLarge(hlen + plen));
        }
        reader.read_exact(&mut buf[hlen..hlen + plen]).await?;
        Ok((kind, hlen + plen))
    }

    async fn write(&self, kind: HciMessageType, data: &[u8]) -> Result<(), Self::Error> {
        let mut writer = self.writer.lock().await;
        writer.write_all(&[kind as u8]).await.map_err(Error::Io)?;
        writer.write_all(data).await.map_err(Error::Io)?;
        writer.flush().await.map_err(Error::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use core::convert::Infallible;

    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embedded_io_async::ErrorType;

    use super::*;

    struct Sink(heapless::Vec<u8, 64>);

    impl ErrorType for Sink {
        type Error = Infallible;
    }

    impl Write for Sink {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            let n = buf.len().min(self.0.capacity() - self.0.len());
            let _ = self.0.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        async fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn reads_events_and_acl_packets() {
        let stream: &[u8] = &[
            0x04, 0x0e, 0x04, 0x01, 0x03, 0x0c, 0x00, // command complete for reset
            0x02, 0x01, 0x20, 0x02, 0x00, 0xaa, 0xbb, // acl
        ];
        let transport: SerialTransport<NoopRawMutex, _, _> = SerialTransport::new(stream, Sink(heapless::Vec::new()));
        let mut buf = [0; 32];
        block_on(async {
            let (kind, len) = transport.read(&mut buf).await.unwrap();
            assert_eq!(kind, HciMessageType::Event);
            assert_eq!(&buf[..len], &[0x0e, 0x04, 0x01, 0x03, 0x0c, 0x00]);

            let (kind, len) = transport.read(&mut buf).await.unwrap();
            assert_eq!(kind, HciMessageType::Data);
            assert_eq!(&buf[..len], &[0x01, 0x20, 0x02, 0x00, 0xaa, 0xbb]);

            assert!(matches!(transport.read(&mut buf).await, Err(Error::UnexpectedEof)));
        });
    }

    #[test]
    fn rejects_garbage() {
        let stream: &[u8] = &[0x07, 0x00];
        let transport: SerialTransport<NoopRawMutex, _, _> = SerialTransport::new(stream, Sink(heapless::Vec::new()));
        let mut buf = [0; 8];
        let r = block_on(transport.read(&mut buf));
        assert!(matches!(r, Err(Error::InvalidIndicator(0x07))));

        let stream: &[u8] = &[0x04, 0x3e, 0x10, 0x00];
        let transport: SerialTransport<NoopRawMutex, _, _> = SerialTransport::new(stream, Sink(heapless::Vec::new()));
        let r = block_on(transport.read(&mut buf));
        assert!(matches!(r, Err(Error::PacketTooLarge(18))));
    }

    #[test]
    fn writes_indicator_before_packet() {
        let stream: &[u8] = &[];
        let transport: SerialTransport<NoopRawMutex, _, _> = SerialTransport::new(stream, Sink(heapless::Vec::new()));
        block_on(transport.write(HciMessageType::Command, &[0x03, 0x0c, 0x00])).unwrap();
        let writer = transport.writer.try_lock().unwrap();
        assert_eq!(&writer.0[..], &[0x01, 0x03, 0x0c, 0x00]);
    }
}
