//! HCI driver interface.
pub use embedded_io_async::ErrorKind;

///
/// This trait allows generic code to do limited inspecting of errors,
/// to react differently to different kinds.
pub trait Error: core::fmt::Debug {
    /// Get the kind of this error.
    fn kind(&self) -> ErrorKind;
}

impl Error for core::convert::Infallible {
    fn kind(&self) -> ErrorKind {
        match *self {}
    }
}

impl Error for ErrorKind {
    fn kind(&self) -> ErrorKind {
        *self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HciMessageType {
    Command = 0x01,
    Data = 0x02,
    Sync = 0x03,
    Event = 0x04,
    Iso = 0x05,
}

impl HciMessageType {
    pub fn from_indicator(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Command),
            0x02 => Some(Self::Data),
            0x03 => Some(Self::Sync),
            0x04 => Some(Self::Event),
            0x05 => Some(Self::Iso),
            _ => None,
        }
    }
}

/// Interface to a driver for a HCI adapter
///
/// Reads and writes may be issued concurrently from different futures: the host
/// keeps one read pending at all times while commands are written.
pub trait HciDriver {
    type Error: Error;

    /// Reads an entire HCI packet into the provided buffer.
    ///
    /// If successful, returns the message type of the received HCI packet and its length,
    /// starting with the packet header.
    async fn read(&self, buf: &mut [u8]) -> Result<(HciMessageType, usize), Self::Error>;

    /// Write the provided data as a single HCI packet.
    async fn write(&self, kind: HciMessageType, data: &[u8]) -> Result<(), Self::Error>;
}
