//! A small async BLE host for Periodic Advertising with Responses (PAwR) broadcasters.
//!
//! The host talks HCI to a controller through an [`driver::HciDriver`], drives the
//! controller through the setup of an extended advertising set with periodic
//! advertising subevents, and delivers subevent data requests and responses to the
//! application.
#![no_std]
#![allow(async_fn_in_trait)]

mod fmt;

pub mod codec;
pub mod cursor;
pub(crate) mod types;

pub mod ad_structure;
pub mod address;
pub mod advertise;
pub mod broadcaster;
pub mod command;
pub mod config;
pub mod connection;
pub mod driver;
pub mod event;
pub mod host;
pub mod pawr;
pub mod transport;

pub use address::{AddrKind, Address, BdAddr};
use event::Status;

/// Errors returned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The controller rejected a command.
    Hci(Status),
    /// The controller did not answer in time.
    Timeout,
    InvalidValue,
    InsufficientSpace,
    /// The controller lacks a feature the operation needs.
    NotSupported,
    /// A connection is already pending or open.
    Busy,
    NotFound,
    /// A connection completed that the host did not initiate.
    UnexpectedConnection,
    Codec(codec::Error),
}

/// Error type for operations that involve the controller.
///
/// Separates errors from the HCI driver from errors of the host itself.
#[derive(Debug)]
pub enum BleHostError<E> {
    Controller(E),
    BleHost(Error),
}

impl<E> From<Error> for BleHostError<E> {
    fn from(value: Error) -> Self {
        Self::BleHost(value)
    }
}

impl<E> From<codec::Error> for BleHostError<E> {
    fn from(error: codec::Error) -> Self {
        Self::BleHost(Error::Codec(error))
    }
}

impl From<codec::Error> for Error {
    fn from(error: codec::Error) -> Self {
        Self::Codec(error)
    }
}

impl<E> BleHostError<E> {
    /// The host error, if this is not a driver failure.
    pub fn host_error(&self) -> Option<Error> {
        match self {
            Self::BleHost(e) => Some(*e),
            Self::Controller(_) => None,
        }
    }
}

#[cfg(feature = "defmt")]
impl<E> defmt::Format for BleHostError<E>
where
    E: defmt::Format,
{
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            BleHostError::Controller(e) => defmt::write!(fmt, "Controller({})", e),
            BleHostError::BleHost(e) => defmt::write!(fmt, "BleHost({})", e),
        }
    }
}

pub mod prelude {
    pub use super::ad_structure::{find_device_address, AdStructure};
    pub use super::advertise::{AdvertisementParameters, PeriodicAdvertisementParameters, PhyKind, TxPower};
    pub use super::broadcaster::{AdvertisingSet, Broadcaster};
    pub use super::connection::{ConnectParams, ConnectionEvent};
    pub use super::driver::HciDriver;
    pub use super::event::Status;
    pub use super::host::BleHost;
    pub use super::pawr::{PawrEvent, PawrHandler, ResponseAction, ResponseInfo, SubeventData, SubeventDataRequest};
    pub use super::transport::SerialTransport;
    pub use super::{Address, BleHostError, Error};
}
